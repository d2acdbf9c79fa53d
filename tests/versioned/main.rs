//! Integration tests for the single-key and composed-key versioned models.


use std::sync::Arc;

use entities::{Activation, ActivationStatus, MessageStatus, Profile};
use versioned_store::{
    ComposedModelId, ComposedVersionedModel, InMemoryDocumentStore, ModelConfig, ModelError,
    PartitionKeyValue, RetrievedVersion, SingleKeyVersionedModel, Version, VersionedEntity,
    VersionedModel,
};

type Profiles = SingleKeyVersionedModel<Profile, InMemoryDocumentStore>;
type Activations = ComposedVersionedModel<Activation, InMemoryDocumentStore>;

fn profiles(store: &InMemoryDocumentStore) -> Profiles {
    VersionedModel::with_defaults(store.clone()).unwrap()
}

fn activations(store: &InMemoryDocumentStore) -> Activations {
    VersionedModel::with_defaults(store.clone()).unwrap()
}

#[test]
fn derive_reports_serde_field_names() {
    assert_eq!(Profile::CONTAINER, "profiles");
    assert_eq!(Profile::MODEL_ID_FIELD, "fiscalCode");
    assert_eq!(Profile::PARTITION_KEY_FIELD, "fiscalCode");
    assert_eq!(
        Profile::FIELD_NAMES,
        &["fiscalCode", "email", "isInboxEnabled"]
    );

    assert_eq!(Activation::MODEL_ID_FIELD, "serviceId");
    assert_eq!(Activation::PARTITION_KEY_FIELD, "tenantId");
    assert_eq!(
        Activation::new("svc-1", 42, ActivationStatus::Active).partition_key(),
        PartitionKeyValue::Number(42)
    );

    assert_eq!(MessageStatus::CONTAINER, "message_status");
    assert_eq!(MessageStatus::MODEL_ID_FIELD, "messageId");
}

#[tokio::test]
async fn first_create_is_version_zero() {
    let store = InMemoryDocumentStore::new();
    let model = profiles(&store);

    let created = model.create(&Profile::new("AAA"), None).await.unwrap();
    assert_eq!(created.data.version, Version::ZERO);
    assert_eq!(created.data.id, "AAA-0000000000000000");
    assert_eq!(created.data.entity, Profile::new("AAA"));
}

#[tokio::test]
async fn upsert_appends_and_keeps_history() {
    let store = InMemoryDocumentStore::new();
    let model = profiles(&store);

    let original = model.create(&Profile::new("AAA"), None).await.unwrap();
    let updated = model
        .upsert(&Profile::new("AAA").with_inbox(true), None)
        .await
        .unwrap();
    assert_eq!(updated.data.version, Version::from(1u32));
    assert_eq!(updated.data.id, "AAA-0000000000000001");

    let still_there = model
        .find_version(&"AAA".to_string(), Version::ZERO)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(still_there, original);
    assert!(!still_there.data.entity.is_inbox_enabled);
}

#[tokio::test]
async fn latest_version_after_update() {
    let store = InMemoryDocumentStore::new();
    let model = profiles(&store);

    model.create(&Profile::new("AAA"), None).await.unwrap();
    model
        .upsert(&Profile::new("AAA").with_inbox(true), None)
        .await
        .unwrap();

    let latest = model
        .find_last_version_by_model_id("AAA")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.data.version, Version::from(1u32));
    assert!(latest.data.entity.is_inbox_enabled);
}

#[tokio::test]
async fn sequential_upserts_are_contiguous() {
    let store = InMemoryDocumentStore::new();
    let model = profiles(&store);

    for expected in 0u32..12 {
        let written = model
            .upsert(&Profile::new("BBB").with_inbox(expected % 2 == 0), None)
            .await
            .unwrap();
        assert_eq!(written.data.version, Version::from(expected));
    }

    let history = model.find_all_versions(&"BBB".to_string()).await.unwrap();
    let versions: Vec<u64> = history.iter().map(|d| d.data.version.get()).collect();
    assert_eq!(versions, (0..12).collect::<Vec<u64>>());

    // Past 9 the padded ids still sort with the numbers.
    let latest = model
        .find_last_version_by_model_id("BBB")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.data.id, "BBB-0000000000000011");
}

#[tokio::test]
async fn latest_version_of_unknown_key_is_none() {
    let store = InMemoryDocumentStore::new();
    let model = profiles(&store);
    model.create(&Profile::new("AAA"), None).await.unwrap();

    let missing = model.find_last_version_by_model_id("ZZZ").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn keys_do_not_leak_into_each_other() {
    let store = InMemoryDocumentStore::new();
    let model = profiles(&store);
    model.create(&Profile::new("AAA"), None).await.unwrap();
    model.upsert(&Profile::new("AAA"), None).await.unwrap();
    model.create(&Profile::new("AAB"), None).await.unwrap();

    let latest = model
        .find_last_version_by_model_id("AAB")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.data.version, Version::ZERO);
}

#[tokio::test]
async fn existing_version_is_never_overwritten() {
    let store = InMemoryDocumentStore::new();
    let model = profiles(&store);

    let original = model.create(&Profile::new("AAA"), None).await.unwrap();
    let err = model
        .create(&Profile::new("AAA").with_inbox(true), Some(Version::ZERO))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.status(), Some(409));

    let stored = model
        .find_version(&"AAA".to_string(), Version::ZERO)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, original);
    assert_eq!(store.len("profiles"), 1);
}

#[tokio::test]
async fn invalid_entity_is_decoding_error() {
    let store = InMemoryDocumentStore::new();
    let model = profiles(&store);

    let mut profile = Profile::new("AAA");
    profile.email = Some("not-an-email".into());
    let err = model.upsert(&profile, None).await.unwrap_err();
    match err {
        ModelError::Decoding(errors) => {
            assert_eq!(errors.iter().next().unwrap().path, "/email");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.is_empty("profiles"));
}

#[tokio::test]
async fn concurrent_upserts_for_same_version_have_one_winner() {
    let store = InMemoryDocumentStore::new();
    let model = Arc::new(profiles(&store));

    model.create(&Profile::new("AAA"), None).await.unwrap();
    model.upsert(&Profile::new("AAA"), None).await.unwrap();

    // Both writers saw version 1 as the latest and aim for version 2.
    let seen = Version::from(1u32);
    let a = {
        let model = Arc::clone(&model);
        tokio::spawn(async move {
            model
                .upsert(&Profile::new("AAA").with_inbox(true), Some(seen))
                .await
        })
    };
    let b = {
        let model = Arc::clone(&model);
        tokio::spawn(async move {
            model
                .upsert(&Profile::new("AAA").with_inbox(false), Some(seen))
                .await
        })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    let outcomes = [&a, &b];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(err) if err.is_conflict()))
        .count();
    assert_eq!((winners, conflicts), (1, 1));

    let history = model.find_all_versions(&"AAA".to_string()).await.unwrap();
    let version_two: Vec<_> = history
        .iter()
        .filter(|d| d.data.version == Version::from(2u32))
        .collect();
    assert_eq!(version_two.len(), 1);
    assert_eq!(version_two[0].data.id, "AAA-0000000000000002");
}

/// Retrying on conflict is the caller's job. A caller that does so ends up
/// with one contiguous history and no lost writes.
async fn upsert_with_retry(model: &Profiles, profile: &Profile) -> RetrievedVersion<Profile> {
    loop {
        match model.upsert(profile, None).await {
            Ok(written) => return written,
            Err(err) if err.is_conflict() => tokio::task::yield_now().await,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_writers_with_caller_retry_produce_contiguous_versions() {
    let store = InMemoryDocumentStore::new();
    let model = Arc::new(profiles(&store));

    let writers: Vec<_> = (0..8)
        .map(|i| {
            let model = Arc::clone(&model);
            tokio::spawn(async move {
                upsert_with_retry(&model, &Profile::new("CCC").with_inbox(i % 2 == 0)).await
            })
        })
        .collect();

    let mut assigned = Vec::new();
    for writer in writers {
        assigned.push(writer.await.unwrap().data.version.get());
    }
    assigned.sort_unstable();
    assert_eq!(assigned, (0..8).collect::<Vec<u64>>());

    let latest = model
        .find_last_version_by_model_id("CCC")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.data.version, Version::from(7u32));
}

#[tokio::test]
async fn composed_key_ids_and_partition_scoping() {
    let store = InMemoryDocumentStore::new();
    let model = activations(&store);

    let created = model
        .create(&Activation::new("svc-1", 42, ActivationStatus::Active), None)
        .await
        .unwrap();
    assert_eq!(created.data.id, "svc-1-42-0000000000000000");

    let latest = model
        .find_last_version_by_model_id("svc-1", PartitionKeyValue::from(42i64))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest, created);

    let other_tenant = model
        .find_last_version_by_model_id("svc-1", PartitionKeyValue::from(7i64))
        .await
        .unwrap();
    assert!(other_tenant.is_none());
}

#[tokio::test]
async fn composed_entities_in_one_partition_version_independently() {
    let store = InMemoryDocumentStore::new();
    let model = activations(&store);

    model
        .create(&Activation::new("svc-1", 42, ActivationStatus::Active), None)
        .await
        .unwrap();
    model
        .upsert(&Activation::new("svc-1", 42, ActivationStatus::Inactive), None)
        .await
        .unwrap();
    let other = model
        .upsert(&Activation::new("svc-2", 42, ActivationStatus::PendingReview), None)
        .await
        .unwrap();
    assert_eq!(other.data.version, Version::ZERO);
    assert_eq!(other.data.id, "svc-2-42-0000000000000000");

    // Same external key in another partition is another entity.
    let elsewhere = model
        .upsert(&Activation::new("svc-1", 43, ActivationStatus::Active), None)
        .await
        .unwrap();
    assert_eq!(elsewhere.data.version, Version::ZERO);

    let key = ComposedModelId::new("svc-1", 42i64);
    let history = model.find_all_versions(&key).await.unwrap();
    let statuses: Vec<_> = history.iter().map(|d| d.data.entity.status).collect();
    assert_eq!(
        statuses,
        vec![ActivationStatus::Active, ActivationStatus::Inactive]
    );
}

#[tokio::test]
async fn composed_create_new_version_writes_exact_version() {
    let store = InMemoryDocumentStore::new();
    let model = activations(&store);
    let activation = Activation::new("svc-9", 1, ActivationStatus::Active);

    let seeded = model
        .create_new_version(&activation, Version::from(40u32))
        .await
        .unwrap();
    assert_eq!(seeded.data.id, "svc-9-1-0000000000000040");

    let next = model.upsert(&activation, None).await.unwrap();
    assert_eq!(next.data.version, Version::from(41u32));

    let err = model
        .create_new_version(&activation, Version::from(40u32))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[test]
fn composed_model_rejects_single_key_entity() {
    let store = InMemoryDocumentStore::new();
    let result = ComposedVersionedModel::<Profile, _>::new(store, ModelConfig::new("profiles"));
    assert!(result.is_err());
}

#[tokio::test]
async fn configured_container_prefix_is_used() {
    let store = InMemoryDocumentStore::new();
    let model = SingleKeyVersionedModel::<MessageStatus, _>::new(
        store.clone(),
        ModelConfig::new("message_status").with_prefix("test-"),
    )
    .unwrap();

    model
        .create(
            &MessageStatus {
                message_id: "01HX".into(),
                status: "PROCESSED".into(),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(store.len("test-message_status"), 1);
    assert_eq!(model.document_model().container(), "test-message_status");
}
