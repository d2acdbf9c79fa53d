//! Failure taxonomy of the document and versioned models, driven by a
//! scripted driver instead of a real store.


use scripted_driver::ScriptedDriver;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use versioned_store::{
    Document, DocumentModel, ModelError, PartitionKeyValue, PatchOperation,
    SingleKeyVersionedModel, StoreError, Validate, ValidationErrors, Version, VersionedEntity,
    VersionedModel,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Notification {
    id: String,
    recipient: String,
    channel: String,
}

impl Validate for Notification {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self.channel.as_str() {
            "EMAIL" | "WEBHOOK" => Ok(()),
            _ => Err(ValidationErrors::single("/channel", "unknown channel")),
        }
    }
}

impl Document for Notification {
    const CONTAINER: &'static str = "notifications";
    const PARTITION_KEY_FIELD: &'static str = "recipient";

    fn id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> PartitionKeyValue {
        PartitionKeyValue::from(&self.recipient)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, VersionedEntity)]
#[serde(rename_all = "camelCase")]
#[versioned(container = "profiles")]
struct Profile {
    #[versioned(model_id)]
    fiscal_code: String,
    name: String,
}

impl Validate for Profile {}

fn notification() -> Notification {
    Notification {
        id: "n1".into(),
        recipient: "AAA".into(),
        channel: "EMAIL".into(),
    }
}

fn metadata() -> Value {
    json!({
        "_rid": "AAAAAAAAAAE=",
        "_self": "dbs/local/colls/notifications/docs/AAAAAAAAAAE=",
        "_etag": "\"0000000000000001\"",
        "_ts": 1700000000u64,
    })
}

fn stored(mut body: Value) -> Value {
    if let (Some(target), Value::Object(meta)) = (body.as_object_mut(), metadata()) {
        target.extend(meta);
    }
    body
}

fn notifications(driver: &ScriptedDriver) -> DocumentModel<Notification, ScriptedDriver> {
    DocumentModel::with_defaults(driver.clone()).unwrap()
}

fn profiles(driver: &ScriptedDriver) -> SingleKeyVersionedModel<Profile, ScriptedDriver> {
    VersionedModel::with_defaults(driver.clone()).unwrap()
}

#[tokio::test]
async fn create_returns_decoded_resource() {
    let driver = ScriptedDriver {
        create: Some(Ok(Some(stored(serde_json::to_value(notification()).unwrap())))),
        ..Default::default()
    };
    let created = notifications(&driver).create(&notification()).await.unwrap();
    assert_eq!(created.data, notification());
    assert_eq!(created.metadata.ts, 1700000000);
    assert_eq!(driver.calls(), vec!["create notifications \"n1\""]);
}

#[tokio::test]
async fn create_without_body_is_empty_response() {
    let driver = ScriptedDriver {
        create: Some(Ok(None)),
        ..Default::default()
    };
    let err = notifications(&driver).create(&notification()).await.unwrap_err();
    assert_eq!(err, ModelError::EmptyResponse);
}

#[tokio::test]
async fn upsert_without_body_is_empty_response() {
    let driver = ScriptedDriver {
        upsert: Some(Ok(None)),
        ..Default::default()
    };
    let err = notifications(&driver).upsert(&notification()).await.unwrap_err();
    assert_eq!(err, ModelError::EmptyResponse);
}

#[tokio::test]
async fn throttling_is_surfaced_once_without_retry() {
    let throttled = StoreError::new(429, "request rate too large").with_sub_status(3200);
    let driver = ScriptedDriver {
        create: Some(Err(throttled.clone())),
        ..Default::default()
    };
    let err = notifications(&driver).create(&notification()).await.unwrap_err();
    assert_eq!(err, ModelError::ErrorResponse(throttled));
    assert!(err.is_throttled());
    assert_eq!(driver.calls().len(), 1);
}

#[tokio::test]
async fn invalid_write_is_rejected_before_the_driver() {
    let driver = ScriptedDriver::default();
    let mut bad = notification();
    bad.channel = "PIGEON".into();
    let err = notifications(&driver).create(&bad).await.unwrap_err();
    assert!(matches!(err, ModelError::Decoding(_)));
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn find_absent_is_none() {
    let driver = ScriptedDriver {
        read: Some(Ok(None)),
        ..Default::default()
    };
    let found = notifications(&driver)
        .find("n1", &"AAA".into())
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn find_not_found_status_is_none() {
    let driver = ScriptedDriver {
        read: Some(Err(StoreError::not_found("missing"))),
        ..Default::default()
    };
    let found = notifications(&driver)
        .find("n1", &"AAA".into())
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn find_other_errors_propagate() {
    let driver = ScriptedDriver {
        read: Some(Err(StoreError::new(503, "unavailable"))),
        ..Default::default()
    };
    let err = notifications(&driver)
        .find("n1", &"AAA".into())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn resource_without_metadata_is_decoding_error() {
    let driver = ScriptedDriver {
        read: Some(Ok(Some(serde_json::to_value(notification()).unwrap()))),
        ..Default::default()
    };
    let err = notifications(&driver)
        .find("n1", &"AAA".into())
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Decoding(_)));
}

#[tokio::test]
async fn resource_failing_read_rules_is_decoding_error() {
    let driver = ScriptedDriver {
        read: Some(Ok(Some(stored(json!({
            "id": "n1",
            "recipient": "AAA",
            "channel": "FAX",
        }))))),
        ..Default::default()
    };
    let err = notifications(&driver)
        .find("n1", &"AAA".into())
        .await
        .unwrap_err();
    match err {
        ModelError::Decoding(errors) => {
            assert_eq!(errors.iter().next().unwrap().path, "/channel");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn patch_not_found_and_empty_body() {
    let missing = ScriptedDriver {
        patch: Some(Err(StoreError::not_found("missing"))),
        ..Default::default()
    };
    let err = notifications(&missing)
        .patch("n1", &"AAA".into(), &[PatchOperation::set("/channel", "WEBHOOK")], None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ModelError::NotFound {
            container: "notifications".into(),
            id: "n1".into(),
        }
    );

    let empty = ScriptedDriver {
        patch: Some(Ok(None)),
        ..Default::default()
    };
    let err = notifications(&empty)
        .patch("n1", &"AAA".into(), &[PatchOperation::set("/channel", "WEBHOOK")], None)
        .await
        .unwrap_err();
    assert_eq!(err, ModelError::EmptyResponse);
}

#[tokio::test]
async fn latest_version_query_is_single_partition_and_limited() {
    let driver = ScriptedDriver {
        query: Some(Ok(vec![])),
        ..Default::default()
    };
    let latest = profiles(&driver)
        .find_last_version_by_model_id("AAA")
        .await
        .unwrap();
    assert!(latest.is_none());
    assert_eq!(
        driver.calls(),
        vec![
            "query profiles [SELECT * FROM m WHERE m.fiscalCode = @p0 ORDER BY m.version DESC] \
             partition=Some(String(\"AAA\")) max=Some(1)"
        ]
    );
}

#[tokio::test]
async fn upsert_stops_when_latest_lookup_fails() {
    let driver = ScriptedDriver {
        query: Some(Err(StoreError::new(429, "slow down"))),
        ..Default::default()
    };
    let profile = Profile {
        fiscal_code: "AAA".into(),
        name: "Ada".into(),
    };
    let err = profiles(&driver).upsert(&profile, None).await.unwrap_err();
    assert!(err.is_throttled());
    assert_eq!(driver.calls().len(), 1);
}

#[tokio::test]
async fn upsert_builds_next_id_from_queried_version() {
    let latest = stored(json!({
        "id": "AAA-0000000000000004",
        "version": 4,
        "fiscalCode": "AAA",
        "name": "Ada",
    }));
    let next = stored(json!({
        "id": "AAA-0000000000000005",
        "version": 5,
        "fiscalCode": "AAA",
        "name": "Ada L.",
    }));
    let driver = ScriptedDriver {
        query: Some(Ok(vec![latest])),
        create: Some(Ok(Some(next))),
        ..Default::default()
    };
    let profile = Profile {
        fiscal_code: "AAA".into(),
        name: "Ada L.".into(),
    };
    let written = profiles(&driver).upsert(&profile, None).await.unwrap();
    assert_eq!(written.data.version, Version::from(5u32));
    assert_eq!(
        driver.calls()[1],
        "create profiles \"AAA-0000000000000005\""
    );
}

#[tokio::test]
async fn drifted_latest_version_is_decoding_error() {
    let driver = ScriptedDriver {
        query: Some(Ok(vec![stored(json!({
            "id": "AAA-0000000000000004",
            "version": "four",
            "fiscalCode": "AAA",
            "name": "Ada",
        }))])),
        ..Default::default()
    };
    let err = profiles(&driver)
        .find_last_version_by_model_id("AAA")
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Decoding(_)));
}
