//! InMemoryDocumentStore - HashMap-backed driver for testing and development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use serde_json::{Map, Value};

use super::{
    CreateOptions, DocumentDriver, PartitionKeyValue, PatchOperation, PatchPrecondition,
    QueryOptions, QuerySpec, StoreError,
};

/// Internal stored representation of a document.
struct StoredDocument {
    partition_key: PartitionKeyValue,
    body: Value,
}

/// In-memory document store backed by a HashMap.
///
/// Storage key is `"CONTAINER:partition:id"`. Clone-friendly via Arc.
/// Creates are atomic under the write lock, so a second create of the same id
/// fails with 409 exactly like a real store.
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    storage: Arc<RwLock<HashMap<String, StoredDocument>>>,
    resource_counter: Arc<AtomicU64>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    /// Create a new empty document store.
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            resource_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    fn make_key(container: &str, partition_key: &PartitionKeyValue, id: &str) -> String {
        // JSON encoding keeps "42" and 42 in separate partitions.
        format!("{}:{}:{}", container, partition_key.to_value(), id)
    }

    /// Number of documents held in a container, across partitions.
    pub fn len(&self, container: &str) -> usize {
        let prefix = format!("{}:", container);
        self.storage
            .read()
            .map(|storage| storage.keys().filter(|k| k.starts_with(&prefix)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, container: &str) -> bool {
        self.len(container) == 0
    }

    /// Attach fresh store metadata to a document body.
    fn stamp(&self, container: &str, body: &mut Map<String, Value>) {
        let n = self.resource_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let rid = base64::engine::general_purpose::STANDARD.encode(n.to_be_bytes());
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        // Keep the rid stable across replaces, like a real resource id.
        if !body.contains_key("_rid") {
            body.insert("_rid".into(), Value::String(rid.clone()));
        }
        let rid = body
            .get("_rid")
            .and_then(Value::as_str)
            .unwrap_or(&rid)
            .to_string();
        body.insert(
            "_self".into(),
            Value::String(format!("dbs/local/colls/{}/docs/{}", container, rid)),
        );
        body.insert("_etag".into(), Value::String(format!("\"{:016x}\"", n)));
        body.insert("_ts".into(), Value::from(ts));
    }

    fn lock_poisoned() -> StoreError {
        StoreError::new(500, "lock poisoned")
    }
}

fn into_object(document: Value) -> Result<Map<String, Value>, StoreError> {
    match document {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::bad_request("document must be a JSON object")),
    }
}

/// Client-supplied documents never carry store metadata.
fn strip_metadata(body: &mut Map<String, Value>) {
    body.retain(|k, _| !k.starts_with('_'));
}

#[async_trait]
impl DocumentDriver for InMemoryDocumentStore {
    async fn create(
        &self,
        container: &str,
        document: Value,
        partition_key: &PartitionKeyValue,
        options: CreateOptions,
    ) -> Result<Option<Value>, StoreError> {
        let mut body = into_object(document)?;
        strip_metadata(&mut body);

        let existing_id = body
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let id = match existing_id {
            Some(id) => id,
            None if options.disable_automatic_id_generation => {
                return Err(StoreError::bad_request("document is missing an id"));
            }
            None => {
                let generated = format!(
                    "auto-{}",
                    self.resource_counter.fetch_add(1, Ordering::SeqCst) + 1
                );
                body.insert("id".into(), Value::String(generated.clone()));
                generated
            }
        };

        let key = Self::make_key(container, partition_key, &id);
        let mut storage = self.storage.write().map_err(|_| Self::lock_poisoned())?;

        if storage.contains_key(&key) {
            return Err(StoreError::conflict(format!(
                "document {} already exists in {}",
                id, container
            )));
        }

        self.stamp(container, &mut body);
        let body = Value::Object(body);
        storage.insert(
            key,
            StoredDocument {
                partition_key: partition_key.clone(),
                body: body.clone(),
            },
        );

        Ok(Some(body))
    }

    async fn read(
        &self,
        container: &str,
        id: &str,
        partition_key: &PartitionKeyValue,
    ) -> Result<Option<Value>, StoreError> {
        let key = Self::make_key(container, partition_key, id);
        let storage = self.storage.read().map_err(|_| Self::lock_poisoned())?;
        Ok(storage.get(&key).map(|stored| stored.body.clone()))
    }

    async fn upsert(
        &self,
        container: &str,
        document: Value,
        partition_key: &PartitionKeyValue,
    ) -> Result<Option<Value>, StoreError> {
        let mut body = into_object(document)?;
        strip_metadata(&mut body);

        let id = body
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StoreError::bad_request("document is missing an id"))?;

        let key = Self::make_key(container, partition_key, &id);
        let mut storage = self.storage.write().map_err(|_| Self::lock_poisoned())?;

        if let Some(rid) = storage.get(&key).and_then(|s| s.body.get("_rid")).cloned() {
            body.insert("_rid".into(), rid);
        }
        self.stamp(container, &mut body);
        let body = Value::Object(body);
        storage.insert(
            key,
            StoredDocument {
                partition_key: partition_key.clone(),
                body: body.clone(),
            },
        );

        Ok(Some(body))
    }

    async fn query(
        &self,
        container: &str,
        query: &QuerySpec,
        options: QueryOptions,
    ) -> Result<Vec<Value>, StoreError> {
        let storage = self.storage.read().map_err(|_| Self::lock_poisoned())?;

        let prefix = format!("{}:", container);
        let mut results: Vec<Value> = storage
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .filter(|(_, stored)| match &options.partition_key {
                Some(pk) => &stored.partition_key == pk,
                None => true,
            })
            .filter(|(_, stored)| query.matches(&stored.body))
            .map(|(_, stored)| stored.body.clone())
            .collect();

        results.sort_by(|a, b| query.compare(a, b));
        if let Some(max) = options.max_item_count {
            results.truncate(max);
        }

        Ok(results)
    }

    async fn patch(
        &self,
        container: &str,
        id: &str,
        partition_key: &PartitionKeyValue,
        operations: &[PatchOperation],
        precondition: &PatchPrecondition,
    ) -> Result<Option<Value>, StoreError> {
        let key = Self::make_key(container, partition_key, id);
        let mut storage = self.storage.write().map_err(|_| Self::lock_poisoned())?;

        let stored = storage.get_mut(&key).ok_or_else(|| {
            StoreError::not_found(format!("document {} not found in {}", id, container))
        })?;

        if let Some(expected) = &precondition.if_match {
            let actual = stored.body.get("_etag").and_then(Value::as_str);
            if actual != Some(expected.as_str()) {
                return Err(StoreError::precondition_failed(format!(
                    "etag mismatch on {}",
                    id
                )));
            }
        }

        let mut body = stored.body.clone();
        for operation in operations {
            apply_patch(&mut body, operation)?;
        }

        let mut map = into_object(body)?;
        self.stamp(container, &mut map);
        stored.body = Value::Object(map);

        Ok(Some(stored.body.clone()))
    }
}

/// Split a JSON pointer into its parent pointer and final (unescaped) token.
fn split_pointer(path: &str) -> Result<(&str, String), StoreError> {
    if !path.starts_with('/') || path.len() < 2 {
        return Err(StoreError::bad_request(format!("invalid patch path `{}`", path)));
    }
    let cut = path.rfind('/').unwrap_or(0);
    let token = path[cut + 1..].replace("~1", "/").replace("~0", "~");
    Ok((&path[..cut], token))
}

fn apply_patch(body: &mut Value, operation: &PatchOperation) -> Result<(), StoreError> {
    let path = operation.path();
    if path == "/id" || path.starts_with("/_") {
        return Err(StoreError::bad_request(format!("path `{}` is read-only", path)));
    }

    let (parent_path, token) = split_pointer(path)?;
    let parent = body
        .pointer_mut(parent_path)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| StoreError::bad_request(format!("no parent object for `{}`", path)))?;

    match operation {
        PatchOperation::Add { value, .. } | PatchOperation::Set { value, .. } => {
            parent.insert(token, value.clone());
        }
        PatchOperation::Replace { value, .. } => {
            let slot = parent
                .get_mut(&token)
                .ok_or_else(|| StoreError::bad_request(format!("`{}` does not exist", path)))?;
            *slot = value.clone();
        }
        PatchOperation::Remove { .. } => {
            parent
                .remove(&token)
                .ok_or_else(|| StoreError::bad_request(format!("`{}` does not exist", path)))?;
        }
        PatchOperation::Incr { value, .. } => {
            let current = parent.get(&token).cloned().unwrap_or(Value::from(0));
            let next = match (current.as_i64(), value.as_i64()) {
                (Some(a), Some(b)) => Value::from(a.checked_add(b).ok_or_else(|| {
                    StoreError::bad_request(format!("`{}` would overflow", path))
                })?),
                _ => match (current.as_f64(), value.as_f64()) {
                    (Some(a), Some(b)) => Value::from(a + b),
                    _ => {
                        return Err(StoreError::bad_request(format!(
                            "`{}` is not numeric",
                            path
                        )))
                    }
                },
            };
            parent.insert(token, next);
        }
    }

    Ok(())
}
