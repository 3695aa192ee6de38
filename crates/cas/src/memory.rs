//! In-memory blob store.
//!
//! Records every call it receives so callers can assert on exactly which
//! object-store operations a request issued, and can be told to fail specific
//! operations to exercise partial-failure paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;

use crate::hash::ContentHash;
use crate::key::ObjectKey;
use crate::metadata::BlobMetadata;
use crate::store::{BlobStore, StoreError};

/// One recorded store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Put(ObjectKey),
    Delete(ObjectKey),
    Get(ObjectKey),
    Head(ObjectKey),
    List(String),
}

impl StoreCall {
    /// Whether the call changes store contents.
    pub fn is_mutation(&self) -> bool {
        matches!(self, StoreCall::Put(_) | StoreCall::Delete(_))
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<ObjectKey, (Bytes, BlobMetadata)>>,
    calls: Mutex<Vec<StoreCall>>,
    failing_puts: Mutex<HashSet<ContentHash>>,
    fail_deletes: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future `put` of this hash fail.
    pub fn fail_put_for(&self, hash: ContentHash) {
        lock(&self.failing_puts).insert(hash);
    }

    /// Make every future `delete` fail (or succeed again).
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of all recorded calls, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    pub fn puts(&self) -> Vec<ObjectKey> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Put(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<ObjectKey> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Delete(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Keys currently stored.
    pub fn keys(&self) -> Vec<ObjectKey> {
        lock(&self.objects).keys().cloned().collect()
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        lock(&self.objects).contains_key(key)
    }

    /// Seed an object without recording a call.
    pub fn insert(&self, key: ObjectKey, data: Bytes, content_type: &str) {
        let meta = BlobMetadata::new(content_type, data.len() as u64);
        lock(&self.objects).insert(key, (data, meta));
    }

    fn record(&self, call: StoreCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &ObjectKey,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.record(StoreCall::Put(key.clone()));

        if let Some(hash) = key.content_hash() {
            if lock(&self.failing_puts).contains(&hash) {
                return Err(StoreError::Backend {
                    key: key.to_string(),
                    message: "put rejected".to_string(),
                });
            }
        }

        self.insert(key.clone(), data, content_type);
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.record(StoreCall::Delete(key.clone()));

        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend {
                key: key.to_string(),
                message: "delete rejected".to_string(),
            });
        }

        lock(&self.objects).remove(key);
        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> Result<Option<Bytes>, StoreError> {
        self.record(StoreCall::Get(key.clone()));
        Ok(lock(&self.objects).get(key).map(|(data, _)| data.clone()))
    }

    async fn head(&self, key: &ObjectKey) -> Result<Option<BlobMetadata>, StoreError> {
        self.record(StoreCall::Head(key.clone()));
        Ok(lock(&self.objects).get(key).map(|(_, meta)| meta.clone()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectKey>, StoreError> {
        self.record(StoreCall::List(prefix.to_string()));
        Ok(lock(&self.objects)
            .keys()
            .filter(|k| k.as_str().starts_with(prefix))
            .cloned()
            .collect())
    }
}
