//! Batched blob operations scoped to one chart.
//!
//! A request hands the orchestrator every blob it wants to create (or every
//! hash it wants gone) at once. Each distinct hash becomes exactly one store
//! operation; all of them are dispatched together and awaited jointly.
//!
//! Creates are all-or-nothing from the caller's point of view: one failed put
//! fails the batch. Members that already landed stay in the store, there is no
//! compensating delete. Deletes are best effort: an undeleted object is a
//! storage leak, never a dangling reference, so failures are reported and
//! logged but do not fail the request.

use std::collections::HashSet;

use bytes::Bytes;
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::hash::ContentHash;
use crate::key::{self, ObjectKey};
use crate::store::{BlobStore, StoreError};

/// A blob waiting to be written: final bytes plus their hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBlob {
    pub hash: ContentHash,
    pub data: Bytes,
    pub content_type: &'static str,
}

impl PendingBlob {
    /// Hash the final bytes and wrap them for upload.
    pub fn new(data: impl Into<Bytes>, content_type: &'static str) -> Self {
        let data = data.into();
        Self {
            hash: ContentHash::from_data(&data),
            data,
            content_type,
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("{failed} of {attempted} blob writes failed; first error: {first}")]
    Create {
        attempted: usize,
        failed: usize,
        #[source]
        first: StoreError,
    },

    #[error("invalid blob scope: {0}")]
    Scope(#[source] StoreError),
}

/// Outcome of a successful create batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateReport {
    /// Distinct hashes written, in first-seen order.
    pub written: Vec<ContentHash>,
}

/// Outcome of a delete batch. Never an error.
#[derive(Debug, Default)]
pub struct DeleteReport {
    pub deleted: Vec<ObjectKey>,
    pub failed: Vec<(String, StoreError)>,
}

impl DeleteReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn absorb(&mut self, other: DeleteReport) {
        self.deleted.extend(other.deleted);
        self.failed.extend(other.failed);
    }
}

/// Orchestrates batched creates and deletes under `{owner}/{chart}/`.
pub struct BlobBatch<'a, S: BlobStore + ?Sized> {
    store: &'a S,
    owner: &'a str,
    chart: &'a str,
}

impl<'a, S: BlobStore + ?Sized> BlobBatch<'a, S> {
    pub fn new(store: &'a S, owner: &'a str, chart: &'a str) -> Self {
        Self {
            store,
            owner,
            chart,
        }
    }

    fn key(&self, hash: &ContentHash) -> Result<ObjectKey, StoreError> {
        ObjectKey::blob(self.owner, self.chart, hash)
    }

    /// Write every distinct blob, failing if any single write fails.
    pub async fn create_all(&self, uploads: &[PendingBlob]) -> Result<CreateReport, BatchError> {
        let mut seen = HashSet::new();
        let mut jobs = Vec::new();
        for blob in uploads {
            if !seen.insert(&blob.hash) {
                debug!(blob.hash = %blob.hash.short(), "duplicate hash in batch, uploading once");
                continue;
            }
            let key = self.key(&blob.hash).map_err(BatchError::Scope)?;
            jobs.push((blob, key));
        }

        if jobs.is_empty() {
            return Ok(CreateReport::default());
        }

        let attempted = jobs.len();
        let results = join_all(jobs.iter().map(|(blob, key)| {
            self.store.put(key, blob.data.clone(), blob.content_type)
        }))
        .await;

        let mut written = Vec::with_capacity(attempted);
        let mut errors = Vec::new();
        for ((blob, key), result) in jobs.into_iter().zip(results) {
            match result {
                Ok(()) => written.push(blob.hash.clone()),
                Err(e) => {
                    warn!(blob.key = %key, error = %e, "blob write failed");
                    errors.push(e);
                }
            }
        }

        if let Some(first) = errors.into_iter().next() {
            let failed = attempted - written.len();
            return Err(BatchError::Create {
                attempted,
                failed,
                first,
            });
        }

        info!(
            owner.id = %self.owner,
            chart.id = %self.chart,
            batch.size = attempted,
            "blob batch written"
        );
        Ok(CreateReport { written })
    }

    /// Delete every distinct hash. Failures are collected, not raised.
    pub async fn delete_all<I>(&self, hashes: I) -> DeleteReport
    where
        I: IntoIterator<Item = ContentHash>,
    {
        let mut report = DeleteReport::default();
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for hash in hashes {
            if !seen.insert(hash.clone()) {
                continue;
            }
            match self.key(&hash) {
                Ok(key) => keys.push(key),
                Err(e) => report.failed.push((hash.to_string(), e)),
            }
        }

        report.absorb(self.delete_keys(keys).await);
        report
    }

    /// Delete every object of this chart's replay prefix.
    pub async fn delete_replays(&self) -> DeleteReport {
        let prefix = match key::replay_prefix(self.owner, self.chart) {
            Ok(prefix) => prefix,
            Err(e) => {
                return DeleteReport {
                    deleted: Vec::new(),
                    failed: vec![(format!("{}/{}", self.owner, self.chart), e)],
                }
            }
        };

        match self.store.list(&prefix).await {
            Ok(keys) => self.delete_keys(keys).await,
            Err(e) => {
                warn!(prefix = %prefix, error = %e, "failed to list replays");
                DeleteReport {
                    deleted: Vec::new(),
                    failed: vec![(prefix, e)],
                }
            }
        }
    }

    async fn delete_keys(&self, keys: Vec<ObjectKey>) -> DeleteReport {
        let mut report = DeleteReport::default();
        if keys.is_empty() {
            return report;
        }

        let results = join_all(keys.iter().map(|key| self.store.delete(key))).await;
        for (key, result) in keys.into_iter().zip(results) {
            match result {
                Ok(()) => report.deleted.push(key),
                Err(e) => {
                    warn!(blob.key = %key, error = %e, "blob delete failed, leaving orphan");
                    report.failed.push((key.to_string(), e));
                }
            }
        }

        info!(
            owner.id = %self.owner,
            chart.id = %self.chart,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "blob delete batch finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBlobStore, StoreCall};
    use crate::metadata::content_type;

    #[tokio::test]
    async fn test_create_all_dedups_hashes() {
        let store = MemoryBlobStore::new();
        let batch = BlobBatch::new(&store, "o", "c");

        let a = PendingBlob::new(Bytes::from_static(b"same"), content_type::IMAGE_PNG);
        let b = PendingBlob::new(Bytes::from_static(b"same"), content_type::IMAGE_PNG);
        let c = PendingBlob::new(Bytes::from_static(b"other"), content_type::AUDIO_MPEG);

        let report = batch.create_all(&[a.clone(), b, c.clone()]).await.unwrap();
        assert_eq!(report.written, vec![a.hash.clone(), c.hash.clone()]);
        assert_eq!(store.puts().len(), 2);
    }

    #[tokio::test]
    async fn test_create_all_fails_when_any_member_fails() {
        let store = MemoryBlobStore::new();
        let good = PendingBlob::new(Bytes::from_static(b"good"), content_type::IMAGE_PNG);
        let bad = PendingBlob::new(Bytes::from_static(b"bad"), content_type::IMAGE_PNG);
        store.fail_put_for(bad.hash.clone());

        let batch = BlobBatch::new(&store, "o", "c");
        let err = batch.create_all(&[good.clone(), bad]).await.unwrap_err();
        assert!(matches!(
            err,
            BatchError::Create {
                attempted: 2,
                failed: 1,
                ..
            }
        ));

        // No rollback: the successful member stays.
        let good_key = ObjectKey::blob("o", "c", &good.hash).unwrap();
        assert!(store.contains(&good_key));
    }

    #[tokio::test]
    async fn test_empty_create_makes_no_calls() {
        let store = MemoryBlobStore::new();
        let batch = BlobBatch::new(&store, "o", "c");
        batch.create_all(&[]).await.unwrap();
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_tolerates_failures() {
        let store = MemoryBlobStore::new();
        store.fail_deletes(true);
        let batch = BlobBatch::new(&store, "o", "c");

        let hash = ContentHash::from_data(b"x");
        let report = batch.delete_all([hash.clone(), hash]).await;
        assert!(!report.is_clean());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(store.deletes().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_replays_only_touches_replay_prefix() {
        let store = MemoryBlobStore::new();
        let blob = ObjectKey::blob("o", "c", &ContentHash::from_data(b"keep")).unwrap();
        let replay = ObjectKey::parse("o/c/replays/data1").unwrap();
        store.insert(blob.clone(), Bytes::from_static(b"keep"), "a/b");
        store.insert(replay.clone(), Bytes::from_static(b"r"), "a/b");

        let report = BlobBatch::new(&store, "o", "c").delete_replays().await;
        assert_eq!(report.deleted, vec![replay.clone()]);
        assert!(store.contains(&blob));
        assert_eq!(
            store.calls(),
            vec![
                StoreCall::List("o/c/replays/".to_string()),
                StoreCall::Delete(replay)
            ]
        );
    }
}
