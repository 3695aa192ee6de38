//! In-memory metadata store with failure injection, for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use async_trait::async_trait;

use super::{ChartRecord, EditCommit, MetadataError, MetadataStore};
use crate::ids::ChartId;

#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    charts: Mutex<HashMap<ChartId, ChartRecord>>,
    leaderboards: Mutex<HashMap<ChartId, usize>>,
    fail_creates: AtomicBool,
    fail_commits: AtomicBool,
    commits: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of edits committed successfully.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Seed a chart directly.
    pub fn insert(&self, record: ChartRecord) {
        lock(&self.charts).insert(record.id.clone(), record);
    }

    pub fn chart(&self, id: &ChartId) -> Option<ChartRecord> {
        lock(&self.charts).get(id).cloned()
    }

    pub fn chart_count(&self) -> usize {
        lock(&self.charts).len()
    }

    pub fn add_leaderboard_entries(&self, id: &ChartId, count: usize) {
        *lock(&self.leaderboards).entry(id.clone()).or_default() += count;
    }

    pub fn leaderboard_len(&self, id: &ChartId) -> usize {
        lock(&self.leaderboards).get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn create_chart(&self, record: &ChartRecord) -> Result<(), MetadataError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(MetadataError::Backend(anyhow!("injected create failure")));
        }
        let mut charts = lock(&self.charts);
        if charts.contains_key(&record.id) {
            return Err(MetadataError::Duplicate(record.id.clone()));
        }
        charts.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_chart(&self, id: &ChartId) -> Result<Option<ChartRecord>, MetadataError> {
        Ok(self.chart(id))
    }

    async fn commit_edit(&self, commit: &EditCommit) -> Result<i64, MetadataError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(MetadataError::Backend(anyhow!("injected commit failure")));
        }

        let mut charts = lock(&self.charts);
        let current = charts
            .get(&commit.chart)
            .ok_or_else(|| MetadataError::NotFound(commit.chart.clone()))?;
        if current.revision != commit.expected_revision {
            return Err(MetadataError::Conflict {
                chart: commit.chart.clone(),
                expected: commit.expected_revision,
            });
        }

        let next = current.applied(commit);
        let revision = next.revision;
        charts.insert(commit.chart.clone(), next);
        drop(charts);

        if commit.reset_leaderboards {
            lock(&self.leaderboards).remove(&commit.chart);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::OwnerId;
    use crate::request::{ChartMetadata, MetadataPatch};
    use crate::slots::AssetSet;
    use cas::ContentHash;

    fn record() -> ChartRecord {
        let h = ContentHash::from_data(b"x");
        ChartRecord::new(
            ChartId::generate(),
            OwnerId::new("o").unwrap(),
            ChartMetadata::default(),
            AssetSet::new(h.clone(), h.clone(), h.clone(), h.clone(), h),
        )
    }

    fn commit(record: &ChartRecord, expected: i64) -> EditCommit {
        EditCommit {
            chart: record.id.clone(),
            expected_revision: expected,
            patch: MetadataPatch {
                rating: Some(5),
                ..Default::default()
            },
            updates: vec![],
            reset_leaderboards: true,
        }
    }

    #[tokio::test]
    async fn test_commit_bumps_revision_and_resets_leaderboard() {
        let store = MemoryMetadataStore::new();
        let rec = record();
        store.create_chart(&rec).await.unwrap();
        store.add_leaderboard_entries(&rec.id, 3);

        let revision = store.commit_edit(&commit(&rec, 0)).await.unwrap();
        assert_eq!(revision, 1);
        assert_eq!(store.leaderboard_len(&rec.id), 0);
        assert_eq!(store.chart(&rec.id).unwrap().metadata.rating, 5);
    }

    #[tokio::test]
    async fn test_stale_revision_conflicts() {
        let store = MemoryMetadataStore::new();
        let rec = record();
        store.create_chart(&rec).await.unwrap();
        store.commit_edit(&commit(&rec, 0)).await.unwrap();

        let err = store.commit_edit(&commit(&rec, 0)).await.unwrap_err();
        assert!(matches!(err, MetadataError::Conflict { expected: 0, .. }));
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_create() {
        let store = MemoryMetadataStore::new();
        let rec = record();
        store.create_chart(&rec).await.unwrap();
        assert!(matches!(
            store.create_chart(&rec).await,
            Err(MetadataError::Duplicate(_))
        ));
    }
}
