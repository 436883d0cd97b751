//! Index manager: record cache and HNSW consistency layer over a [`RecordStore`].
//!
//! The manager owns an immutable [`IndexSnapshot`] (HNSW graph + record cache)
//! and decides per search whether the graph can be trusted:
//!
//! - inserts are applied to a fresh graph incrementally (copy-on-write if a
//!   search still holds the snapshot);
//! - updates, deletes and clears only mark the snapshot dirty;
//! - the next search after an invalidation rebuilds the whole snapshot from
//!   the store. Concurrent callers share one in-flight rebuild.
//!
//! Searches never fail because of the graph: any [`IndexError`] falls back to
//! an exact scan of the cache. Store errors are returned unchanged.

use crate::error::{IndexError, ManagerError, StoreError};
use crate::hnsw::{HnswConfig, HnswIndex};
use crate::record::{NewRecord, RecordId, RecordPatch, VectorRecord};
use crate::search::types::rank;
use crate::search::{brute_force_search, ScoredRecord};
use crate::storage::store::RecordStore;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// An HNSW graph together with the records it was built from.
///
/// Records without a usable embedding are cached but not indexed. `index` is
/// `None` when no record was indexable.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    index: Option<HnswIndex>,
    cache: HashMap<RecordId, Arc<VectorRecord>>,
}

impl IndexSnapshot {
    /// Builds a snapshot from `records`.
    ///
    /// Records are indexed oldest first; the dimensionality is taken from the
    /// first record with a non-empty embedding and records of any other length
    /// are skipped.
    pub fn build(mut records: Vec<VectorRecord>, config: &HnswConfig) -> Self {
        records.sort_by_key(|r| (r.timestamp, r.id));

        let dimension = records
            .iter()
            .find(|r| r.has_embedding())
            .map(|r| r.embedding.len());

        let mut index = match dimension {
            Some(dim) => match HnswIndex::new(dim, config.clone()) {
                Ok(index) => Some(index),
                Err(e) => {
                    tracing::warn!("Could not create HNSW index: {}", e);
                    None
                }
            },
            None => None,
        };

        let mut skipped = 0usize;
        if let Some(idx) = index.as_mut() {
            for record in &records {
                if record.embedding.len() != idx.dimension() {
                    skipped += 1;
                    tracing::debug!(
                        id = %record.id,
                        dimensions = record.embedding.len(),
                        expected = idx.dimension(),
                        "skipping record with incompatible embedding"
                    );
                    continue;
                }
                if let Err(e) = idx.add_item(record.id, &record.embedding) {
                    skipped += 1;
                    tracing::warn!(id = %record.id, "failed to index record: {}", e);
                }
            }
        }
        if skipped > 0 {
            tracing::debug!("{} records excluded from the HNSW index", skipped);
        }

        // A graph with nothing in it is represented as no graph
        if index.as_ref().is_some_and(HnswIndex::is_empty) {
            index = None;
        }

        let cache = records
            .into_iter()
            .map(|r| (r.id, Arc::new(r)))
            .collect();

        Self { index, cache }
    }

    /// The HNSW graph, if any record was indexable.
    pub fn index(&self) -> Option<&HnswIndex> {
        self.index.as_ref()
    }

    /// A cached record by id.
    pub fn get(&self, id: &RecordId) -> Option<&Arc<VectorRecord>> {
        self.cache.get(id)
    }

    /// All cached records, in no particular order.
    pub fn records(&self) -> impl Iterator<Item = &Arc<VectorRecord>> {
        self.cache.values()
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Number of records present in the graph.
    pub fn indexed_len(&self) -> usize {
        self.index.as_ref().map_or(0, HnswIndex::len)
    }
}

/// Summary statistics over the stored records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStats {
    pub count: usize,
    /// Size of the compact JSON encoding of all records.
    pub total_bytes: usize,
    pub average_dimensions: usize,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
    /// Records in the current graph (0 before the first build).
    pub indexed: usize,
    /// Whether the next search will rebuild the graph.
    pub index_dirty: bool,
}

type BuildOutcome = Result<Arc<IndexSnapshot>, StoreError>;

/// Single-flight guard over the snapshot.
enum IndexPhase {
    /// No snapshot has been built, or the last build failed.
    Idle,
    /// A build is running; waiters receive its outcome through the channel.
    Building(watch::Receiver<Option<BuildOutcome>>),
    /// A snapshot exists. It may be dirty.
    Ready(Arc<IndexSnapshot>),
}

struct ManagerState {
    phase: IndexPhase,
    /// The snapshot (if any) does not reflect the store.
    dirty: bool,
    /// Bumped on every invalidation. A build that started under an older
    /// generation leaves the snapshot dirty.
    generation: u64,
}

enum EnsureStep {
    Wait(watch::Receiver<Option<BuildOutcome>>),
    Build(watch::Sender<Option<BuildOutcome>>, u64),
}

/// Cache and consistency layer between a [`RecordStore`] and the HNSW index.
///
/// Construct one per store and share it (e.g. in an `Arc`); there is no global
/// instance.
pub struct IndexManager<S> {
    store: S,
    config: HnswConfig,
    state: Mutex<ManagerState>,
}

impl<S: RecordStore> IndexManager<S> {
    /// Creates a manager over `store`. Nothing is read until the first search.
    pub fn new(store: S, config: HnswConfig) -> Self {
        Self {
            store,
            config,
            state: Mutex::new(ManagerState {
                phase: IndexPhase::Idle,
                dirty: true,
                generation: 0,
            }),
        }
    }

    /// Creates a manager with the default HNSW configuration.
    pub fn with_default_config(store: S) -> Self {
        Self::new(store, HnswConfig::default())
    }

    /// The underlying record store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Whether the next search will rebuild the snapshot.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Marks the snapshot stale so the next search rebuilds it.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.dirty = true;
        state.generation += 1;
    }

    /// Persists a new record and, if the graph is fresh, indexes it in place.
    ///
    /// A failure to index never fails the write: the graph is marked dirty
    /// instead.
    pub async fn add_record(&self, new: NewRecord) -> Result<VectorRecord, ManagerError> {
        let record = VectorRecord::from_new(new);
        self.store.persist(&record).await?;
        self.index_incrementally(&record);
        Ok(record)
    }

    fn index_incrementally(&self, record: &VectorRecord) {
        let mut guard = self.state.lock();
        let ManagerState {
            phase,
            dirty,
            generation,
        } = &mut *guard;

        let snapshot = match phase {
            IndexPhase::Ready(snapshot) if !*dirty => Arc::make_mut(snapshot),
            // Idle, building, or dirty: the next build picks the record up
            _ => {
                *dirty = true;
                *generation += 1;
                return;
            }
        };

        snapshot
            .cache
            .insert(record.id, Arc::new(record.clone()));
        if !record.has_embedding() {
            return;
        }

        match snapshot.index.as_mut() {
            Some(index) => {
                if let Err(e) = index.add_item(record.id, &record.embedding) {
                    tracing::warn!(id = %record.id, "incremental index insert failed, marking index dirty: {}", e);
                    *dirty = true;
                    *generation += 1;
                }
            }
            // First indexable record: let the rebuild pick the dimensionality
            None => {
                *dirty = true;
                *generation += 1;
            }
        }
    }

    /// Applies `patch` to a stored record and marks the graph dirty.
    pub async fn update_record(
        &self,
        id: RecordId,
        patch: RecordPatch,
    ) -> Result<VectorRecord, ManagerError> {
        let mut record = self
            .store
            .get(&id)
            .await?
            .ok_or(ManagerError::NotFound(id))?;
        record.apply(patch);
        self.store.persist(&record).await?;
        self.invalidate();
        Ok(record)
    }

    /// Deletes a record and marks the graph dirty. Returns `true` if it existed.
    pub async fn delete_record(&self, id: RecordId) -> Result<bool, ManagerError> {
        let existed = self.store.delete(&id).await?;
        self.invalidate();
        Ok(existed)
    }

    /// Removes every record and marks the graph dirty.
    pub async fn clear(&self) -> Result<(), ManagerError> {
        self.store.clear().await?;
        self.invalidate();
        Ok(())
    }

    /// A record straight from the store.
    pub async fn get_record(&self, id: RecordId) -> Result<Option<VectorRecord>, ManagerError> {
        Ok(self.store.get(&id).await?)
    }

    /// All records, newest first.
    pub async fn list_records(&self) -> Result<Vec<VectorRecord>, ManagerError> {
        let mut records = self.store.fetch_all().await?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<usize, ManagerError> {
        Ok(self.store.fetch_all().await?.len())
    }

    /// Statistics over the stored records plus the state of the graph.
    pub async fn stats(&self) -> Result<RecordStats, ManagerError> {
        let records = self.store.fetch_all().await?;
        let (indexed, index_dirty) = {
            let state = self.state.lock();
            let indexed = match &state.phase {
                IndexPhase::Ready(snapshot) => snapshot.indexed_len(),
                _ => 0,
            };
            (indexed, state.dirty)
        };

        if records.is_empty() {
            return Ok(RecordStats {
                count: 0,
                total_bytes: 0,
                average_dimensions: 0,
                oldest_timestamp: None,
                newest_timestamp: None,
                indexed,
                index_dirty,
            });
        }

        let total_bytes = serde_json::to_vec(&records)
            .map_err(|e| StoreError::Serialize(e.to_string()))?
            .len();
        let dimension_sum: usize = records.iter().map(|r| r.dimensions).sum();
        let average_dimensions =
            (dimension_sum as f64 / records.len() as f64).round() as usize;

        Ok(RecordStats {
            count: records.len(),
            total_bytes,
            average_dimensions,
            oldest_timestamp: records.iter().map(|r| r.timestamp).min(),
            newest_timestamp: records.iter().map(|r| r.timestamp).max(),
            indexed,
            index_dirty,
        })
    }

    /// Returns a snapshot that reflects the store, rebuilding it if dirty.
    ///
    /// If another caller is already rebuilding, waits for and shares its result.
    pub async fn ensure_index(&self) -> Result<Arc<IndexSnapshot>, ManagerError> {
        loop {
            let step = {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                match &state.phase {
                    IndexPhase::Ready(snapshot) if !state.dirty => {
                        return Ok(Arc::clone(snapshot));
                    }
                    // A closed channel means the builder was dropped mid-build
                    IndexPhase::Building(rx) if rx.has_changed().is_ok() => {
                        EnsureStep::Wait(rx.clone())
                    }
                    _ => {
                        let (tx, rx) = watch::channel(None);
                        state.phase = IndexPhase::Building(rx);
                        EnsureStep::Build(tx, state.generation)
                    }
                }
            };

            match step {
                EnsureStep::Wait(mut rx) => {
                    let outcome = match rx.wait_for(Option::is_some).await {
                        Ok(value) => value.clone(),
                        Err(_) => None,
                    };
                    if let Some(result) = outcome {
                        return result.map_err(ManagerError::from);
                    }
                    tracing::debug!("Index builder went away, retrying");
                }
                EnsureStep::Build(tx, generation) => {
                    let outcome = self.build_snapshot().await;
                    {
                        let mut state = self.state.lock();
                        match &outcome {
                            Ok(snapshot) => {
                                state.phase = IndexPhase::Ready(Arc::clone(snapshot));
                                if state.generation == generation {
                                    state.dirty = false;
                                } else {
                                    tracing::debug!(
                                        "Records changed during rebuild, index stays dirty"
                                    );
                                }
                            }
                            Err(_) => state.phase = IndexPhase::Idle,
                        }
                    }
                    // Waiters may all be gone; that is fine
                    let _ = tx.send(Some(outcome.clone()));
                    return outcome.map_err(ManagerError::from);
                }
            }
        }
    }

    async fn build_snapshot(&self) -> BuildOutcome {
        let started = Instant::now();
        let records = match self.store.fetch_all().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Index rebuild failed to read records: {}", e);
                return Err(e);
            }
        };
        let total = records.len();
        let snapshot = IndexSnapshot::build(records, &self.config);
        tracing::info!(
            records = total,
            indexed = snapshot.indexed_len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "HNSW index rebuilt"
        );
        Ok(Arc::new(snapshot))
    }

    /// Discards the current graph and rebuilds it now. Returns the number of
    /// indexed records.
    pub async fn rebuild(&self) -> Result<usize, ManagerError> {
        self.invalidate();
        Ok(self.ensure_index().await?.indexed_len())
    }

    /// The `top_k` records most similar to `query`, most similar first.
    ///
    /// Uses the HNSW graph when it can save work over a full scan; otherwise,
    /// or if the graph fails, ranks every cached record exactly.
    pub async fn search(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>, ManagerError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let snapshot = self.ensure_index().await?;
        let record_count = snapshot.len();

        let index = match snapshot.index() {
            Some(index) if record_count > 0 && top_k < record_count => index,
            _ => return Ok(brute_force_search(snapshot.records(), query, top_k)),
        };

        match index.search(query, top_k) {
            Ok(hits) => {
                let mut results: Vec<ScoredRecord> = hits
                    .into_iter()
                    .filter_map(|hit| {
                        snapshot.get(&hit.id).map(|record| ScoredRecord {
                            record: Arc::clone(record),
                            similarity: hit.similarity,
                        })
                    })
                    .collect();
                rank(&mut results, top_k);
                Ok(results)
            }
            Err(IndexError::DimensionMismatch { expected, actual }) => {
                // The query is off, not the graph
                tracing::debug!(expected, actual, "query dimension differs from index, scanning");
                Ok(brute_force_search(snapshot.records(), query, top_k))
            }
            Err(e) => {
                tracing::warn!("HNSW search failed, falling back to brute force: {}", e);
                self.invalidate();
                Ok(brute_force_search(snapshot.records(), query, top_k))
            }
        }
    }

    /// Exact search over every record, bypassing the graph.
    pub async fn search_exact(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>, ManagerError> {
        let snapshot = self.ensure_index().await?;
        Ok(brute_force_search(snapshot.records(), query, top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::store::MemoryRecordStore;

    fn manager() -> IndexManager<MemoryRecordStore> {
        IndexManager::new(
            MemoryRecordStore::new(),
            HnswConfig {
                seed: Some(42),
                ..HnswConfig::default()
            },
        )
    }

    fn make_embedding(dim: usize, seed: usize) -> Vec<f32> {
        (0..dim)
            .map(|j| (((seed + 1) * 2654435761 + j * 40503) & 0xFFFF) as f32 / 65535.0 - 0.5)
            .collect()
    }

    #[test]
    fn test_snapshot_skips_incompatible_records() {
        let mut records = vec![
            VectorRecord::from_new(NewRecord::new("first", vec![1.0, 0.0])),
            VectorRecord::from_new(NewRecord::new("wrong", vec![1.0, 0.0, 0.0])),
            VectorRecord::from_new(NewRecord::new("empty", vec![])),
            VectorRecord::from_new(NewRecord::new("second", vec![0.0, 1.0])),
        ];
        for (i, r) in records.iter_mut().enumerate() {
            r.timestamp = i as i64;
        }
        let snapshot = IndexSnapshot::build(records, &HnswConfig::default());
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.indexed_len(), 2);
        assert_eq!(snapshot.index().unwrap().dimension(), 2);
    }

    #[test]
    fn test_snapshot_without_embeddings_has_no_index() {
        let records = vec![VectorRecord::from_new(NewRecord::new("text only", vec![]))];
        let snapshot = IndexSnapshot::build(records, &HnswConfig::default());
        assert!(snapshot.index().is_none());
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_starts_dirty_and_builds_on_search() {
        let mgr = manager();
        assert!(mgr.is_dirty());
        let results = mgr.search(&[1.0, 0.0], 3).await.unwrap();
        assert!(results.is_empty());
        assert!(!mgr.is_dirty());
    }

    #[tokio::test]
    async fn test_incremental_insert_keeps_index_fresh() {
        let mgr = manager();
        for i in 0..10 {
            mgr.add_record(NewRecord::new(format!("r{i}"), make_embedding(8, i)))
                .await
                .unwrap();
        }
        mgr.rebuild().await.unwrap();
        assert!(!mgr.is_dirty());

        let added = mgr
            .add_record(NewRecord::new("late", make_embedding(8, 100)))
            .await
            .unwrap();
        assert!(!mgr.is_dirty());
        let snapshot = mgr.ensure_index().await.unwrap();
        assert!(snapshot.index().unwrap().contains(&added.id));
        assert_eq!(snapshot.len(), 11);
    }

    #[tokio::test]
    async fn test_mismatched_insert_marks_dirty_but_succeeds() {
        let mgr = manager();
        mgr.add_record(NewRecord::new("a", vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();
        mgr.add_record(NewRecord::new("b", vec![0.0, 1.0, 0.0]))
            .await
            .unwrap();
        mgr.rebuild().await.unwrap();

        let odd = mgr
            .add_record(NewRecord::new("odd", vec![1.0, 0.0]))
            .await
            .unwrap();
        assert!(mgr.is_dirty());
        assert!(mgr.get_record(odd.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_and_delete_mark_dirty() {
        let mgr = manager();
        let rec = mgr
            .add_record(NewRecord::new("a", vec![1.0, 0.0]))
            .await
            .unwrap();
        mgr.rebuild().await.unwrap();

        mgr.update_record(
            rec.id,
            RecordPatch {
                text: Some("a2".into()),
                ..RecordPatch::default()
            },
        )
        .await
        .unwrap();
        assert!(mgr.is_dirty());

        mgr.rebuild().await.unwrap();
        assert!(mgr.delete_record(rec.id).await.unwrap());
        assert!(mgr.is_dirty());
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let mgr = manager();
        let id = uuid::Uuid::new_v4();
        let err = mgr
            .update_record(id, RecordPatch::default())
            .await
            .unwrap_err();
        assert_eq!(err, ManagerError::NotFound(id));
    }

    #[tokio::test]
    async fn test_deleted_record_disappears_after_rebuild() {
        let mgr = manager();
        let mut ids = Vec::new();
        for i in 0..20 {
            let rec = mgr
                .add_record(NewRecord::new(format!("r{i}"), make_embedding(4, i)))
                .await
                .unwrap();
            ids.push(rec);
        }
        let target = ids[7].clone();
        mgr.delete_record(target.id).await.unwrap();
        let results = mgr.search(&target.embedding, 5).await.unwrap();
        assert!(results.iter().all(|r| r.record.id != target.id));
    }

    #[tokio::test]
    async fn test_stats() {
        let mgr = manager();
        let empty = mgr.stats().await.unwrap();
        assert_eq!(empty.count, 0);
        assert_eq!(empty.oldest_timestamp, None);

        let mut first = NewRecord::new("old", vec![1.0, 0.0]);
        first.timestamp = Some(1_000);
        let mut second = NewRecord::new("new", vec![1.0, 0.0, 0.0, 0.0]);
        second.timestamp = Some(5_000);
        mgr.add_record(first).await.unwrap();
        mgr.add_record(second).await.unwrap();

        let stats = mgr.stats().await.unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.average_dimensions, 3);
        assert_eq!(stats.oldest_timestamp, Some(1_000));
        assert_eq!(stats.newest_timestamp, Some(5_000));
        assert!(stats.total_bytes > 0);
        assert!(stats.index_dirty);
    }

    #[tokio::test]
    async fn test_list_records_newest_first() {
        let mgr = manager();
        for ts in [30, 10, 20] {
            let mut new = NewRecord::new(format!("t{ts}"), vec![1.0]);
            new.timestamp = Some(ts);
            mgr.add_record(new).await.unwrap();
        }
        let listed: Vec<i64> = mgr
            .list_records()
            .await
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(listed, vec![30, 20, 10]);
        assert_eq!(mgr.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_clear_empties_search() {
        let mgr = manager();
        mgr.add_record(NewRecord::new("a", vec![1.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(mgr.search(&[1.0, 0.0], 1).await.unwrap().len(), 1);
        mgr.clear().await.unwrap();
        assert!(mgr.search(&[1.0, 0.0], 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch_falls_back_without_dirtying() {
        let mgr = manager();
        for i in 0..10 {
            mgr.add_record(NewRecord::new(format!("r{i}"), make_embedding(4, i)))
                .await
                .unwrap();
        }
        mgr.rebuild().await.unwrap();
        let results = mgr.search(&[1.0, 0.0], 3).await.unwrap();
        assert!(results.is_empty());
        assert!(!mgr.is_dirty());
    }

    #[tokio::test]
    async fn test_corrupt_graph_falls_back_and_marks_dirty() {
        let mgr = manager();
        for i in 0..10 {
            let t = i as f32 * 0.15;
            mgr.add_record(NewRecord::new(format!("r{i}"), vec![t.cos(), t.sin()]))
                .await
                .unwrap();
        }
        mgr.rebuild().await.unwrap();

        {
            let mut state = mgr.state.lock();
            let IndexPhase::Ready(snapshot) = &mut state.phase else {
                panic!("expected a built snapshot");
            };
            let index = Arc::make_mut(snapshot).index.as_mut().unwrap();
            for layers in index.neighbors.iter_mut() {
                layers[0].push(999);
            }
        }

        let results = mgr.search(&[1.0, 0.0], 2).await.unwrap();
        assert!(mgr.is_dirty());
        let texts: Vec<&str> = results.iter().map(|r| r.record.text.as_str()).collect();
        assert_eq!(texts, vec!["r0", "r1"]);
        assert!((results[0].similarity - 1.0).abs() < 1e-6);

        // The next search rebuilds a sound graph
        let again = mgr.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(again[0].record.text, "r0");
        assert!(!mgr.is_dirty());
    }
}
