//! Bounded feature-vector index with LRU eviction
//!
//! Holds one feature vector per track, capped at a fixed capacity. Both reads
//! and writes touch recency, so eviction always removes the entry the scoring
//! paths have cared about least. Similarity search is a single linear pass
//! with a bounded candidate buffer, never a full sort over the whole store.

use crate::types::FeatureVector;
use cadenza_core::TrackId;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    vector: FeatureVector,
    /// Monotonic insertion sequence, used for stable tie-breaking
    seq: u64,
}

/// Snapshot wire format: entries from least- to most-recently used, so a
/// restore rebuilds the same recency order.
#[derive(Debug, Serialize, Deserialize)]
struct StoreSnapshot {
    entries: Vec<(TrackId, VectorEntry)>,
    next_seq: u64,
}

struct Inner {
    entries: LruCache<TrackId, VectorEntry>,
    next_seq: u64,
    /// Insertions since the last snapshot was taken
    insertions: usize,
}

/// Bounded, LRU-evicted index of per-track feature vectors
///
/// All access is serialized through one exclusion lock; individual operations
/// are cheap and arrive from many call sites.
pub struct FeatureVectorStore {
    inner: Mutex<Inner>,
    capacity: usize,
    snapshot_interval: usize,
}

impl FeatureVectorStore {
    /// Create an empty store with the given capacity
    ///
    /// `snapshot_interval` controls how many insertions elapse before
    /// `snapshot_due` reports true.
    pub fn new(capacity: usize, snapshot_interval: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(NonZeroUsize::new(capacity).unwrap()),
                next_seq: 0,
                insertions: 0,
            }),
            capacity,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Insert or overwrite the vector for a track
    ///
    /// At capacity, the least-recently-accessed entry is evicted.
    pub fn store(&self, id: impl Into<TrackId>, vector: FeatureVector) {
        let id = id.into();
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.insertions += 1;

        if let Some((evicted, _)) = inner.entries.push(id.clone(), VectorEntry { vector, seq }) {
            if evicted != id {
                tracing::debug!("Vector store at capacity, evicted {}", evicted);
            }
        }
    }

    /// Look up a track's vector, touching its recency
    pub fn get(&self, id: &TrackId) -> Option<FeatureVector> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.get(id).map(|e| e.vector.clone())
    }

    /// Whether the store holds a vector for this track
    pub fn contains(&self, id: &TrackId) -> bool {
        self.inner.lock().unwrap().entries.contains(id)
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Top-k nearest neighbors by cosine similarity, best first
    ///
    /// One linear pass; a candidate buffer capped at `2×top_k` is re-sorted
    /// and truncated only when it overflows. Ties break by insertion order.
    /// The scan does not touch recency.
    pub fn find_similar(&self, query: &FeatureVector, top_k: usize) -> Vec<(TrackId, f32)> {
        if top_k == 0 {
            return Vec::new();
        }

        let inner = self.inner.lock().unwrap();
        let cap = 2 * top_k;
        let mut candidates: Vec<(TrackId, f32, u64)> = Vec::with_capacity(cap + 1);

        for (id, entry) in inner.entries.iter() {
            let similarity = query.cosine_similarity(&entry.vector);
            candidates.push((id.clone(), similarity, entry.seq));

            if candidates.len() > cap {
                Self::sort_candidates(&mut candidates);
                candidates.truncate(top_k);
            }
        }

        Self::sort_candidates(&mut candidates);
        candidates.truncate(top_k);
        candidates.into_iter().map(|(id, sim, _)| (id, sim)).collect()
    }

    fn sort_candidates(candidates: &mut [(TrackId, f32, u64)]) {
        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.2.cmp(&b.2))
        });
    }

    /// Whether enough insertions have accumulated to warrant a snapshot
    pub fn snapshot_due(&self) -> bool {
        self.inner.lock().unwrap().insertions >= self.snapshot_interval
    }

    /// Serialize the store and reset the insertion counter
    pub fn take_snapshot(&self) -> Vec<u8> {
        let mut inner = self.inner.lock().unwrap();
        inner.insertions = 0;

        // iter() yields most-recent first; persist oldest first so a restore
        // replays inserts in recency order.
        let mut entries: Vec<(TrackId, VectorEntry)> = inner
            .entries
            .iter()
            .map(|(id, e)| (id.clone(), e.clone()))
            .collect();
        entries.reverse();

        let snapshot = StoreSnapshot {
            entries,
            next_seq: inner.next_seq,
        };
        serde_json::to_vec(&snapshot).unwrap_or_default()
    }

    /// Restore from snapshot bytes
    ///
    /// A corrupt snapshot leaves the store empty rather than failing; cold
    /// start is always safe. Returns the number of vectors restored.
    pub fn restore(&self, bytes: &[u8]) -> usize {
        let snapshot: StoreSnapshot = match serde_json::from_slice(bytes) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Corrupt vector store snapshot, starting empty: {}", e);
                return 0;
            }
        };

        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        let mut restored = 0;
        for (id, entry) in snapshot.entries {
            inner.entries.push(id, entry);
            restored += 1;
        }
        inner.next_seq = snapshot.next_seq;
        inner.insertions = 0;
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(components: &[f32]) -> FeatureVector {
        FeatureVector::new(components.to_vec())
    }

    #[test]
    fn store_and_get() {
        let store = FeatureVectorStore::new(10, 100);
        store.store("a", vector(&[1.0, 0.0]));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&"a".to_string()), Some(vector(&[1.0, 0.0])));
        assert_eq!(store.get(&"missing".to_string()), None);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let store = FeatureVectorStore::new(5, 100);
        for i in 0..20 {
            store.store(format!("t{}", i), vector(&[i as f32, 1.0]));
        }
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn eviction_follows_access_recency() {
        // Scenario: capacity=3; insert A,B,C; access B; insert D -> A evicted
        let store = FeatureVectorStore::new(3, 100);
        store.store("A", vector(&[1.0]));
        store.store("B", vector(&[1.0]));
        store.store("C", vector(&[1.0]));

        store.get(&"B".to_string());
        store.store("D", vector(&[1.0]));
        store.get(&"D".to_string());

        assert_eq!(store.len(), 3);
        assert!(!store.contains(&"A".to_string()));
        assert!(store.contains(&"B".to_string()));
        assert!(store.contains(&"C".to_string()));
        assert!(store.contains(&"D".to_string()));
    }

    #[test]
    fn overwrite_does_not_grow_store() {
        let store = FeatureVectorStore::new(3, 100);
        store.store("a", vector(&[1.0]));
        store.store("a", vector(&[0.5]));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&"a".to_string()), Some(vector(&[0.5])));
    }

    #[test]
    fn find_similar_orders_by_similarity() {
        let store = FeatureVectorStore::new(10, 100);
        store.store("east", vector(&[1.0, 0.0]));
        store.store("north", vector(&[0.0, 1.0]));
        store.store("northeast", vector(&[0.7, 0.7]));

        let results = store.find_similar(&vector(&[1.0, 0.0]), 3);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, "east");
        assert!((results[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(results[1].0, "northeast");
        assert_eq!(results[2].0, "north");
        assert_eq!(results[2].1, 0.0);
    }

    #[test]
    fn find_similar_zero_query_is_all_zeros() {
        let store = FeatureVectorStore::new(10, 100);
        store.store("a", vector(&[1.0, 0.0]));
        store.store("b", vector(&[0.0, 1.0]));

        let results = store.find_similar(&vector(&[0.0, 0.0]), 2);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, sim)| *sim == 0.0));
    }

    #[test]
    fn find_similar_ties_break_by_insertion_order() {
        let store = FeatureVectorStore::new(10, 100);
        store.store("first", vector(&[1.0, 0.0]));
        store.store("second", vector(&[1.0, 0.0]));
        store.store("third", vector(&[1.0, 0.0]));

        let results = store.find_similar(&vector(&[1.0, 0.0]), 3);
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn find_similar_bounded_buffer_matches_full_sort() {
        let store = FeatureVectorStore::new(200, 1000);
        for i in 0..150 {
            // Distinct similarities against [1, 0]
            let angle = (i as f32) / 150.0;
            store.store(format!("t{}", i), vector(&[1.0 - angle, angle]));
        }

        let results = store.find_similar(&vector(&[1.0, 0.0]), 5);
        assert_eq!(results.len(), 5);
        // Best match is the vector closest to the query axis
        assert_eq!(results[0].0, "t0");
        // Descending similarity throughout
        for pair in results.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn find_similar_top_k_zero() {
        let store = FeatureVectorStore::new(10, 100);
        store.store("a", vector(&[1.0]));
        assert!(store.find_similar(&vector(&[1.0]), 0).is_empty());
    }

    #[test]
    fn snapshot_round_trip_preserves_entries() {
        let store = FeatureVectorStore::new(10, 2);
        store.store("a", vector(&[1.0, 0.0]));
        store.store("b", vector(&[0.0, 1.0]));
        assert!(store.snapshot_due());

        let bytes = store.take_snapshot();
        assert!(!store.snapshot_due());

        let restored = FeatureVectorStore::new(10, 2);
        assert_eq!(restored.restore(&bytes), 2);
        assert_eq!(restored.get(&"a".to_string()), Some(vector(&[1.0, 0.0])));
        assert_eq!(restored.get(&"b".to_string()), Some(vector(&[0.0, 1.0])));
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let store = FeatureVectorStore::new(10, 100);
        assert_eq!(store.restore(b"not json at all"), 0);
        assert!(store.is_empty());
    }
}
