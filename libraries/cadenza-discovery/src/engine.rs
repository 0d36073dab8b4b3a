//! The discovery engine
//!
//! Owns the long-lived learning state (vector store, transition model, skip
//! analyzer), the fusion pipeline and its cache, and the playback queue.
//! Collaborators for history, catalogue access, and snapshot persistence are
//! injected behind traits so the engine stays storage-agnostic.
//!
//! Lifecycle is explicit: `start` restores persisted state, `shutdown` saves
//! it. In between, playback events flow in through `record_completion` and
//! `record_skip`, and ranked recommendations flow out of
//! `request_recommendations`.

use crate::agents::{
    ScoringAgent, ScoringContext, SimilarityAgent, StatisticalAgent, TrackStats, TransitionAgent,
};
use crate::cache::RecommendationCache;
use crate::error::Result;
use crate::events::{EventBus, QueueEvent};
use crate::fusion::FusionCoordinator;
use crate::markov::{TransitionConfig, TransitionModel};
use crate::queue::{QueueController, RefillSource};
use crate::shuffle::{shuffle_weighted, ShuffleCandidate};
use crate::skip::{skip_penalty, SkipAnalyzer, SkipPattern, SkipSeverity};
use crate::types::{
    confidence_score, DiscoveryConfig, FeatureVector, RecommendationResult, ScoredTrack,
};
use crate::vector_store::FeatureVectorStore;
use async_trait::async_trait;
use cadenza_core::{Catalogue, HistoryStore, InteractionEvent, SnapshotStore, Track, TrackId};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Snapshot key for the feature vector store
const VECTORS_KEY: &str = "vectors";

/// Snapshot key for the transition model
const TRANSITIONS_KEY: &str = "transitions";

/// Everything the engine owns except the queue
///
/// Split out so the queue's refill source can share it without a reference
/// cycle through the engine itself.
struct EngineInner {
    config: DiscoveryConfig,
    history: Arc<dyn HistoryStore>,
    catalogue: Arc<dyn Catalogue>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    vectors: Arc<FeatureVectorStore>,
    transitions: Arc<TransitionModel>,
    analyzer: SkipAnalyzer,
    fusion: FusionCoordinator,
    cache: RecommendationCache,
    last_played: Mutex<Option<TrackId>>,
}

impl EngineInner {
    fn last_played(&self) -> Option<TrackId> {
        self.last_played.lock().unwrap().clone()
    }

    fn set_last_played(&self, id: TrackId) {
        *self.last_played.lock().unwrap() = Some(id);
    }

    /// Ranked recommendations, through the TTL cache
    async fn recommend(
        &self,
        seed: Option<TrackId>,
        count: usize,
    ) -> Result<RecommendationResult> {
        self.cache
            .get_or_compute(seed.clone(), count, || self.compute(seed, count))
            .await
    }

    async fn compute(
        &self,
        seed: Option<TrackId>,
        count: usize,
    ) -> Result<RecommendationResult> {
        let history = self.history.recent(self.config.history_window).await?;
        let candidates = self.candidate_pool(seed.as_ref(), count).await?;
        if candidates.is_empty() {
            tracing::debug!("Empty candidate pool, no recommendations");
            return Ok(RecommendationResult::empty());
        }

        let confidence = self.confidence(&history);
        let ctx = Arc::new(ScoringContext {
            history,
            seed,
            candidates,
        });

        let mut tracks = self.fusion.fuse(ctx).await;
        tracks.truncate(count);
        if tracks.is_empty() {
            return Ok(RecommendationResult::empty());
        }

        Ok(RecommendationResult {
            tracks,
            computed_at: Utc::now(),
            confidence,
        })
    }

    /// Chunked catalogue scan, bounded by the pool multiplier
    ///
    /// Never loads the whole catalogue; scanning stops once the pool is
    /// comfortably larger than the requested count.
    async fn candidate_pool(
        &self,
        seed: Option<&TrackId>,
        count: usize,
    ) -> Result<Vec<Track>> {
        let target = self.config.pool_multiplier * count.max(1);
        let mut pool = Vec::new();
        let mut offset = 0;

        loop {
            let page = self
                .catalogue
                .get_page(offset, self.config.scan_chunk_size)
                .await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();
            pool.extend(page.into_iter().filter(|t| Some(&t.id) != seed));
            if pool.len() >= target {
                break;
            }
        }

        Ok(pool)
    }

    /// Implicit-feedback confidence over the recent history window
    fn confidence(&self, history: &[InteractionEvent]) -> f32 {
        let stats = TrackStats::aggregate(history);
        let plays: u32 = stats.values().map(|s| s.play_count).sum();
        if plays == 0 {
            return crate::types::MIN_CONFIDENCE;
        }

        let skips: u32 = stats.values().map(|s| s.skip_count).sum();
        let completion = stats
            .values()
            .map(|s| s.avg_completion * s.play_count as f32)
            .sum::<f32>()
            / plays as f32;
        confidence_score(completion, skips as f32 / plays as f32, plays)
    }

    /// Resolve scored ids to tracks, dropping any the catalogue lost
    async fn resolve(&self, scored: &[ScoredTrack]) -> Result<Vec<Track>> {
        let mut tracks = Vec::with_capacity(scored.len());
        for entry in scored {
            if let Some(track) = self.catalogue.get_by_id(&entry.track_id).await? {
                tracks.push(track);
            }
        }
        Ok(tracks)
    }

    /// Best-effort snapshot save for both learned components
    async fn save_snapshots(&self) {
        let Some(store) = &self.snapshots else {
            return;
        };
        if let Err(e) = store.save(VECTORS_KEY, &self.vectors.take_snapshot()).await {
            tracing::warn!("Failed to save vector snapshot: {}", e);
        }
        if let Err(e) = store
            .save(TRANSITIONS_KEY, &self.transitions.take_snapshot())
            .await
        {
            tracing::warn!("Failed to save transition snapshot: {}", e);
        }
    }
}

/// Refill policy: recommendations, then learned transitions, then catalogue
/// affinity, then random
///
/// Each tier is tried only when the previous one came up short, so a cold
/// or degraded engine still keeps the queue populated.
struct TieredRefill {
    inner: Arc<EngineInner>,
}

#[async_trait]
impl RefillSource for TieredRefill {
    async fn refill(&self, seed: Option<TrackId>, count: usize) -> Vec<Track> {
        let seed = match seed {
            Some(seed) => Some(seed),
            // Nothing played this session: seed from the all-time favorite
            None => match self.inner.history.most_played(1).await {
                Ok(mut ids) => ids.pop(),
                Err(e) => {
                    tracing::warn!("Failed to query most-played history: {}", e);
                    None
                }
            },
        };

        match self.recommended(seed.clone(), count).await {
            Ok(tracks) if !tracks.is_empty() => return tracks,
            Ok(_) => {}
            Err(e) => tracing::warn!("Recommendation refill failed: {}", e),
        }

        if let Some(seed) = &seed {
            match self.transition_walk(seed, count).await {
                Ok(tracks) if !tracks.is_empty() => {
                    tracing::debug!("Refill walked {} learned transitions", tracks.len());
                    return tracks;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Transition refill failed: {}", e),
            }

            match self.related(seed, count).await {
                Ok(tracks) if !tracks.is_empty() => {
                    tracing::debug!("Refill fell back to artist/genre affinity");
                    return tracks;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Affinity refill failed: {}", e),
            }
        }

        match self.random(count).await {
            Ok(tracks) => {
                tracing::info!("Refill degraded to random catalogue sample");
                tracks
            }
            Err(e) => {
                tracing::warn!("Random refill failed: {}", e);
                Vec::new()
            }
        }
    }
}

impl TieredRefill {
    async fn recommended(&self, seed: Option<TrackId>, count: usize) -> Result<Vec<Track>> {
        let result = self.inner.recommend(seed, count).await?;
        self.inner.resolve(&result.tracks).await
    }

    /// Roulette walk along learned transitions from the seed
    ///
    /// Skipped entirely when the model has nothing outgoing for the seed, so
    /// a cold engine falls straight through to affinity.
    async fn transition_walk(&self, seed: &TrackId, count: usize) -> Result<Vec<Track>> {
        if self.inner.transitions.outgoing(seed).is_empty() {
            return Ok(Vec::new());
        }

        let pool: Vec<TrackId> = self
            .inner
            .catalogue
            .get_page(0, self.inner.config.scan_chunk_size)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();

        let mut tracks = Vec::new();
        let mut visited: HashSet<TrackId> = HashSet::new();
        visited.insert(seed.clone());
        let mut current = seed.clone();
        while tracks.len() < count {
            let Some(next) = self.inner.transitions.recommend_next(&current, &pool) else {
                break;
            };
            if !visited.insert(next.clone()) {
                break;
            }
            if let Some(track) = self.inner.catalogue.get_by_id(&next).await? {
                tracks.push(track);
            }
            current = next;
        }
        Ok(tracks)
    }

    /// Tracks sharing the seed's artist or genre
    async fn related(&self, seed: &TrackId, count: usize) -> Result<Vec<Track>> {
        let Some(seed_track) = self.inner.catalogue.get_by_id(seed).await? else {
            return Ok(Vec::new());
        };

        let mut related = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .inner
                .catalogue
                .get_page(offset, self.inner.config.scan_chunk_size)
                .await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();
            related.extend(page.into_iter().filter(|t| {
                t.id != *seed
                    && (t.artist == seed_track.artist
                        || (t.genre.is_some() && t.genre == seed_track.genre))
            }));
            if related.len() >= count {
                break;
            }
        }

        related.truncate(count);
        Ok(related)
    }

    /// Uniform random sample of the catalogue
    async fn random(&self, count: usize) -> Result<Vec<Track>> {
        let total = self.inner.catalogue.count().await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let start = {
            let mut rng = rand::thread_rng();
            rng.gen_range(0..total.saturating_sub(count).max(1))
        };
        let mut page = self.inner.catalogue.get_page(start, count).await?;
        page.shuffle(&mut rand::thread_rng());
        Ok(page)
    }
}

/// On-device recommendation and adaptive queueing engine
pub struct DiscoveryEngine {
    inner: Arc<EngineInner>,
    bus: Arc<EventBus>,
    queue: QueueController,
}

impl DiscoveryEngine {
    /// Wire up an engine over the given collaborators
    ///
    /// Pass `None` for `snapshots` to run fully in-memory (learned state is
    /// lost on drop).
    pub fn new(
        config: DiscoveryConfig,
        history: Arc<dyn HistoryStore>,
        catalogue: Arc<dyn Catalogue>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        let vectors = Arc::new(FeatureVectorStore::new(
            config.vector_capacity,
            config.snapshot_interval,
        ));
        let transitions = Arc::new(TransitionModel::new(TransitionConfig {
            alpha: config.transition_alpha,
            beta: config.transition_beta,
            epsilon: config.transition_epsilon,
            half_life_days: config.decay_half_life_days,
            prune_floor: config.prune_floor,
            retention_days: config.retention_days,
            prune_interval: config.prune_interval,
        }));

        let agents: Vec<Arc<dyn ScoringAgent>> = vec![
            Arc::new(StatisticalAgent::default()),
            Arc::new(SimilarityAgent::new(
                Arc::clone(&vectors),
                config.min_history_tracks,
                config.similarity_top_k,
            )),
            Arc::new(TransitionAgent::new(Arc::clone(&transitions))),
        ];
        let fusion = FusionCoordinator::new(agents, Arc::clone(&vectors), &config);
        let cache = RecommendationCache::new(config.cache_ttl);

        let inner = Arc::new(EngineInner {
            history,
            catalogue,
            snapshots,
            vectors,
            transitions,
            analyzer: SkipAnalyzer::new(),
            fusion,
            cache,
            last_played: Mutex::new(None),
            config: config.clone(),
        });

        let bus = Arc::new(EventBus::new(config.event_buffer));
        let queue = QueueController::new(
            Arc::clone(&bus),
            Arc::new(TieredRefill {
                inner: Arc::clone(&inner),
            }),
            config.refill_threshold,
            config.refill_count,
            config.queue_history_size,
            config.shuffle_weights,
        );

        Self { inner, bus, queue }
    }

    /// Restore persisted learned state
    ///
    /// Missing or corrupt snapshots start the component cold; `start` never
    /// fails on their account.
    pub async fn start(&self) {
        let Some(store) = &self.inner.snapshots else {
            tracing::debug!("No snapshot store configured, starting cold");
            return;
        };

        match store.load(VECTORS_KEY).await {
            Ok(Some(bytes)) => {
                let restored = self.inner.vectors.restore(&bytes);
                tracing::info!("Restored {} feature vectors", restored);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to load vector snapshot: {}", e),
        }

        match store.load(TRANSITIONS_KEY).await {
            Ok(Some(bytes)) => {
                let restored = self.inner.transitions.restore(&bytes);
                tracing::info!("Restored {} transition edges", restored);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to load transition snapshot: {}", e),
        }
    }

    /// Persist learned state before shutdown
    pub async fn shutdown(&self) {
        self.inner.save_snapshots().await;
    }

    /// Ranked recommendations seeded by `seed` (usually the last played track)
    pub async fn request_recommendations(
        &self,
        seed: Option<TrackId>,
        count: usize,
    ) -> Result<RecommendationResult> {
        self.inner.recommend(seed, count).await
    }

    /// Index or re-index a track's feature vector
    ///
    /// Snapshots the store as insertions accumulate, so a long indexing
    /// session with no playback in between is not lost before shutdown.
    pub async fn index_track(&self, id: impl Into<TrackId>, vector: FeatureVector) {
        self.inner.vectors.store(id, vector);
        if self.inner.vectors.snapshot_due() {
            self.inner.save_snapshots().await;
        }
    }

    /// Record a completed (or substantially played) track
    pub async fn record_completion(&self, event: InteractionEvent) -> Result<()> {
        let inner = &self.inner;
        inner.history.append(event.clone()).await?;

        if let Some(last) = inner.last_played() {
            inner
                .transitions
                .record_transition(&last, &event.track_id, event.completion_rate);
        }
        inner.analyzer.record_completion(event.track_id.clone());
        inner.set_last_played(event.track_id);

        if event.listen_duration >= inner.config.qualifying_listen {
            inner.cache.invalidate().await;
        }
        if inner.vectors.snapshot_due() {
            inner.save_snapshots().await;
        }
        Ok(())
    }

    /// Record a skip
    ///
    /// Returns the skip severity and any behavioral pattern detected. A
    /// FRUSTRATED pattern re-adapts the upcoming queue from fresh
    /// recommendations; other patterns are informational.
    pub async fn record_skip(
        &self,
        event: InteractionEvent,
    ) -> Result<(SkipSeverity, Option<SkipPattern>)> {
        let inner = &self.inner;
        inner.history.append(event.clone()).await?;

        if let Some(last) = inner.last_played() {
            inner.transitions.record_skip(&last, &event.track_id);
        }
        let (severity, pattern) = inner.analyzer.record_skip(
            event.track_id.clone(),
            event.listen_duration,
            event.total_duration,
        );
        inner.set_last_played(event.track_id);

        if event.listen_duration >= inner.config.qualifying_listen
            || pattern == Some(SkipPattern::Frustrated)
        {
            inner.cache.invalidate().await;
        }
        if pattern == Some(SkipPattern::Frustrated) {
            self.re_adapt_queue().await?;
        }
        if inner.vectors.snapshot_due() {
            inner.save_snapshots().await;
        }
        Ok((severity, pattern))
    }

    /// Replace the upcoming queue with fresh recommendations
    async fn re_adapt_queue(&self) -> Result<()> {
        let seed = self.inner.last_played();
        let result = self
            .inner
            .recommend(seed, self.inner.config.refill_count)
            .await?;
        if result.is_empty() {
            tracing::warn!("Re-adaptation produced no recommendations, queue unchanged");
            return Ok(());
        }

        let tracks = self.inner.resolve(&result.tracks).await?;
        tracing::info!("Re-adapting queue with {} fresh tracks", tracks.len());
        self.queue.replace_upcoming(tracks).await;
        Ok(())
    }

    /// Drop the cached recommendations; the next request recomputes
    pub async fn refresh_recommendations(&self) {
        self.inner.cache.invalidate().await;
    }

    /// Start shuffle play: replace the upcoming queue with a weighted,
    /// diversity-constrained shuffle over a catalogue sample
    ///
    /// Candidates carry real signals (profile similarity, transition weight
    /// from the last played track, skip and recency penalties); cold tracks
    /// ride on the exploration bonus.
    pub async fn shuffle_play(&self, count: usize) -> Result<()> {
        let inner = &self.inner;
        let history = inner.history.recent(inner.config.history_window).await?;
        let stats = TrackStats::aggregate(&history);
        let seed = inner.last_played();
        let pool = inner.candidate_pool(seed.as_ref(), count).await?;

        let liked: Vec<FeatureVector> = history
            .iter()
            .filter(|e| !e.skipped && e.completion_rate >= 0.5)
            .filter_map(|e| inner.vectors.get(&e.track_id))
            .collect();
        let target = FeatureVector::centroid(liked.iter());

        let now = Utc::now();
        let candidates: Vec<ShuffleCandidate> = pool
            .into_iter()
            .map(|track| {
                let similarity = match (&target, inner.vectors.get(&track.id)) {
                    (Some(target), Some(vector)) => target.cosine_similarity(&vector),
                    _ => 0.0,
                };
                let transition_weight = seed
                    .as_ref()
                    .and_then(|s| inner.transitions.effective_weight(s, &track.id))
                    .unwrap_or(0.0)
                    .min(1.0);
                let (skip, recency) = match stats.get(&track.id) {
                    Some(s) => {
                        let skip = if s.skip_count > 0 {
                            skip_penalty(s.avg_completion)
                        } else {
                            0.0
                        };
                        let recency = s
                            .last_played
                            .map(|last| {
                                let days =
                                    ((now - last).num_seconds() as f64 / 86_400.0).max(0.0);
                                (-(std::f64::consts::LN_2 / 7.0) * days).exp() as f32
                            })
                            .unwrap_or(0.0);
                        (skip, recency)
                    }
                    None => (0.0, 0.0),
                };
                ShuffleCandidate {
                    track,
                    similarity,
                    transition_weight,
                    skip_penalty: skip,
                    recency_penalty: recency,
                }
            })
            .collect();

        let mut ordered = shuffle_weighted(candidates, &inner.config.shuffle_weights);
        ordered.truncate(count);
        tracing::debug!("Shuffle play queued {} tracks", ordered.len());
        self.queue.replace_upcoming(ordered).await;
        Ok(())
    }

    /// Subscribe to queue and playback events
    pub fn subscribe(&self) -> tokio::sync::mpsc::Receiver<QueueEvent> {
        self.bus.subscribe()
    }

    /// The playback queue
    pub fn queue(&self) -> &QueueController {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// History that records nothing and remembers nothing
    struct NoHistory;

    #[async_trait]
    impl HistoryStore for NoHistory {
        async fn append(&self, _event: InteractionEvent) -> cadenza_core::Result<()> {
            Ok(())
        }

        async fn recent(&self, _n: usize) -> cadenza_core::Result<Vec<InteractionEvent>> {
            Ok(Vec::new())
        }

        async fn most_played(&self, _n: usize) -> cadenza_core::Result<Vec<TrackId>> {
            Ok(Vec::new())
        }
    }

    /// Resolves ids but serves no pages, so the scanning tiers come up empty
    struct LookupCatalogue(Vec<Track>);

    #[async_trait]
    impl Catalogue for LookupCatalogue {
        async fn get_by_id(&self, id: &TrackId) -> cadenza_core::Result<Option<Track>> {
            Ok(self.0.iter().find(|t| &t.id == id).cloned())
        }

        async fn get_page(
            &self,
            _offset: usize,
            _count: usize,
        ) -> cadenza_core::Result<Vec<Track>> {
            Ok(Vec::new())
        }

        async fn count(&self) -> cadenza_core::Result<usize> {
            Ok(0)
        }
    }

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: format!("Track {}", id),
            artist: "Artist".to_string(),
            album: None,
            genre: None,
            duration: Duration::from_secs(180),
        }
    }

    /// Engine with exploration disabled so transition draws are deterministic
    fn greedy_engine(tracks: Vec<Track>) -> DiscoveryEngine {
        let config = DiscoveryConfig {
            transition_epsilon: 0.0,
            ..DiscoveryConfig::default()
        };
        DiscoveryEngine::new(
            config,
            Arc::new(NoHistory),
            Arc::new(LookupCatalogue(tracks)),
            None,
        )
    }

    #[tokio::test]
    async fn transition_walk_follows_learned_edges() {
        let engine = greedy_engine(vec![track("a"), track("b"), track("c")]);
        for _ in 0..5 {
            engine
                .inner
                .transitions
                .record_transition(&"a".to_string(), &"b".to_string(), 1.0);
            engine
                .inner
                .transitions
                .record_transition(&"b".to_string(), &"c".to_string(), 1.0);
        }

        let refill = TieredRefill {
            inner: Arc::clone(&engine.inner),
        };
        let walked = refill.transition_walk(&"a".to_string(), 5).await.unwrap();
        let ids: Vec<&str> = walked.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn transition_walk_abstains_for_unseen_seed() {
        let engine = greedy_engine(vec![track("a"), track("b")]);
        engine
            .inner
            .transitions
            .record_transition(&"a".to_string(), &"b".to_string(), 1.0);

        let refill = TieredRefill {
            inner: Arc::clone(&engine.inner),
        };
        let walked = refill.transition_walk(&"x".to_string(), 5).await.unwrap();
        assert!(walked.is_empty());
    }

    #[tokio::test]
    async fn refill_draws_on_transitions_before_giving_up() {
        // No history and no scannable pages: the recommendation tier is
        // empty, but the learned edge still keeps the queue alive
        let engine = greedy_engine(vec![track("a"), track("b")]);
        for _ in 0..5 {
            engine
                .inner
                .transitions
                .record_transition(&"a".to_string(), &"b".to_string(), 1.0);
        }

        let refill = TieredRefill {
            inner: Arc::clone(&engine.inner),
        };
        let tracks = refill.refill(Some("a".to_string()), 5).await;
        let ids: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }
}
