//! Core types for the discovery engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed-length feature vector describing a track
///
/// Components are normalized to [0, 1]. Missing components are treated as
/// zero by construction; they are never imputed with guessed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    components: Vec<f32>,
}

impl FeatureVector {
    /// Create a feature vector from raw components
    pub fn new(components: Vec<f32>) -> Self {
        Self { components }
    }

    /// Raw components
    pub fn components(&self) -> &[f32] {
        &self.components
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the vector has no components
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Cosine similarity in [0, 1]
    ///
    /// Defined as 0 for mismatched dimensions or a zero-norm operand, so
    /// callers never divide by zero.
    pub fn cosine_similarity(&self, other: &FeatureVector) -> f32 {
        let a = &self.components;
        let b = &other.components;
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
    }

    /// Component-wise centroid of a set of vectors
    ///
    /// Vectors whose dimension differs from the first are ignored.
    /// Returns `None` for an empty input.
    pub fn centroid<'a>(vectors: impl IntoIterator<Item = &'a FeatureVector>) -> Option<Self> {
        let mut iter = vectors.into_iter();
        let first = iter.next()?;
        let mut sum: Vec<f32> = first.components.clone();
        let mut count = 1usize;

        for v in iter {
            if v.components.len() != sum.len() {
                continue;
            }
            for (acc, c) in sum.iter_mut().zip(v.components.iter()) {
                *acc += c;
            }
            count += 1;
        }

        for acc in &mut sum {
            *acc /= count as f32;
        }
        Some(Self { components: sum })
    }
}

/// Which scoring agent produced a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    /// Weighted multi-feature scoring over history aggregates
    Statistical,

    /// Nearest-neighbor lookup against the feature vector store
    Similarity,

    /// Markov transition graph over track-to-track plays
    Transition,
}

/// A single ranked entry in a recommendation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTrack {
    /// Recommended track
    pub track_id: cadenza_core::TrackId,

    /// Combined or per-agent score, higher is better
    pub score: f32,

    /// Agent that produced (or dominated) this score
    pub source: AgentKind,
}

/// Ephemeral ranked recommendation list
///
/// Valid until its TTL elapses or an invalidating playback event fires; the
/// cache enforces both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    /// Ranked tracks, best first
    pub tracks: Vec<ScoredTrack>,

    /// When this result was computed
    pub computed_at: DateTime<Utc>,

    /// Implicit-feedback confidence in [0.3, 0.95]
    pub confidence: f32,
}

impl RecommendationResult {
    /// An explicit empty result (callers must fall back)
    pub fn empty() -> Self {
        Self {
            tracks: Vec::new(),
            computed_at: Utc::now(),
            confidence: MIN_CONFIDENCE,
        }
    }

    /// Whether the result carries no tracks
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Lower confidence clamp
pub const MIN_CONFIDENCE: f32 = 0.3;

/// Upper confidence clamp
pub const MAX_CONFIDENCE: f32 = 0.95;

/// Implicit-feedback confidence score
///
/// `0.5·completion + 0.3·(1 − skip_rate) + 0.2·min(plays/100, 1)`,
/// clamped to [0.3, 0.95]. Play count saturates around 100 plays.
pub fn confidence_score(completion_rate: f32, skip_rate: f32, play_count: u32) -> f32 {
    let normalized_plays = (play_count as f32 / 100.0).min(1.0);
    let raw = 0.5 * completion_rate + 0.3 * (1.0 - skip_rate) + 0.2 * normalized_plays;
    raw.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// Configuration for the discovery engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Feature vector store capacity (default: 2000)
    pub vector_capacity: usize,

    /// Snapshot the vector store every this many insertions (default: 100)
    pub snapshot_interval: usize,

    /// Nearest-neighbor result size for the similarity agent (default: 20)
    pub similarity_top_k: usize,

    /// Minimum distinct tracks in recent history before the similarity
    /// agent participates (default: 5)
    pub min_history_tracks: usize,

    /// Interaction events pulled from history per scoring round (default: 100)
    pub history_window: usize,

    /// Transition reinforcement increment α (default: 0.1)
    pub transition_alpha: f32,

    /// Transition skip multiplier β (default: 0.5)
    pub transition_beta: f32,

    /// Exploration probability ε for next-track draws (default: 0.2)
    pub transition_epsilon: f64,

    /// Half-life in days for lazy transition decay (default: 23.0)
    pub decay_half_life_days: f64,

    /// Prune transitions below this effective weight (default: 0.01)
    pub prune_floor: f32,

    /// Prune transitions unused for this many days (default: 90)
    pub retention_days: i64,

    /// Prune opportunistically every this many writes (default: 50)
    pub prune_interval: usize,

    /// Fan-in budget per scoring agent (default: 250ms)
    pub agent_timeout: Duration,

    /// Fusion weight per agent kind, before transition elevation
    pub fusion_weights: FusionWeights,

    /// Diversity re-rank: penalize above this similarity (default: 0.85)
    pub diversity_threshold: f32,

    /// Diversity re-rank: geometric penalty decay (default: 0.7)
    pub diversity_decay: f32,

    /// Diversity re-rank shortlist size (default: 50)
    pub diversity_shortlist: usize,

    /// Recommendation cache TTL (default: 5 minutes)
    pub cache_ttl: Duration,

    /// Minimum listen time for an event to invalidate the cache (default: 3s)
    pub qualifying_listen: Duration,

    /// Catalogue scan chunk size for candidate pools (default: 500)
    pub scan_chunk_size: usize,

    /// Stop scanning once the pool exceeds this multiple of the requested
    /// count (default: 10)
    pub pool_multiplier: usize,

    /// Refill the queue when fewer upcoming tracks remain (default: 3)
    pub refill_threshold: usize,

    /// Tracks fetched per auto-refill (default: 10)
    pub refill_count: usize,

    /// Bounded play-history size inside the queue (default: 50)
    pub queue_history_size: usize,

    /// Per-subscriber event buffer before newest events drop (default: 64)
    pub event_buffer: usize,

    /// Shuffle scoring weights
    pub shuffle_weights: ShuffleWeights,
}

/// Relative fusion weight per agent kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionWeights {
    /// Weight of the statistical agent
    pub statistical: f32,

    /// Weight of the similarity agent
    pub similarity: f32,

    /// Weight of the transition agent
    pub transition: f32,

    /// Multiplier applied to the transition weight when the model has
    /// learned outgoing edges for the seed track
    pub transition_boost: f32,
}

impl FusionWeights {
    /// Base weight for an agent kind (before any elevation)
    pub fn weight(&self, kind: AgentKind) -> f32 {
        match kind {
            AgentKind::Statistical => self.statistical,
            AgentKind::Similarity => self.similarity,
            AgentKind::Transition => self.transition,
        }
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            statistical: 1.0,
            similarity: 1.0,
            transition: 1.0,
            transition_boost: 2.0,
        }
    }
}

/// Weights for the shuffle scoring formula
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShuffleWeights {
    /// Similarity contribution
    pub similarity: f32,

    /// Transition-weight contribution
    pub transition: f32,

    /// Skip penalty subtraction
    pub skip: f32,

    /// Recency penalty subtraction
    pub recency: f32,

    /// Flat exploration bonus so cold tracks keep a nonzero draw chance
    pub exploration_bonus: f32,
}

impl Default for ShuffleWeights {
    fn default() -> Self {
        Self {
            similarity: 1.0,
            transition: 1.0,
            skip: 0.8,
            recency: 0.5,
            exploration_bonus: 0.1,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            vector_capacity: 2000,
            snapshot_interval: 100,
            similarity_top_k: 20,
            min_history_tracks: 5,
            history_window: 100,
            transition_alpha: 0.1,
            transition_beta: 0.5,
            transition_epsilon: 0.2,
            decay_half_life_days: 23.0,
            prune_floor: 0.01,
            retention_days: 90,
            prune_interval: 50,
            agent_timeout: Duration::from_millis(250),
            fusion_weights: FusionWeights::default(),
            diversity_threshold: 0.85,
            diversity_decay: 0.7,
            diversity_shortlist: 50,
            cache_ttl: Duration::from_secs(300),
            qualifying_listen: Duration::from_secs(3),
            scan_chunk_size: 500,
            pool_multiplier: 10,
            refill_threshold: 3,
            refill_count: 10,
            queue_history_size: 50,
            event_buffer: 64,
            shuffle_weights: ShuffleWeights::default(),
        }
    }
}
