//! Cadenza - On-Device Music Discovery
//!
//! Local-first recommendation and adaptive queueing. Everything learns from
//! implicit playback feedback on the device itself; no listening data leaves
//! the process.
//!
//! This crate provides:
//! - A bounded, LRU-evicted feature vector store with snapshot persistence
//! - Three concurrent scoring agents (statistical, similarity, transition)
//! - Score fusion with per-agent timeouts and diversity re-ranking
//! - A Markov transition model with skip penalties and lazy decay
//! - Skip severity classification and behavioral pattern detection
//! - A TTL'd recommendation cache invalidated by playback events
//! - Weighted shuffle with a same-artist adjacency constraint
//! - A playback queue with history, jump/reorder, and tiered auto-refill
//!
//! # Architecture
//!
//! The engine is storage-agnostic: history, catalogue access, and snapshot
//! persistence are injected behind the `cadenza-core` traits, so the same
//! engine runs against a database, flat files, or test fixtures.
//!
//! # Example
//!
//! ```rust,no_run
//! use cadenza_discovery::{DiscoveryConfig, DiscoveryEngine, FeatureVector};
//! use cadenza_core::InteractionEvent;
//! use std::time::Duration;
//! # use std::sync::Arc;
//! # async fn demo(
//! #     history: Arc<dyn cadenza_core::HistoryStore>,
//! #     catalogue: Arc<dyn cadenza_core::Catalogue>,
//! # ) -> cadenza_discovery::Result<()> {
//!
//! let engine = DiscoveryEngine::new(DiscoveryConfig::default(), history, catalogue, None);
//! engine.start().await;
//!
//! // Index audio features as tracks are analyzed
//! engine.index_track("track-1", FeatureVector::new(vec![0.4, 0.7, 0.2])).await;
//!
//! // Feed playback outcomes back into the models
//! engine
//!     .record_completion(InteractionEvent::completion(
//!         "track-1",
//!         1.0,
//!         Duration::from_secs(180),
//!     ))
//!     .await?;
//!
//! // Ask for a ranked list seeded by the last played track
//! let result = engine
//!     .request_recommendations(Some("track-1".to_string()), 10)
//!     .await?;
//! for scored in &result.tracks {
//!     println!("{} ({:.2})", scored.track_id, scored.score);
//! }
//! # Ok(())
//! # }
//! ```

mod agents;
mod cache;
mod engine;
mod error;
mod events;
mod fusion;
mod history;
mod markov;
mod queue;
mod shuffle;
mod skip;
pub mod types;
mod vector_store;

// Public exports
pub use agents::{
    ScoringAgent, ScoringContext, SimilarityAgent, StatisticalAgent, StatisticalWeights,
    TrackStats, TransitionAgent,
};
pub use engine::DiscoveryEngine;
pub use error::{DiscoveryError, Result};
pub use events::{EventBus, QueueEvent};
pub use history::PlayHistory;
pub use markov::{TransitionConfig, TransitionEdge, TransitionModel};
pub use queue::{QueueController, QueueSnapshot, RefillSource};
pub use shuffle::{shuffle_weighted, ShuffleCandidate};
pub use skip::{classify, skip_penalty, SkipAnalyzer, SkipPattern, SkipSeverity};
pub use types::{
    AgentKind, DiscoveryConfig, FeatureVector, FusionWeights, RecommendationResult, ScoredTrack,
    ShuffleWeights,
};
pub use vector_store::FeatureVectorStore;
