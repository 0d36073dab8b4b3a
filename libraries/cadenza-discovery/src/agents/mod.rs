//! Scoring agents
//!
//! A closed set of independent scorers behind one capability trait, so the
//! fusion coordinator can iterate them generically without per-agent
//! branching. Each agent is read-only and side-effect-free with respect to
//! shared state, which is what allows them to run concurrently.

mod similarity;
mod statistical;
mod transition;

pub use similarity::SimilarityAgent;
pub use statistical::{StatisticalAgent, StatisticalWeights, TrackStats};
pub use transition::TransitionAgent;

use crate::error::Result;
use crate::types::{AgentKind, ScoredTrack};
use async_trait::async_trait;
use cadenza_core::{InteractionEvent, Track, TrackId};

/// Read-only input shared by all agents for one scoring round
#[derive(Debug, Clone)]
pub struct ScoringContext {
    /// Recent interaction history, newest first
    pub history: Vec<InteractionEvent>,

    /// Track the recommendation is seeded from (usually last played)
    pub seed: Option<TrackId>,

    /// Candidate catalogue subset to rank
    pub candidates: Vec<Track>,
}

/// A single scoring strategy
///
/// Agents signal "nothing to say" with an empty result, never an error; the
/// coordinator excludes them from fusion for the round.
#[async_trait]
pub trait ScoringAgent: Send + Sync {
    /// Which agent this is, for fusion weighting and result attribution
    fn kind(&self) -> AgentKind;

    /// Score the candidates against the history
    ///
    /// Returned scores are in [0, 1], best first. An empty result excludes
    /// the agent from this round.
    async fn score(&self, ctx: &ScoringContext) -> Result<Vec<ScoredTrack>>;
}
