//! Transition-model scoring agent
//!
//! Adapter exposing the Markov model's outgoing edges for the seed track as
//! a normalized ranking, so fusion can treat the sequential signal like any
//! other agent.

use super::{ScoringAgent, ScoringContext};
use crate::error::Result;
use crate::markov::TransitionModel;
use crate::types::{AgentKind, ScoredTrack};
use async_trait::async_trait;
use std::sync::Arc;

/// The transition scoring agent
pub struct TransitionAgent {
    model: Arc<TransitionModel>,
}

impl TransitionAgent {
    /// Create an agent over the shared transition model
    pub fn new(model: Arc<TransitionModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ScoringAgent for TransitionAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Transition
    }

    async fn score(&self, ctx: &ScoringContext) -> Result<Vec<ScoredTrack>> {
        let Some(seed) = &ctx.seed else {
            return Ok(Vec::new());
        };

        let outgoing = self.model.outgoing(seed);
        let Some(max) = outgoing.first().map(|(_, w)| *w).filter(|w| *w > 0.0) else {
            return Ok(Vec::new());
        };

        Ok(outgoing
            .into_iter()
            .map(|(track_id, weight)| ScoredTrack {
                track_id,
                score: weight / max,
                source: AgentKind::Transition,
            })
            .collect())
    }
}
