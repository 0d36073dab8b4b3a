//! Similarity scoring against the feature vector store
//!
//! Builds a target vector from the centroid of recently-liked tracks and
//! asks the vector store for its nearest neighbors.

use super::{ScoringAgent, ScoringContext};
use crate::error::Result;
use crate::types::{AgentKind, FeatureVector, ScoredTrack};
use crate::vector_store::FeatureVectorStore;
use async_trait::async_trait;
use cadenza_core::TrackId;
use std::collections::HashSet;
use std::sync::Arc;

/// Completion rate at or above which a play counts as "liked"
const LIKED_COMPLETION: f32 = 0.5;

/// The similarity scoring agent
pub struct SimilarityAgent {
    store: Arc<FeatureVectorStore>,
    /// Distinct liked tracks required before the agent participates
    min_history_tracks: usize,
    top_k: usize,
}

impl SimilarityAgent {
    /// Create an agent backed by the given vector store
    pub fn new(store: Arc<FeatureVectorStore>, min_history_tracks: usize, top_k: usize) -> Self {
        Self {
            store,
            min_history_tracks,
            top_k,
        }
    }
}

#[async_trait]
impl ScoringAgent for SimilarityAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Similarity
    }

    async fn score(&self, ctx: &ScoringContext) -> Result<Vec<ScoredTrack>> {
        // Distinct recently-liked tracks, newest first
        let mut seen: HashSet<&TrackId> = HashSet::new();
        let mut liked: Vec<&TrackId> = Vec::new();
        for event in &ctx.history {
            if !event.skipped
                && event.completion_rate >= LIKED_COMPLETION
                && seen.insert(&event.track_id)
            {
                liked.push(&event.track_id);
            }
        }

        if liked.len() < self.min_history_tracks {
            // Cold start: explicitly signal exclusion for this round
            tracing::debug!(
                "Similarity agent cold start: {} distinct liked tracks, need {}",
                liked.len(),
                self.min_history_tracks
            );
            return Ok(Vec::new());
        }

        let vectors: Vec<FeatureVector> =
            liked.iter().filter_map(|id| self.store.get(id)).collect();

        let Some(target) = FeatureVector::centroid(vectors.iter()) else {
            return Ok(Vec::new());
        };

        let liked_set: HashSet<&TrackId> = liked.iter().copied().collect();
        let scored = self
            .store
            .find_similar(&target, self.top_k)
            .into_iter()
            .filter(|(id, _)| !liked_set.contains(id) && ctx.seed.as_ref() != Some(id))
            .map(|(track_id, similarity)| ScoredTrack {
                track_id,
                score: similarity,
                source: AgentKind::Similarity,
            })
            .collect();

        Ok(scored)
    }
}
