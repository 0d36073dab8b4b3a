//! Fusion and diversity re-ranking
//!
//! Runs the scoring agents concurrently, waits for all of them or a bounded
//! timeout, and merges whatever responded into one ranked list. Per-agent
//! failures and timeouts exclude that agent for the round; they never abort
//! the request.

use crate::agents::{ScoringAgent, ScoringContext};
use crate::types::{AgentKind, DiscoveryConfig, FusionWeights, ScoredTrack};
use crate::vector_store::FeatureVectorStore;
use cadenza_core::TrackId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Merges agent outputs with configurable weights and diversity re-ranking
pub struct FusionCoordinator {
    agents: Vec<Arc<dyn ScoringAgent>>,
    store: Arc<FeatureVectorStore>,
    weights: FusionWeights,
    agent_timeout: Duration,
    diversity_threshold: f32,
    diversity_decay: f32,
    diversity_shortlist: usize,
}

impl FusionCoordinator {
    /// Create a coordinator over the given agent set
    pub fn new(
        agents: Vec<Arc<dyn ScoringAgent>>,
        store: Arc<FeatureVectorStore>,
        config: &DiscoveryConfig,
    ) -> Self {
        Self {
            agents,
            store,
            weights: config.fusion_weights.clone(),
            agent_timeout: config.agent_timeout,
            diversity_threshold: config.diversity_threshold,
            diversity_decay: config.diversity_decay,
            diversity_shortlist: config.diversity_shortlist,
        }
    }

    /// Score the context with every agent and fuse the results
    ///
    /// Degenerate cases: exactly one contributing agent passes its ranking
    /// through unchanged; zero contributing agents returns an empty list and
    /// the caller must fall back.
    pub async fn fuse(&self, ctx: Arc<ScoringContext>) -> Vec<ScoredTrack> {
        let mut tasks = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            let agent = Arc::clone(agent);
            let ctx = Arc::clone(&ctx);
            let budget = self.agent_timeout;
            let kind = agent.kind();
            tasks.push((
                kind,
                tokio::spawn(async move { tokio::time::timeout(budget, agent.score(&ctx)).await }),
            ));
        }

        let mut contributions: Vec<(AgentKind, Vec<ScoredTrack>)> = Vec::new();
        for (kind, task) in tasks {
            match task.await {
                Ok(Ok(Ok(scores))) if !scores.is_empty() => contributions.push((kind, scores)),
                Ok(Ok(Ok(_))) => {
                    tracing::debug!("Agent {:?} had nothing to contribute this round", kind);
                }
                Ok(Ok(Err(e))) => {
                    tracing::warn!("Agent {:?} failed, excluded for this round: {}", kind, e);
                }
                Ok(Err(_)) => {
                    tracing::warn!("Agent {:?} exceeded its fan-in budget, excluded", kind);
                }
                Err(e) => {
                    tracing::warn!("Agent {:?} task aborted: {}", kind, e);
                }
            }
        }

        match contributions.len() {
            0 => Vec::new(),
            1 => contributions.remove(0).1,
            _ => {
                let merged = self.merge(&contributions);
                self.diversify(merged)
            }
        }
    }

    /// Weighted average over only the agents that scored each track
    ///
    /// Absent agents are excluded from the denominator, never treated as
    /// contributing zero. The transition weight is elevated when the model
    /// produced edges for the seed.
    fn merge(&self, contributions: &[(AgentKind, Vec<ScoredTrack>)]) -> Vec<ScoredTrack> {
        let transition_contributed = contributions
            .iter()
            .any(|(kind, _)| *kind == AgentKind::Transition);

        let mut accumulated: HashMap<TrackId, (f32, f32, AgentKind, f32)> = HashMap::new();
        for (kind, scores) in contributions {
            let mut weight = self.weights.weight(*kind);
            if *kind == AgentKind::Transition && transition_contributed {
                weight *= self.weights.transition_boost;
            }
            for scored in scores {
                let entry = accumulated
                    .entry(scored.track_id.clone())
                    .or_insert((0.0, 0.0, *kind, f32::MIN));
                entry.0 += weight * scored.score;
                entry.1 += weight;
                // Attribute the track to its strongest contributor
                let contribution = weight * scored.score;
                if contribution > entry.3 {
                    entry.2 = *kind;
                    entry.3 = contribution;
                }
            }
        }

        let mut merged: Vec<ScoredTrack> = accumulated
            .into_iter()
            .map(|(track_id, (sum, weight_sum, source, _))| ScoredTrack {
                track_id,
                score: sum / weight_sum,
                source,
            })
            .collect();

        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.track_id.cmp(&b.track_id))
        });
        merged
    }

    /// Penalize near-duplicates within the bounded shortlist, then re-sort
    ///
    /// O(k²) over the shortlist only, never the full candidate list.
    fn diversify(&self, mut ranked: Vec<ScoredTrack>) -> Vec<ScoredTrack> {
        let shortlist = self.diversity_shortlist.min(ranked.len());
        if shortlist < 2 {
            return ranked;
        }

        let mut selected: Vec<crate::types::FeatureVector> = Vec::with_capacity(shortlist);
        for item in ranked.iter_mut().take(shortlist) {
            let Some(vector) = self.store.get(&item.track_id) else {
                continue;
            };
            let duplicates = selected
                .iter()
                .filter(|v| v.cosine_similarity(&vector) > self.diversity_threshold)
                .count();
            if duplicates > 0 {
                item.score *= self.diversity_decay.powi(duplicates as i32);
            }
            selected.push(vector);
        }

        ranked[..shortlist].sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.track_id.cmp(&b.track_id))
        });
        ranked
    }
}
