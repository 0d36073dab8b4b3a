//! Statistical scoring over history aggregates
//!
//! Aggregates the bounded interaction history into per-track behavioral
//! features (play frequency, completion, skip rate, recency) and combines
//! them with a sigmoid over a weighted sum. Each feature is clipped before
//! combination so no single dominant feature saturates the sigmoid.

use super::{ScoringAgent, ScoringContext};
use crate::error::Result;
use crate::types::{AgentKind, ScoredTrack};
use async_trait::async_trait;
use cadenza_core::{InteractionEvent, TrackId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Behavioral features derived from history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Plays relative to the most-played track in the window
    PlayFrequency,

    /// Average completion rate
    Completion,

    /// Fraction of plays that were skips
    SkipRate,

    /// Exponential recency of the last play
    Recency,
}

/// Per-feature weights for the statistical scorer
///
/// Completion dominates; skip rate contributes negatively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalWeights {
    /// Play-frequency weight
    pub play_frequency: f32,

    /// Completion-rate weight
    pub completion: f32,

    /// Skip-rate weight (negative: skips push the score down)
    pub skip_rate: f32,

    /// Recency weight
    pub recency: f32,
}

impl StatisticalWeights {
    fn weight(&self, feature: Feature) -> f32 {
        match feature {
            Feature::PlayFrequency => self.play_frequency,
            Feature::Completion => self.completion,
            Feature::SkipRate => self.skip_rate,
            Feature::Recency => self.recency,
        }
    }
}

impl Default for StatisticalWeights {
    fn default() -> Self {
        Self {
            play_frequency: 0.6,
            completion: 1.2,
            // Strong enough that a consistently-skipped track scores below
            // neutral even when it is frequent and recent
            skip_rate: -1.5,
            recency: 0.5,
        }
    }
}

/// Combine present features into a [0, 1] score
///
/// `sigmoid(Σ weightᵢ · clip(featureᵢ))`. Absent features are skipped, not
/// imputed. An empty feature set returns a neutral 0.5 so fusion never
/// crashes on sparse data.
pub fn score_features(features: &[(Feature, f32)], weights: &StatisticalWeights) -> f32 {
    if features.is_empty() {
        return 0.5;
    }

    let sum: f32 = features
        .iter()
        .map(|(feature, value)| weights.weight(*feature) * value.clamp(0.0, 1.0))
        .sum();

    sigmoid(sum)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Aggregated play statistics for one track
#[derive(Debug, Clone, Default)]
pub struct TrackStats {
    /// Number of interaction events
    pub play_count: u32,

    /// Number of those that were skips
    pub skip_count: u32,

    /// Mean completion rate over all events
    pub avg_completion: f32,

    /// Timestamp of the most recent event
    pub last_played: Option<DateTime<Utc>>,
}

impl TrackStats {
    /// Fraction of plays that were skips
    pub fn skip_rate(&self) -> f32 {
        if self.play_count == 0 {
            0.0
        } else {
            self.skip_count as f32 / self.play_count as f32
        }
    }

    /// Aggregate history events into per-track stats
    pub fn aggregate(history: &[InteractionEvent]) -> HashMap<TrackId, TrackStats> {
        let mut stats: HashMap<TrackId, TrackStats> = HashMap::new();

        for event in history {
            let entry = stats.entry(event.track_id.clone()).or_default();
            let n = entry.play_count as f32;
            entry.avg_completion = (entry.avg_completion * n + event.completion_rate) / (n + 1.0);
            entry.play_count += 1;
            if event.skipped {
                entry.skip_count += 1;
            }
            match entry.last_played {
                Some(prev) if prev >= event.timestamp => {}
                _ => entry.last_played = Some(event.timestamp),
            }
        }

        stats
    }

    fn features(&self, max_plays: u32, now: DateTime<Utc>) -> Vec<(Feature, f32)> {
        let mut features = vec![
            (
                Feature::PlayFrequency,
                self.play_count as f32 / max_plays.max(1) as f32,
            ),
            (Feature::Completion, self.avg_completion),
            (Feature::SkipRate, self.skip_rate()),
        ];
        if let Some(last) = self.last_played {
            let days = (now - last).num_seconds() as f64 / 86_400.0;
            features.push((Feature::Recency, recency_score(days.max(0.0)) as f32));
        }
        features
    }
}

/// Exponential recency, half-life 7 days
fn recency_score(days_since: f64) -> f64 {
    let lambda = std::f64::consts::LN_2 / 7.0;
    (-lambda * days_since).exp()
}

/// The statistical scoring agent
pub struct StatisticalAgent {
    weights: StatisticalWeights,
}

impl StatisticalAgent {
    /// Create an agent with the given feature weights
    pub fn new(weights: StatisticalWeights) -> Self {
        Self { weights }
    }
}

impl Default for StatisticalAgent {
    fn default() -> Self {
        Self::new(StatisticalWeights::default())
    }
}

#[async_trait]
impl ScoringAgent for StatisticalAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Statistical
    }

    async fn score(&self, ctx: &ScoringContext) -> Result<Vec<ScoredTrack>> {
        if ctx.history.is_empty() {
            // Nothing learned yet; bow out of this round
            return Ok(Vec::new());
        }

        let stats = TrackStats::aggregate(&ctx.history);
        let max_plays = stats.values().map(|s| s.play_count).max().unwrap_or(1);
        let now = Utc::now();

        let mut scored: Vec<ScoredTrack> = ctx
            .candidates
            .iter()
            .map(|track| {
                let features = stats
                    .get(&track.id)
                    .map(|s| s.features(max_plays, now))
                    .unwrap_or_default();
                ScoredTrack {
                    track_id: track.id.clone(),
                    score: score_features(&features, &self.weights),
                    source: AgentKind::Statistical,
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored)
    }
}
