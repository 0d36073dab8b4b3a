//! Weighted, diversity-constrained shuffle
//!
//! "Shuffle play" is a weighted random draw without replacement, not a hard
//! score sort: repeated shuffles of the same pool vary while still
//! statistically favoring higher-scored tracks. A same-artist adjacency
//! constraint rejects and redraws candidates unless no alternative remains.

use crate::types::ShuffleWeights;
use cadenza_core::Track;
use rand::Rng;

/// Smallest draw weight; keeps every candidate reachable by the roulette
const MIN_DRAW_WEIGHT: f32 = 1e-3;

/// One shuffle candidate with its pre-computed signals
#[derive(Debug, Clone)]
pub struct ShuffleCandidate {
    /// The track to place
    pub track: Track,

    /// Similarity to the listening profile, in [0, 1]
    pub similarity: f32,

    /// Normalized transition weight from the last played track
    pub transition_weight: f32,

    /// Skip penalty, in [0, 1]
    pub skip_penalty: f32,

    /// Recency penalty (recently played ranks lower), in [0, 1]
    pub recency_penalty: f32,
}

impl ShuffleCandidate {
    /// Candidate with no learned signals (pure exploration)
    pub fn cold(track: Track) -> Self {
        Self {
            track,
            similarity: 0.0,
            transition_weight: 0.0,
            skip_penalty: 0.0,
            recency_penalty: 0.0,
        }
    }

    fn draw_weight(&self, weights: &ShuffleWeights) -> f32 {
        let score = self.similarity * weights.similarity
            + self.transition_weight * weights.transition
            - self.skip_penalty * weights.skip
            - self.recency_penalty * weights.recency
            + weights.exploration_bonus;
        score.max(MIN_DRAW_WEIGHT)
    }
}

/// Produce a shuffled ordering of the candidates
///
/// Roulette-wheel selection without replacement. A candidate whose artist
/// matches the immediately preceding selection is excluded from the draw
/// unless no other artist remains.
pub fn shuffle_weighted(candidates: Vec<ShuffleCandidate>, weights: &ShuffleWeights) -> Vec<Track> {
    let mut rng = rand::thread_rng();
    let mut remaining = candidates;
    let mut result = Vec::with_capacity(remaining.len());
    let mut last_artist: Option<String> = None;

    while !remaining.is_empty() {
        let eligible: Vec<usize> = match &last_artist {
            Some(artist) => {
                let other: Vec<usize> = (0..remaining.len())
                    .filter(|i| &remaining[*i].track.artist != artist)
                    .collect();
                if other.is_empty() {
                    (0..remaining.len()).collect()
                } else {
                    other
                }
            }
            None => (0..remaining.len()).collect(),
        };

        let total: f32 = eligible
            .iter()
            .map(|i| remaining[*i].draw_weight(weights))
            .sum();
        let mut roll = rng.gen::<f32>() * total;
        let mut chosen = eligible[eligible.len() - 1];
        for &i in &eligible {
            roll -= remaining[i].draw_weight(weights);
            if roll <= 0.0 {
                chosen = i;
                break;
            }
        }

        let candidate = remaining.swap_remove(chosen);
        last_artist = Some(candidate.track.artist.clone());
        result.push(candidate.track);
    }

    result
}
