//! Markov-chain transition model over track-to-track plays
//!
//! Directed weighted graph keyed by (from, to) track pairs. Completions
//! reinforce an edge, skips multiply it down toward a positive floor so it
//! can always be re-learned, and decay is applied lazily at read time rather
//! than by a background sweep. Next-track draws are epsilon-greedy roulette
//! so the model cannot collapse into a closed one-or-two-track loop.

use cadenza_core::TrackId;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Hard cap on a learned edge weight
const WEIGHT_CAP: f32 = 10.0;

/// Positive floor: an edge weight never reaches exactly zero
const WEIGHT_FLOOR: f32 = 1e-4;

/// One learned transition edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEdge {
    /// Learned weight in (0, `WEIGHT_CAP`]
    pub weight: f32,

    /// Times this transition was observed
    pub play_count: u32,

    /// Times the destination was skipped after this transition
    pub skip_count: u32,

    /// Mean completion rate of the destination over observations
    pub avg_completion: f32,

    /// Last reinforcement, penalty, or observation
    pub last_updated: DateTime<Utc>,
}

/// Tunables for the transition model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionConfig {
    /// Reinforcement increment α
    pub alpha: f32,

    /// Skip multiplier β
    pub beta: f32,

    /// Exploration probability ε for next-track draws
    pub epsilon: f64,

    /// Half-life in days for lazy decay
    pub half_life_days: f64,

    /// Effective weight below which edges are pruned
    pub prune_floor: f32,

    /// Edges unused for this many days are pruned
    pub retention_days: i64,

    /// Prune opportunistically every this many writes
    pub prune_interval: usize,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            beta: 0.5,
            epsilon: 0.2,
            half_life_days: 23.0,
            prune_floor: 0.01,
            retention_days: 90,
            prune_interval: 50,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EdgeRecord {
    from: TrackId,
    to: TrackId,
    edge: TransitionEdge,
}

struct Inner {
    edges: HashMap<(TrackId, TrackId), TransitionEdge>,
    writes_since_prune: usize,
}

/// The transition model
///
/// Edge updates are serialized through one lock with short critical sections
/// to prevent lost updates between concurrent completion and skip events.
pub struct TransitionModel {
    inner: Mutex<Inner>,
    config: TransitionConfig,
}

impl TransitionModel {
    /// Create an empty model
    pub fn new(config: TransitionConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                edges: HashMap::new(),
                writes_since_prune: 0,
            }),
            config,
        }
    }

    /// Record that `to` started playing after `from` completed
    ///
    /// Reinforces the edge by α, or 2α for an immediate repeat of the same
    /// track. `completion_rate` is the destination's completion.
    pub fn record_transition(&self, from: &TrackId, to: &TrackId, completion_rate: f32) {
        let increment = if from == to {
            2.0 * self.config.alpha
        } else {
            self.config.alpha
        };

        let mut inner = self.inner.lock().unwrap();
        let edge = inner
            .edges
            .entry((from.clone(), to.clone()))
            .or_insert_with(|| TransitionEdge {
                weight: 0.0,
                play_count: 0,
                skip_count: 0,
                avg_completion: 0.0,
                last_updated: Utc::now(),
            });

        edge.weight = (edge.weight + increment).min(WEIGHT_CAP);
        let n = edge.play_count as f32;
        edge.avg_completion = (edge.avg_completion * n + completion_rate) / (n + 1.0);
        edge.play_count += 1;
        edge.last_updated = Utc::now();

        drop(inner);
        self.after_write();
    }

    /// Record that `to` was skipped after `from`
    ///
    /// Multiplies the edge weight by β, floored above zero so the edge can
    /// always be re-learned.
    pub fn record_skip(&self, from: &TrackId, to: &TrackId) {
        let mut inner = self.inner.lock().unwrap();
        let alpha = self.config.alpha;
        let edge = inner
            .edges
            .entry((from.clone(), to.clone()))
            .or_insert_with(|| TransitionEdge {
                // The transition did happen once; start it small
                weight: alpha,
                play_count: 0,
                skip_count: 0,
                avg_completion: 0.0,
                last_updated: Utc::now(),
            });

        edge.weight = (edge.weight * self.config.beta).max(WEIGHT_FLOOR);
        edge.skip_count += 1;
        edge.last_updated = Utc::now();

        drop(inner);
        self.after_write();
    }

    fn after_write(&self) {
        let due = {
            let mut inner = self.inner.lock().unwrap();
            inner.writes_since_prune += 1;
            inner.writes_since_prune >= self.config.prune_interval
        };
        if due {
            let removed = self.prune_weak_transitions();
            if removed > 0 {
                tracing::debug!("Pruned {} weak transitions", removed);
            }
        }
    }

    fn decay_factor(&self, last_updated: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
        let days = ((now - last_updated).num_seconds() as f64 / 86_400.0).max(0.0);
        let lambda = std::f64::consts::LN_2 / self.config.half_life_days;
        (-lambda * days).exp() as f32
    }

    /// Effective (lazily decayed) weight of an edge
    pub fn effective_weight(&self, from: &TrackId, to: &TrackId) -> Option<f32> {
        let inner = self.inner.lock().unwrap();
        let now = Utc::now();
        inner
            .edges
            .get(&(from.clone(), to.clone()))
            .map(|edge| edge.weight * self.decay_factor(edge.last_updated, now))
    }

    /// Outgoing effective weights for a track, heaviest first
    pub fn outgoing(&self, from: &TrackId) -> Vec<(TrackId, f32)> {
        let inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let mut edges: Vec<(TrackId, f32)> = inner
            .edges
            .iter()
            .filter(|((f, _), _)| f == from)
            .map(|((_, to), edge)| {
                (to.clone(), edge.weight * self.decay_factor(edge.last_updated, now))
            })
            .collect();
        edges.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        edges
    }

    /// Draw the next track for `current`
    ///
    /// Roulette-wheel over outgoing effective weights; with probability ε
    /// (or when nothing is learned) a uniformly random track from
    /// `exploration_pool` is substituted instead.
    pub fn recommend_next(
        &self,
        current: &TrackId,
        exploration_pool: &[TrackId],
    ) -> Option<TrackId> {
        let mut rng = rand::thread_rng();

        let explore = rng.gen::<f64>() < self.config.epsilon;
        if !explore {
            let outgoing = self.outgoing(current);
            let total: f32 = outgoing.iter().map(|(_, w)| w).sum();
            if total > 0.0 {
                let mut roll = rng.gen::<f32>() * total;
                for (to, weight) in &outgoing {
                    roll -= weight;
                    if roll <= 0.0 {
                        return Some(to.clone());
                    }
                }
                // Floating-point remainder lands on the heaviest edge
                return outgoing.first().map(|(to, _)| to.clone());
            }
        }

        let choices: Vec<&TrackId> =
            exploration_pool.iter().filter(|id| *id != current).collect();
        choices.choose(&mut rng).map(|id| (*id).clone())
    }

    /// Remove edges below the prune floor or unused past the retention window
    ///
    /// Returns the number of edges removed.
    pub fn prune_weak_transitions(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let before = inner.edges.len();

        let lambda = std::f64::consts::LN_2 / self.config.half_life_days;
        let floor = self.config.prune_floor;
        let retention = self.config.retention_days;
        inner.edges.retain(|_, edge| {
            let days = ((now - edge.last_updated).num_seconds() as f64 / 86_400.0).max(0.0);
            let effective = edge.weight * (-lambda * days).exp() as f32;
            effective >= floor && days <= retention as f64
        });

        inner.writes_since_prune = 0;
        before - inner.edges.len()
    }

    /// Number of learned edges
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().edges.len()
    }

    /// Whether the model has learned nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize all edges
    pub fn take_snapshot(&self) -> Vec<u8> {
        let inner = self.inner.lock().unwrap();
        let records: Vec<EdgeRecord> = inner
            .edges
            .iter()
            .map(|((from, to), edge)| EdgeRecord {
                from: from.clone(),
                to: to.clone(),
                edge: edge.clone(),
            })
            .collect();
        serde_json::to_vec(&records).unwrap_or_default()
    }

    /// Restore from snapshot bytes; corrupt data starts the model empty
    pub fn restore(&self, bytes: &[u8]) -> usize {
        let records: Vec<EdgeRecord> = match serde_json::from_slice(bytes) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Corrupt transition snapshot, starting empty: {}", e);
                return 0;
            }
        };

        let mut inner = self.inner.lock().unwrap();
        inner.edges.clear();
        let restored = records.len();
        for record in records {
            inner.edges.insert((record.from, record.to), record.edge);
        }
        restored
    }
}

impl Default for TransitionModel {
    fn default() -> Self {
        Self::new(TransitionConfig::default())
    }
}
