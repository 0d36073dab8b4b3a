//! Skip classification and behavioral pattern detection
//!
//! Classifies individual skips by how early they happened and watches a
//! short rolling window of recent outcomes for multi-skip patterns. Only a
//! FRUSTRATED pattern is actionable (queue-wide re-adaptation); SEARCHING
//! and INTERRUPTED are logged and otherwise ignored.

use cadenza_core::TrackId;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// How early a skip happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipSeverity {
    /// Skipped in the first 10% of the track
    Early,

    /// Skipped between 10% and 50%
    Mid,

    /// Skipped after 50%
    Late,
}

/// Classify a skip by listen fraction
pub fn classify(listen: Duration, total: Duration) -> SkipSeverity {
    let ratio = if total.is_zero() {
        0.0
    } else {
        listen.as_secs_f64() / total.as_secs_f64()
    };

    if ratio < 0.10 {
        SkipSeverity::Early
    } else if ratio <= 0.50 {
        SkipSeverity::Mid
    } else {
        SkipSeverity::Late
    }
}

/// Exponential skip penalty: `e^(-completion_rate)`
///
/// Shorter listens produce a larger penalty (closer to 1).
pub fn skip_penalty(completion_rate: f32) -> f32 {
    (-completion_rate).exp()
}

/// Multi-skip behavioral pattern over the rolling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipPattern {
    /// Consecutive early skips across distinct tracks: the queue is
    /// mismatched and should be re-adapted
    Frustrated,

    /// Early skips interleaved with completed plays: the user is hunting
    /// for a specific track, not rejecting the queue
    Searching,

    /// One isolated skip amid otherwise-complete plays: likely external,
    /// not a content signal
    Interrupted,
}

#[derive(Debug, Clone)]
enum Outcome {
    Completed,
    Skipped(SkipSeverity),
}

#[derive(Debug, Clone)]
struct Observation {
    track_id: TrackId,
    outcome: Outcome,
}

/// Consecutive early skips on distinct tracks required for FRUSTRATED
const FRUSTRATED_RUN: usize = 3;

/// Rolling window size
const WINDOW_SIZE: usize = 10;

/// Rolling-window skip pattern analyzer
pub struct SkipAnalyzer {
    window: Mutex<VecDeque<Observation>>,
}

impl SkipAnalyzer {
    /// Create an analyzer with an empty window
    pub fn new() -> Self {
        Self {
            window: Mutex::new(VecDeque::with_capacity(WINDOW_SIZE)),
        }
    }

    /// Record a completed play
    pub fn record_completion(&self, track_id: impl Into<TrackId>) {
        self.push(Observation {
            track_id: track_id.into(),
            outcome: Outcome::Completed,
        });
    }

    /// Record a skip and report the detected pattern, if any
    pub fn record_skip(
        &self,
        track_id: impl Into<TrackId>,
        listen: Duration,
        total: Duration,
    ) -> (SkipSeverity, Option<SkipPattern>) {
        let severity = classify(listen, total);
        self.push(Observation {
            track_id: track_id.into(),
            outcome: Outcome::Skipped(severity),
        });

        let pattern = self.detect();
        match pattern {
            Some(SkipPattern::Searching) => {
                tracing::debug!("Skip pattern: user appears to be searching, not adapting");
            }
            Some(SkipPattern::Interrupted) => {
                tracing::debug!("Skip pattern: isolated skip, likely external interruption");
            }
            Some(SkipPattern::Frustrated) => {
                tracing::info!("Skip pattern: frustrated, requesting queue re-adaptation");
            }
            None => {}
        }

        (severity, pattern)
    }

    fn push(&self, observation: Observation) {
        let mut window = self.window.lock().unwrap();
        if window.len() >= WINDOW_SIZE {
            window.pop_front();
        }
        window.push_back(observation);
    }

    /// Detect the dominant pattern in the current window
    pub fn detect(&self) -> Option<SkipPattern> {
        let window = self.window.lock().unwrap();

        // Trailing run of early skips, newest backwards
        let mut run_tracks: HashSet<&TrackId> = HashSet::new();
        let mut run_len = 0usize;
        for obs in window.iter().rev() {
            match obs.outcome {
                Outcome::Skipped(SkipSeverity::Early) => {
                    run_tracks.insert(&obs.track_id);
                    run_len += 1;
                }
                _ => break,
            }
        }
        if run_len >= FRUSTRATED_RUN && run_tracks.len() >= FRUSTRATED_RUN {
            return Some(SkipPattern::Frustrated);
        }

        let early_skips = window
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Skipped(SkipSeverity::Early)))
            .count();
        let total_skips = window
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Skipped(_)))
            .count();
        let completions = window.len() - total_skips;

        // Early skips separated by at least one completed play
        if early_skips >= 2 && completions >= 1 {
            let mut saw_completion_between = false;
            let mut saw_early = false;
            for obs in window.iter() {
                match obs.outcome {
                    Outcome::Skipped(SkipSeverity::Early) => {
                        if saw_early && saw_completion_between {
                            return Some(SkipPattern::Searching);
                        }
                        saw_early = true;
                        saw_completion_between = false;
                    }
                    Outcome::Completed => {
                        if saw_early {
                            saw_completion_between = true;
                        }
                    }
                    Outcome::Skipped(_) => {}
                }
            }
        }

        if total_skips == 1 && completions >= 2 {
            return Some(SkipPattern::Interrupted);
        }

        None
    }

    /// Drop all recorded observations
    pub fn reset(&self) {
        self.window.lock().unwrap().clear();
    }
}

impl Default for SkipAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
