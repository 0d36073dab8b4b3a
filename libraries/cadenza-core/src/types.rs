//! Core types shared across the discovery engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unique track identifier from the catalogue
pub type TrackId = String;

/// Track metadata needed for scoring and queue display
///
/// Owned by the catalogue collaborator; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique track identifier
    pub id: TrackId,

    /// Track title
    pub title: String,

    /// Artist name
    pub artist: String,

    /// Album name (optional)
    pub album: Option<String>,

    /// Genre (optional)
    pub genre: Option<String>,

    /// Track duration
    pub duration: Duration,
}

/// A single playback interaction, recorded on lifecycle transitions
///
/// Append-only: events are created once and consumed (never mutated) by the
/// scoring agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// Track the event refers to
    pub track_id: TrackId,

    /// When the event was recorded
    pub timestamp: DateTime<Utc>,

    /// Fraction of the track listened to, in [0, 1]
    pub completion_rate: f32,

    /// Whether the track was skipped before completion
    pub skipped: bool,

    /// How long the user actually listened
    pub listen_duration: Duration,

    /// Total track duration
    pub total_duration: Duration,
}

impl InteractionEvent {
    /// Record a (near-)complete play
    pub fn completion(track_id: impl Into<TrackId>, completion_rate: f32, total: Duration) -> Self {
        let completion_rate = completion_rate.clamp(0.0, 1.0);
        Self {
            track_id: track_id.into(),
            timestamp: Utc::now(),
            completion_rate,
            skipped: false,
            listen_duration: total.mul_f64(f64::from(completion_rate)),
            total_duration: total,
        }
    }

    /// Record a skip after `listened` out of `total`
    pub fn skip(track_id: impl Into<TrackId>, listened: Duration, total: Duration) -> Self {
        let completion_rate = if total.is_zero() {
            0.0
        } else {
            (listened.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0) as f32
        };
        Self {
            track_id: track_id.into(),
            timestamp: Utc::now(),
            completion_rate,
            skipped: true,
            listen_duration: listened,
            total_duration: total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_event_clamps_rate() {
        let event = InteractionEvent::completion("track1", 1.4, Duration::from_secs(200));
        assert_eq!(event.completion_rate, 1.0);
        assert!(!event.skipped);
        assert_eq!(event.listen_duration, Duration::from_secs(200));
    }

    #[test]
    fn skip_event_derives_completion_rate() {
        let event = InteractionEvent::skip(
            "track1",
            Duration::from_secs(5),
            Duration::from_secs(200),
        );
        assert!(event.skipped);
        assert!((event.completion_rate - 0.025).abs() < 1e-6);
    }

    #[test]
    fn skip_event_zero_duration_track() {
        let event = InteractionEvent::skip("track1", Duration::from_secs(5), Duration::ZERO);
        assert_eq!(event.completion_rate, 0.0);
    }
}
