//! Queue state machine
//!
//! Owns the single mutable queue state: the upcoming list, the current
//! track, and a bounded play history. External callers read snapshots or
//! invoke operations; nothing else mutates the state. Auto-refill pulls from
//! a pluggable source when the upcoming list runs low, and every mutation is
//! announced on the event bus.

use crate::error::{DiscoveryError, Result};
use crate::events::{EventBus, QueueEvent};
use crate::history::PlayHistory;
use crate::shuffle::{shuffle_weighted, ShuffleCandidate};
use crate::types::ShuffleWeights;
use async_trait::async_trait;
use cadenza_core::{Track, TrackId};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Source of replacement tracks for auto-refill
///
/// Implementations own the fallback policy; the controller only asks.
#[async_trait]
pub trait RefillSource: Send + Sync {
    /// Up to `count` tracks to append, seeded by the last played track
    ///
    /// An empty result means even the last fallback tier produced nothing.
    async fn refill(&self, seed: Option<TrackId>, count: usize) -> Vec<Track>;
}

/// The queue state, exclusively owned by [`QueueController`]
#[derive(Debug)]
struct QueueState {
    upcoming: Vec<Track>,
    current: Option<Track>,
    history: PlayHistory,
}

/// Read-only snapshot of the queue for observers
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    /// Currently playing track, if any
    pub current: Option<Track>,

    /// Upcoming tracks in play order
    pub upcoming: Vec<Track>,

    /// Recently played tracks, oldest first
    pub history: Vec<Track>,
}

/// Queue state machine with auto-refill
pub struct QueueController {
    state: Mutex<QueueState>,
    bus: Arc<EventBus>,
    refill_source: Arc<dyn RefillSource>,
    refill_threshold: usize,
    refill_count: usize,
    shuffle_weights: ShuffleWeights,
}

impl QueueController {
    /// Create a controller with an empty queue
    pub fn new(
        bus: Arc<EventBus>,
        refill_source: Arc<dyn RefillSource>,
        refill_threshold: usize,
        refill_count: usize,
        history_size: usize,
        shuffle_weights: ShuffleWeights,
    ) -> Self {
        Self {
            state: Mutex::new(QueueState {
                upcoming: Vec::new(),
                current: None,
                history: PlayHistory::new(history_size),
            }),
            bus,
            refill_source,
            refill_threshold,
            refill_count,
            shuffle_weights,
        }
    }

    /// Replace the queue: first track becomes current, rest upcoming
    ///
    /// A short initial list is topped up from the refill source right away,
    /// so even a single-track start has something to advance into.
    pub async fn initialize(&self, tracks: Vec<Track>) {
        let has_current = {
            let mut state = self.state.lock().await;
            let previous = state.current.take().map(|t| t.id);
            let mut iter = tracks.into_iter();
            state.current = iter.next();
            state.upcoming = iter.collect();

            if let Some(current) = &state.current {
                self.bus.publish(&QueueEvent::SongChanged {
                    track_id: current.id.clone(),
                    previous_track_id: previous,
                });
            }
            self.bus.publish(&QueueEvent::QueueUpdated {
                length: state.upcoming.len(),
            });
            state.current.is_some()
        };
        if has_current {
            self.maybe_refill().await;
        }
    }

    /// Advance to the next track
    ///
    /// The current track moves to history. When the upcoming list is already
    /// empty, the refill chain is consulted before declaring the queue
    /// exhausted; playback stops only when refill produced nothing too.
    /// Returns the new current track, or `None` when playback stops. May
    /// trigger auto-refill when the upcoming list runs low.
    pub async fn advance(&self) -> Option<Track> {
        let previous_id = {
            let mut state = self.state.lock().await;
            let previous = state.current.take();
            let previous_id = previous.as_ref().map(|t| t.id.clone());
            if let Some(track) = previous {
                state.history.push(track);
            }

            if let Some(next) = self.pop_next(&mut state, previous_id.clone()) {
                drop(state);
                self.maybe_refill().await;
                return Some(next);
            }
            previous_id
        };

        // Depleted mid-session; the refill chain may still have tracks
        self.maybe_refill().await;
        let next = {
            let mut state = self.state.lock().await;
            self.pop_next(&mut state, previous_id)
        };
        match &next {
            Some(_) => self.maybe_refill().await,
            None => self.bus.publish(&QueueEvent::PlaybackStopped),
        }
        next
    }

    /// Pop the head of the upcoming list into current and announce it
    fn pop_next(&self, state: &mut QueueState, previous_id: Option<TrackId>) -> Option<Track> {
        if state.upcoming.is_empty() {
            return None;
        }
        let next = state.upcoming.remove(0);
        state.current = Some(next.clone());
        self.bus.publish(&QueueEvent::SongChanged {
            track_id: next.id.clone(),
            previous_track_id: previous_id,
        });
        Some(next)
    }

    /// Insert a track at the front of the upcoming list
    pub async fn insert_next(&self, track: Track) {
        let mut state = self.state.lock().await;
        self.bus.publish(&QueueEvent::PlacedNext {
            track_id: track.id.clone(),
        });
        state.upcoming.insert(0, track);
        self.bus.publish(&QueueEvent::QueueUpdated {
            length: state.upcoming.len(),
        });
    }

    /// Remove the upcoming track at `index`
    pub async fn remove_at(&self, index: usize) -> Result<Track> {
        let mut state = self.state.lock().await;
        if index >= state.upcoming.len() {
            return Err(DiscoveryError::IndexOutOfBounds(index));
        }
        let track = state.upcoming.remove(index);
        self.bus.publish(&QueueEvent::Removed {
            track_id: track.id.clone(),
            index,
        });
        Ok(track)
    }

    /// Remove a track by id, wherever it is
    ///
    /// Removing the currently-playing track stops playback rather than
    /// silently auto-advancing.
    pub async fn remove_track(&self, id: &TrackId) -> Result<Track> {
        let mut state = self.state.lock().await;

        if let Some(current) = state.current.take() {
            if current.id == *id {
                self.bus.publish(&QueueEvent::PlaybackStopped);
                return Ok(current);
            }
            state.current = Some(current);
        }

        if let Some(index) = state.upcoming.iter().position(|t| &t.id == id) {
            let track = state.upcoming.remove(index);
            self.bus.publish(&QueueEvent::Removed {
                track_id: track.id.clone(),
                index,
            });
            return Ok(track);
        }

        Err(DiscoveryError::InvalidOperation(format!(
            "Track not in queue: {}",
            id
        )))
    }

    /// Move an upcoming track from one position to another
    pub async fn reorder(&self, from: usize, to: usize) -> Result<()> {
        let mut state = self.state.lock().await;
        let len = state.upcoming.len();
        if from >= len {
            return Err(DiscoveryError::IndexOutOfBounds(from));
        }
        if to >= len {
            return Err(DiscoveryError::IndexOutOfBounds(to));
        }
        if from != to {
            let track = state.upcoming.remove(from);
            state.upcoming.insert(to, track);
            self.bus.publish(&QueueEvent::Reordered { from, to });
        }
        Ok(())
    }

    /// Jump to the upcoming track at `position`
    ///
    /// The old current track and all upcoming tracks before `position` move
    /// to history in their original order; the selected track becomes
    /// current.
    pub async fn jump_to(&self, position: usize) -> Result<Track> {
        let mut state = self.state.lock().await;
        if position >= state.upcoming.len() {
            return Err(DiscoveryError::IndexOutOfBounds(position));
        }

        let previous_id = state.current.as_ref().map(|t| t.id.clone());
        if let Some(current) = state.current.take() {
            state.history.push(current);
        }
        let skipped: Vec<Track> = state.upcoming.drain(..position).collect();
        for track in skipped {
            state.history.push(track);
        }

        let target = state.upcoming.remove(0);
        state.current = Some(target.clone());
        self.bus.publish(&QueueEvent::PositionChanged {
            track_id: target.id.clone(),
        });
        self.bus.publish(&QueueEvent::SongChanged {
            track_id: target.id.clone(),
            previous_track_id: previous_id,
        });
        Ok(target)
    }

    /// Jump to the first upcoming occurrence of a track id
    pub async fn jump_to_track(&self, id: &TrackId) -> Result<Track> {
        let position = {
            let state = self.state.lock().await;
            state.upcoming.iter().position(|t| &t.id == id)
        };
        match position {
            Some(position) => self.jump_to(position).await,
            None => Err(DiscoveryError::InvalidOperation(format!(
                "Track not upcoming: {}",
                id
            ))),
        }
    }

    /// Shuffle the upcoming list
    ///
    /// Uses the diversity-constrained weighted draw with neutral signals;
    /// richer signal-driven shuffling replaces the upcoming list through
    /// [`QueueController::replace_upcoming`].
    pub async fn shuffle(&self) {
        let mut state = self.state.lock().await;
        let candidates: Vec<ShuffleCandidate> = state
            .upcoming
            .drain(..)
            .map(ShuffleCandidate::cold)
            .collect();
        state.upcoming = shuffle_weighted(candidates, &self.shuffle_weights);
        self.bus.publish(&QueueEvent::Shuffled);
    }

    /// Replace the upcoming list wholesale (e.g. signal-driven shuffle play)
    pub async fn replace_upcoming(&self, tracks: Vec<Track>) {
        let mut state = self.state.lock().await;
        state.upcoming = tracks;
        self.bus.publish(&QueueEvent::QueueUpdated {
            length: state.upcoming.len(),
        });
    }

    /// Read-only snapshot of the whole queue
    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock().await;
        QueueSnapshot {
            current: state.current.clone(),
            upcoming: state.upcoming.clone(),
            history: state.history.tracks().cloned().collect(),
        }
    }

    /// Refill when the upcoming list has fallen below the threshold
    async fn maybe_refill(&self) {
        let (needs_refill, seed, exclude) = {
            let state = self.state.lock().await;
            let seed = state
                .current
                .as_ref()
                .map(|t| t.id.clone())
                .or_else(|| state.history.peek().map(|t| t.id.clone()));
            let exclude: HashSet<TrackId> = state
                .upcoming
                .iter()
                .map(|t| t.id.clone())
                .chain(state.current.as_ref().map(|t| t.id.clone()))
                .collect();
            (state.upcoming.len() < self.refill_threshold, seed, exclude)
        };
        if !needs_refill {
            return;
        }

        // The lock is released while the refill source computes, so slow
        // scoring never holds up queue reads.
        let tracks = self.refill_source.refill(seed, self.refill_count).await;
        let fresh: Vec<Track> = tracks
            .into_iter()
            .filter(|t| !exclude.contains(&t.id))
            .collect();

        if fresh.is_empty() {
            tracing::warn!("Auto-refill produced no tracks; queue may run out");
            return;
        }

        let added = fresh.len();
        let mut state = self.state.lock().await;
        state.upcoming.extend(fresh);
        self.bus.publish(&QueueEvent::Refilled { added });
        self.bus.publish(&QueueEvent::QueueUpdated {
            length: state.upcoming.len(),
        });
        tracing::debug!("Auto-refill added {} tracks", added);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: format!("Track {}", id),
            artist: format!("Artist {}", id),
            album: None,
            genre: None,
            duration: Duration::from_secs(180),
        }
    }

    /// Refill source returning a fixed list
    struct FixedRefill(Vec<Track>);

    #[async_trait]
    impl RefillSource for FixedRefill {
        async fn refill(&self, _seed: Option<TrackId>, count: usize) -> Vec<Track> {
            self.0.iter().take(count).cloned().collect()
        }
    }

    fn controller(refill: Vec<Track>) -> (QueueController, tokio::sync::mpsc::Receiver<QueueEvent>) {
        let bus = Arc::new(EventBus::new(64));
        let rx = bus.subscribe();
        let controller = QueueController::new(
            bus,
            Arc::new(FixedRefill(refill)),
            3,
            5,
            50,
            ShuffleWeights::default(),
        );
        (controller, rx)
    }

    fn drain(rx: &mut tokio::sync::mpsc::Receiver<QueueEvent>) -> Vec<QueueEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn initialize_sets_current_and_upcoming() {
        let (controller, mut rx) = controller(Vec::new());
        controller
            .initialize(vec![track("1"), track("2"), track("3"), track("4"), track("5")])
            .await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.current.unwrap().id, "1");
        assert_eq!(snapshot.upcoming.len(), 4);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, QueueEvent::SongChanged { track_id, .. } if track_id == "1")));
    }

    #[tokio::test]
    async fn advance_moves_current_to_history() {
        let (controller, _rx) = controller(Vec::new());
        controller
            .initialize(vec![track("1"), track("2"), track("3"), track("4"), track("5")])
            .await;

        let next = controller.advance().await.unwrap();
        assert_eq!(next.id, "2");

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].id, "1");
    }

    #[tokio::test]
    async fn advance_triggers_refill_below_threshold() {
        let (controller, mut rx) = controller(vec![track("r1"), track("r2"), track("r3")]);
        controller
            .initialize(vec![track("1"), track("2"), track("3"), track("4")])
            .await;

        // Upcoming is [2, 3, 4]; advancing leaves [3, 4], below threshold 3
        controller.advance().await.unwrap();

        let snapshot = controller.snapshot().await;
        assert!(snapshot.upcoming.len() > 1);
        assert!(snapshot.upcoming.iter().any(|t| t.id == "r1"));

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, QueueEvent::Refilled { added } if *added == 3)));
    }

    #[tokio::test]
    async fn refill_never_duplicates_queued_tracks() {
        // Refill offers a track already upcoming
        let (controller, _rx) = controller(vec![track("3"), track("fresh")]);
        controller
            .initialize(vec![track("1"), track("2"), track("3"), track("4")])
            .await;

        controller.advance().await.unwrap();

        let snapshot = controller.snapshot().await;
        let count = snapshot.upcoming.iter().filter(|t| t.id == "3").count();
        assert_eq!(count, 1);
        assert!(snapshot.upcoming.iter().any(|t| t.id == "fresh"));
    }

    #[tokio::test]
    async fn exhausted_queue_stops_playback() {
        let (controller, mut rx) = controller(Vec::new());
        controller.initialize(vec![track("1")]).await;

        assert!(controller.advance().await.is_none());
        let snapshot = controller.snapshot().await;
        assert!(snapshot.current.is_none());

        let events = drain(&mut rx);
        assert!(events.contains(&QueueEvent::PlaybackStopped));
    }

    #[tokio::test]
    async fn initialize_tops_up_a_short_queue() {
        let (controller, mut rx) = controller(vec![track("r1"), track("r2"), track("r3")]);
        controller.initialize(vec![track("1")]).await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.current.unwrap().id, "1");
        assert_eq!(snapshot.upcoming.len(), 3);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, QueueEvent::Refilled { added } if *added == 3)));
    }

    #[tokio::test]
    async fn initialize_empty_clears_without_refill() {
        let (controller, _rx) = controller(vec![track("r1"), track("r2")]);
        controller.initialize(vec![track("1"), track("2")]).await;

        // Clearing the queue must not be undone by a top-up
        controller.initialize(Vec::new()).await;
        let snapshot = controller.snapshot().await;
        assert!(snapshot.current.is_none());
        assert!(snapshot.upcoming.is_empty());
    }

    /// Refill source that has nothing the first time it is asked
    struct RecoveringRefill {
        calls: std::sync::Mutex<usize>,
        tracks: Vec<Track>,
    }

    #[async_trait]
    impl RefillSource for RecoveringRefill {
        async fn refill(&self, _seed: Option<TrackId>, count: usize) -> Vec<Track> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                Vec::new()
            } else {
                self.tracks.iter().take(count).cloned().collect()
            }
        }
    }

    #[tokio::test]
    async fn depleted_queue_refills_before_stopping() {
        // Initialization found nothing to top up with, but by the time the
        // single track finishes the source has tracks again: advancing must
        // consult it instead of stopping playback.
        let bus = Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let controller = QueueController::new(
            bus,
            Arc::new(RecoveringRefill {
                calls: std::sync::Mutex::new(0),
                tracks: vec![track("r1"), track("r2")],
            }),
            3,
            5,
            50,
            ShuffleWeights::default(),
        );
        controller.initialize(vec![track("1")]).await;

        let next = controller.advance().await;
        assert_eq!(next.unwrap().id, "r1");

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.current.unwrap().id, "r1");
        assert_eq!(snapshot.history[0].id, "1");

        let events = drain(&mut rx);
        assert!(!events.contains(&QueueEvent::PlaybackStopped));
        assert!(events
            .iter()
            .any(|e| matches!(e, QueueEvent::SongChanged { track_id, .. } if track_id == "r1")));
    }

    #[tokio::test]
    async fn insert_next_goes_to_front() {
        let (controller, _rx) = controller(Vec::new());
        controller.initialize(vec![track("1"), track("2")]).await;

        controller.insert_next(track("urgent")).await;
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.upcoming[0].id, "urgent");
    }

    #[tokio::test]
    async fn remove_at_out_of_bounds() {
        let (controller, _rx) = controller(Vec::new());
        controller.initialize(vec![track("1"), track("2")]).await;

        assert!(matches!(
            controller.remove_at(5).await,
            Err(DiscoveryError::IndexOutOfBounds(5))
        ));
    }

    #[tokio::test]
    async fn removing_current_track_stops_playback() {
        let (controller, mut rx) = controller(Vec::new());
        controller.initialize(vec![track("1"), track("2")]).await;

        let removed = controller.remove_track(&"1".to_string()).await.unwrap();
        assert_eq!(removed.id, "1");

        let snapshot = controller.snapshot().await;
        assert!(snapshot.current.is_none());
        // The upcoming list is untouched: no silent auto-advance
        assert_eq!(snapshot.upcoming.len(), 1);

        let events = drain(&mut rx);
        assert!(events.contains(&QueueEvent::PlaybackStopped));
    }

    #[tokio::test]
    async fn reorder_moves_upcoming_track() {
        let (controller, _rx) = controller(Vec::new());
        controller
            .initialize(vec![track("c"), track("1"), track("2"), track("3")])
            .await;

        controller.reorder(0, 2).await.unwrap();
        let snapshot = controller.snapshot().await;
        let ids: Vec<&str> = snapshot.upcoming.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[tokio::test]
    async fn jump_to_moves_preceding_tracks_to_history() {
        // Scenario: 5 upcoming, jump to position 3 -> positions 0-2 move to
        // history in original order, position 3 becomes current, 1 remains
        let (controller, _rx) = controller(Vec::new());
        controller
            .initialize(vec![
                track("c"),
                track("0"),
                track("1"),
                track("2"),
                track("3"),
                track("4"),
            ])
            .await;

        let target = controller.jump_to(3).await.unwrap();
        assert_eq!(target.id, "3");

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.current.unwrap().id, "3");
        assert_eq!(snapshot.upcoming.len(), 1);
        assert_eq!(snapshot.upcoming[0].id, "4");

        let history_ids: Vec<&str> = snapshot.history.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(history_ids, vec!["c", "0", "1", "2"]);
    }

    #[tokio::test]
    async fn jump_to_track_by_id() {
        let (controller, _rx) = controller(Vec::new());
        controller
            .initialize(vec![track("c"), track("a"), track("b")])
            .await;

        let target = controller.jump_to_track(&"b".to_string()).await.unwrap();
        assert_eq!(target.id, "b");
        assert!(controller.jump_to_track(&"missing".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn shuffle_preserves_upcoming_set() {
        let (controller, mut rx) = controller(Vec::new());
        let tracks: Vec<Track> = (0..10).map(|i| track(&i.to_string())).collect();
        controller.initialize(tracks).await;

        controller.shuffle().await;
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.upcoming.len(), 9);

        let events = drain(&mut rx);
        assert!(events.contains(&QueueEvent::Shuffled));
    }
}
