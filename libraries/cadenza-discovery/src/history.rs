//! Bounded play-history ring for the queue
//!
//! Keeps the most recently played tracks for "previous" navigation and for
//! seeding refills. Oldest entries are discarded automatically.

use cadenza_core::Track;
use std::collections::VecDeque;

/// Play history with bounded size (most recent at the back)
#[derive(Debug, Clone)]
pub struct PlayHistory {
    tracks: VecDeque<Track>,
    max_size: usize,
}

impl PlayHistory {
    /// Create an empty history with the given maximum size
    pub fn new(max_size: usize) -> Self {
        Self {
            tracks: VecDeque::with_capacity(max_size),
            max_size: max_size.max(1),
        }
    }

    /// Add a track; discards the oldest entry when full
    pub fn push(&mut self, track: Track) {
        if self.tracks.len() >= self.max_size {
            self.tracks.pop_front();
        }
        self.tracks.push_back(track);
    }

    /// Most recently played track, without removing it
    pub fn peek(&self) -> Option<&Track> {
        self.tracks.back()
    }

    /// Remove and return the most recent track
    pub fn pop(&mut self) -> Option<Track> {
        self.tracks.pop_back()
    }

    /// All tracks, oldest first
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    /// Number of tracks held
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
