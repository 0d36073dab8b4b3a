//! Shared in-memory collaborators for integration tests

// Not every test binary uses every helper
#![allow(dead_code)]

use async_trait::async_trait;
use cadenza_core::{
    Catalogue, HistoryStore, InteractionEvent, Result, SnapshotStore, Track, TrackId,
};
use std::collections::HashMap;
use std::sync::{Mutex, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

/// Send engine logs to the test writer; `RUST_LOG` controls verbosity
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

pub fn track(id: &str, artist: &str, genre: Option<&str>) -> Track {
    Track {
        id: id.to_string(),
        title: format!("Track {}", id),
        artist: artist.to_string(),
        album: Some("Test Album".to_string()),
        genre: genre.map(str::to_string),
        duration: Duration::from_secs(200),
    }
}

/// Append-only event log
#[derive(Default)]
pub struct InMemoryHistory {
    events: Mutex<Vec<InteractionEvent>>,
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn append(&self, event: InteractionEvent) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn recent(&self, n: usize) -> Result<Vec<InteractionEvent>> {
        let events = self.events.lock().unwrap();
        Ok(events.iter().rev().take(n).cloned().collect())
    }

    async fn most_played(&self, n: usize) -> Result<Vec<TrackId>> {
        let events = self.events.lock().unwrap();
        let mut counts: HashMap<TrackId, usize> = HashMap::new();
        for event in events.iter() {
            *counts.entry(event.track_id.clone()).or_default() += 1;
        }
        let mut ranked: Vec<(TrackId, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(ranked.into_iter().take(n).map(|(id, _)| id).collect())
    }
}

/// Fixed track list served in pages
pub struct InMemoryCatalogue {
    tracks: Vec<Track>,
}

impl InMemoryCatalogue {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }
}

#[async_trait]
impl Catalogue for InMemoryCatalogue {
    async fn get_by_id(&self, id: &TrackId) -> Result<Option<Track>> {
        Ok(self.tracks.iter().find(|t| &t.id == id).cloned())
    }

    async fn get_page(&self, offset: usize, count: usize) -> Result<Vec<Track>> {
        Ok(self
            .tracks
            .iter()
            .skip(offset)
            .take(count)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.tracks.len())
    }
}

/// Snapshot store backed by a map, shared across engine restarts via Arc
#[derive(Default)]
pub struct InMemorySnapshots {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemorySnapshots {
    pub fn is_empty(&self) -> bool {
        self.blobs.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshots {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().unwrap().get(key).cloned())
    }

    async fn save(&self, key: &str, data: &[u8]) -> Result<()> {
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }
}
