/// Collaborator contracts for the discovery engine
///
/// Only the contracts live here; the concrete storage technology is the
/// application's business. All methods are async so implementations backed by
/// a database or the filesystem stay off the playback path.
use crate::error::Result;
use crate::types::{InteractionEvent, Track, TrackId};
use async_trait::async_trait;

/// Append/query access to the bounded local interaction history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append an interaction event (append-only, never mutated)
    async fn append(&self, event: InteractionEvent) -> Result<()>;

    /// Most recent `n` events, newest first
    async fn recent(&self, n: usize) -> Result<Vec<InteractionEvent>>;

    /// Track ids with the highest play counts, most played first
    async fn most_played(&self, n: usize) -> Result<Vec<TrackId>>;
}

/// Read access to the track catalogue
#[async_trait]
pub trait Catalogue: Send + Sync {
    /// Look up a single track by id
    async fn get_by_id(&self, id: &TrackId) -> Result<Option<Track>>;

    /// Fixed-size page of the catalogue, for chunked scanning
    async fn get_page(&self, offset: usize, count: usize) -> Result<Vec<Track>>;

    /// Total number of tracks in the catalogue
    async fn count(&self) -> Result<usize>;
}

/// Best-effort persistence for engine snapshots
///
/// Snapshots are opaque bytes keyed by component name. A failed or missing
/// load is not fatal: the caller starts cold.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last snapshot for `key`, if any
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Save a snapshot for `key`, replacing any previous one
    async fn save(&self, key: &str, data: &[u8]) -> Result<()>;
}
