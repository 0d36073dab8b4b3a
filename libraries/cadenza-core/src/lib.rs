//! Cadenza core types and collaborator contracts
//!
//! Shared foundation for the discovery engine:
//! - Track and interaction-event types
//! - Error taxonomy
//! - Async traits for the history, catalogue, and snapshot collaborators
//!
//! This crate is deliberately free of any storage or audio technology; the
//! concrete implementations live with the application.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{CadenzaError, Result};
pub use traits::{Catalogue, HistoryStore, SnapshotStore};
pub use types::{InteractionEvent, Track, TrackId};
