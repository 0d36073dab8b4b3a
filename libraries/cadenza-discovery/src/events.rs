//! Queue and playback change events
//!
//! Best-effort, non-blocking broadcast to any number of subscribers. Each
//! subscriber gets its own bounded buffer; when that buffer is full the
//! newest event is dropped for that subscriber only. The publisher never
//! blocks, so the playback path stays responsive no matter how slow an
//! observer is.

use cadenza_core::TrackId;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Events emitted by the queue controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueueEvent {
    /// The current track changed
    SongChanged {
        /// ID of the new current track
        track_id: TrackId,
        /// ID of the previous track (if any)
        previous_track_id: Option<TrackId>,
    },

    /// The upcoming list changed (tracks added or replaced)
    QueueUpdated {
        /// New upcoming length
        length: usize,
    },

    /// A track was placed next in line
    PlacedNext {
        /// The inserted track
        track_id: TrackId,
    },

    /// A track was removed from the queue
    Removed {
        /// The removed track
        track_id: TrackId,
        /// Its former upcoming position
        index: usize,
    },

    /// An upcoming track moved position
    Reordered {
        /// Original position
        from: usize,
        /// New position
        to: usize,
    },

    /// The upcoming list was shuffled
    Shuffled,

    /// Auto-refill appended tracks
    Refilled {
        /// Number of tracks added
        added: usize,
    },

    /// The playback position within the queue changed (e.g. jump)
    PositionChanged {
        /// New current track
        track_id: TrackId,
    },

    /// Playback stopped (queue exhausted or current track removed)
    PlaybackStopped,
}

/// Best-effort broadcast bus for queue events
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::Sender<QueueEvent>>>,
    buffer: usize,
}

impl EventBus {
    /// Create a bus whose subscribers buffer up to `buffer` events
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            buffer: buffer.max(1),
        }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> mpsc::Receiver<QueueEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Publish an event to every subscriber
    ///
    /// Never blocks: a full subscriber buffer drops this event for that
    /// subscriber only. Closed subscribers are pruned.
    pub fn publish(&self, event: &QueueEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("Slow subscriber, dropping event: {:?}", event);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn all_subscribers_receive_events() {
        let bus = EventBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(&QueueEvent::Shuffled);

        assert_eq!(rx1.recv().await, Some(QueueEvent::Shuffled));
        assert_eq!(rx2.recv().await, Some(QueueEvent::Shuffled));
    }

    #[tokio::test]
    async fn full_subscriber_drops_newest_without_blocking() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        bus.publish(&QueueEvent::QueueUpdated { length: 1 });
        bus.publish(&QueueEvent::QueueUpdated { length: 2 });
        // Buffer full: this one is dropped for the slow subscriber
        bus.publish(&QueueEvent::QueueUpdated { length: 3 });

        assert_eq!(rx.recv().await, Some(QueueEvent::QueueUpdated { length: 1 }));
        assert_eq!(rx.recv().await, Some(QueueEvent::QueueUpdated { length: 2 }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_affect_others() {
        let bus = EventBus::new(1);
        let mut slow = bus.subscribe();
        let mut fast = bus.subscribe();

        bus.publish(&QueueEvent::QueueUpdated { length: 1 });
        // Drain only the fast subscriber
        assert!(fast.recv().await.is_some());
        bus.publish(&QueueEvent::QueueUpdated { length: 2 });

        assert_eq!(fast.recv().await, Some(QueueEvent::QueueUpdated { length: 2 }));
        // The slow subscriber still has its first event, and only that
        assert_eq!(slow.recv().await, Some(QueueEvent::QueueUpdated { length: 1 }));
        assert!(slow.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned() {
        let bus = EventBus::new(4);
        let rx = bus.subscribe();
        drop(rx);

        bus.publish(&QueueEvent::Shuffled);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
