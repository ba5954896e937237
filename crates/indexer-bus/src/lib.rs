#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **indexer-bus** – lightweight, in-memory notification bus.
//!
//! The bus carries best-effort wake-up notices from the sync controller and
//! command dispatcher to the projection runtime: "height N has just been
//! committed, go check for new work." It is not a source of truth — a missed
//! notice just means a projection worker polls the store a little later than
//! it otherwise would — so it has no persistence or delivery guarantees
//! beyond a bounded ring buffer.

use std::sync::Arc;
use anyhow::Result;
use indexer_types::Height;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

//─────────────────────────────
//  Notices
//─────────────────────────────

/// A best-effort notification published after a state change a projection
/// worker might care about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub enum Notice {
    /// A new height was committed to the event store: its events are now
    /// visible to readers and projections can catch up to it.
    HeightCommitted {
        /// The height that was just committed.
        height: Height,
    },
    /// The sync controller's catch-up phase has finished; the indexer is
    /// now following the chain tip live.
    CaughtUp {
        /// The height at which live following began.
        height: Height,
    },
}

//─────────────────────────────
//  Event bus trait
//─────────────────────────────

/// Core notification bus abstraction for publishing and subscribing to
/// [`Notice`]s.
///
/// The bus provides a simple publish-subscribe mechanism that allows
/// different components to communicate asynchronously while maintaining
/// loose coupling. All implementations must be thread-safe and support
/// multiple subscribers.
pub trait EventBus: Send + Sync {
    /// Publish a notice to all subscribers.
    ///
    /// This operation should complete quickly and not block the caller.
    /// If subscribers are slow or unavailable, the bus may drop notices
    /// to maintain system responsiveness.
    fn publish(&self, notice: &Notice) -> Result<()>;

    /// Subscribe to the live notice stream.
    ///
    /// Returns a receiver that will receive copies of all notices published
    /// after the subscription was created. Subscribers that fall behind
    /// may miss notices if the bus buffer overflows.
    fn subscribe(&self) -> broadcast::Receiver<Notice>;
}

//─────────────────────────────
//  In-memory bus implementation
//─────────────────────────────

/// Simple in-memory, broadcast-only notice bus using Tokio channels.
///
/// This implementation broadcasts notices to all active subscribers with no
/// persistence: a subscriber that isn't listening when a notice is published
/// simply misses it, which is safe because every consumer treats notices as
/// a hint to re-check durable state, never as the state itself.
#[derive(Debug, Clone)]
pub struct InMemoryBus {
    tx: Arc<broadcast::Sender<Notice>>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl InMemoryBus {
    /// Create a new in-memory bus with the specified ring buffer capacity.
    ///
    /// The capacity determines how many notices can be buffered for slow
    /// subscribers before older notices are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx: Arc::new(tx) }
    }

    /// Get the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventBus for InMemoryBus {
    fn publish(&self, notice: &Notice) -> Result<()> {
        // Ignore lagging-receiver errors; subscribers re-derive state from the store.
        let _ = self.tx.send(notice.clone());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn basic_publish_subscribe() {
        let bus = InMemoryBus::new(16);
        let mut rx = bus.subscribe();

        let notice = Notice::HeightCommitted { height: 100 };
        bus.publish(&notice).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, notice);
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = InMemoryBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        let notice = Notice::CaughtUp { height: 500 };
        bus.publish(&notice).unwrap();

        assert_eq!(rx1.recv().await.unwrap(), notice);
        assert_eq!(rx2.recv().await.unwrap(), notice);
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking_publisher() {
        let bus = InMemoryBus::new(2);
        let mut rx = bus.subscribe();

        for h in 0..5 {
            bus.publish(&Notice::HeightCommitted { height: h }).unwrap();
        }

        match rx.recv().await {
            Ok(_) => {
                while rx.recv().await.is_ok() {}
            }
            Err(RecvError::Lagged(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
