//! Graph observers: optional mirrors of manager mutations (e.g. an editor).
//!
//! Observers are notified after the manager has released its lock. A
//! panicking observer is logged and otherwise ignored.

use crate::manager::LinkSpec;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Structural change performed by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    NodeAdded { name: String, type_name: String },
    NodeRemoved { name: String },
    LinkAdded(LinkSpec),
    LinkRemoved(LinkSpec),
    Terminated,
}

/// Receives structural events. All hooks default to no-ops and must not block.
pub trait GraphObserver: Send + Sync {
    fn node_added(&self, _name: &str, _type_name: &str) {}

    fn node_removed(&self, _name: &str) {}

    fn link_added(&self, _link: &LinkSpec) {}

    fn link_removed(&self, _link: &LinkSpec) {}

    fn terminated(&self) {}
}

impl GraphEvent {
    /// Deliver this event to `observer`, containing any panic.
    pub fn dispatch(&self, observer: &dyn GraphObserver) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| match self {
            GraphEvent::NodeAdded { name, type_name } => observer.node_added(name, type_name),
            GraphEvent::NodeRemoved { name } => observer.node_removed(name),
            GraphEvent::LinkAdded(link) => observer.link_added(link),
            GraphEvent::LinkRemoved(link) => observer.link_removed(link),
            GraphEvent::Terminated => observer.terminated(),
        }));
        if result.is_err() {
            warn!("Graph observer panicked while handling {:?}", self);
        }
    }
}

/// Forwards events over a bounded channel. Events are dropped when the
/// channel is full or the receiver is gone.
pub struct ChannelObserver {
    tx: Sender<GraphEvent>,
    dropped: AtomicU64,
}

impl ChannelObserver {
    pub fn new(capacity: usize) -> (Self, Receiver<GraphEvent>) {
        let (tx, rx) = bounded(capacity);
        let observer = Self {
            tx,
            dropped: AtomicU64::new(0),
        };
        (observer, rx)
    }

    /// Number of events that could not be queued.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn forward(&self, event: GraphEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl GraphObserver for ChannelObserver {
    fn node_added(&self, name: &str, type_name: &str) {
        self.forward(GraphEvent::NodeAdded {
            name: name.to_string(),
            type_name: type_name.to_string(),
        });
    }

    fn node_removed(&self, name: &str) {
        self.forward(GraphEvent::NodeRemoved {
            name: name.to_string(),
        });
    }

    fn link_added(&self, link: &LinkSpec) {
        self.forward(GraphEvent::LinkAdded(link.clone()));
    }

    fn link_removed(&self, link: &LinkSpec) {
        self.forward(GraphEvent::LinkRemoved(link.clone()));
    }

    fn terminated(&self) {
        self.forward(GraphEvent::Terminated);
    }
}
