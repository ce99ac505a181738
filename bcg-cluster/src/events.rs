//! Fan-out of membership events to registered observers

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::member::Member;

/// Receives membership events.
///
/// Callbacks run on the gossip receive path. Anything slow belongs on a
/// task the observer spawns itself.
pub trait MemberObserver: Send + Sync {
    /// A node joined, or came back after being declared gone
    fn notify_join(&self, member: &Member);

    /// A node left or was declared dead
    fn notify_leave(&self, member: &Member);

    /// A node replaced its metadata
    fn notify_update(&self, _member: &Member) {}
}

/// A change in cluster membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberEvent {
    Join(Member),
    Leave(Member),
    Update(Member),
}

impl MemberEvent {
    pub fn member(&self) -> &Member {
        match self {
            MemberEvent::Join(member) | MemberEvent::Leave(member) | MemberEvent::Update(member) => {
                member
            }
        }
    }
}

/// Ordered list of observers that every event is delivered to
#[derive(Default)]
pub struct EventDelegate {
    observers: RwLock<Vec<Arc<dyn MemberObserver>>>,
}

impl EventDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer; delivery follows registration order
    pub fn register(&self, observer: Arc<dyn MemberObserver>) {
        self.observers.write().push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Deliver an event to every observer, in registration order
    pub fn dispatch(&self, event: &MemberEvent) {
        // Observers may register more observers or read the directory.
        let observers = self.observers.read().clone();
        debug!(?event, observers = observers.len(), "dispatching member event");

        for observer in observers {
            match event {
                MemberEvent::Join(member) => observer.notify_join(member),
                MemberEvent::Leave(member) => observer.notify_leave(member),
                MemberEvent::Update(member) => observer.notify_update(member),
            }
        }
    }
}
