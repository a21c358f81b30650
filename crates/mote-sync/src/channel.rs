//! Broadcast channel — explicit publish/subscribe between components.
//!
//! A [`Channel`] is created once by the host and handed (by `Arc`) to every
//! component that needs to hear or announce changes. There is no global
//! registry: whoever holds the channel can subscribe, whoever publishes
//! reaches every live subscriber, and [`Channel::publish`] reports whether
//! anyone claimed the message.
//!
//! Subscribers are stored as [`Weak`] trait objects. A collaborator that
//! goes away (its `Arc` dropped) is unregistered automatically the next
//! time the channel touches its slot — no unsubscribe-on-drop ceremony
//! required, though explicit [`Channel::unsubscribe`] is available for
//! components that outlive their interest.
//!
//! # Locking
//!
//! The subscriber list sits behind an `RwLock`. `publish` snapshots the
//! live subscribers under the read lock and invokes them *outside* it, so
//! a subscriber may subscribe/unsubscribe (even publish) reentrantly
//! without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

/// A party interested in messages of type `M`.
///
/// Return `true` from [`notify`](Self::notify) to claim the message;
/// [`Channel::publish`] reports whether any subscriber did.
pub trait Subscriber<M>: Send + Sync {
    fn notify(&self, message: &M) -> bool;
}

/// Opaque registration id returned by [`Channel::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Multi-subscriber broadcast channel for messages of type `M`.
pub struct Channel<M> {
    subscribers: RwLock<Vec<(u64, Weak<dyn Subscriber<M>>)>>,
    next_id: AtomicU64,
}

impl<M> Channel<M> {
    /// Create an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a subscriber. The channel holds it weakly: dropping the
    /// subscriber's `Arc` elsewhere is enough to stop deliveries.
    pub fn subscribe(&self, subscriber: &Arc<dyn Subscriber<M>>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subs = self.subscribers.write().expect("subscriber list poisoned");
        subs.push((id, Arc::downgrade(subscriber)));
        SubscriberId(id)
    }

    /// Remove a subscriber by id. Returns `true` if it was still registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subs = self.subscribers.write().expect("subscriber list poisoned");
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id.0);
        subs.len() != before
    }

    /// Deliver `message` to every live subscriber, in subscription order.
    ///
    /// Returns `true` when at least one subscriber claimed the message.
    /// Dead (dropped) subscribers encountered along the way are pruned.
    pub fn publish(&self, message: &M) -> bool {
        // Snapshot live subscribers; note dead ones for pruning.
        let (live, dead): (Vec<Arc<dyn Subscriber<M>>>, Vec<u64>) = {
            let subs = self.subscribers.read().expect("subscriber list poisoned");
            let mut live = Vec::with_capacity(subs.len());
            let mut dead = Vec::new();
            for (id, weak) in subs.iter() {
                match weak.upgrade() {
                    Some(strong) => live.push(strong),
                    None => dead.push(*id),
                }
            }
            (live, dead)
        };

        if !dead.is_empty() {
            let mut subs = self.subscribers.write().expect("subscriber list poisoned");
            subs.retain(|(id, _)| !dead.contains(id));
        }

        // Invoke outside any lock so subscribers may touch the channel.
        let mut handled = false;
        for subscriber in live {
            handled |= subscriber.notify(message);
        }
        handled
    }

    /// Number of currently registered subscribers (live or not yet pruned).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .expect("subscriber list poisoned")
            .len()
    }
}

impl<M> Default for Channel<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> std::fmt::Debug for Channel<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
