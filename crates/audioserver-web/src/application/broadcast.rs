//! Live WebSocket connection registry.
//!
//! Each upgraded connection owns a writer task fed by an unbounded channel.
//! The registry keeps only the sending half ([`Outbox`]) in an arena of
//! generation-tagged slots, so a stale [`ConnectionHandle`] can never reach a
//! connection that reused its slot.  Entries are removed by the owning
//! session's teardown; broadcast itself never prunes, it just skips outboxes
//! whose writer is gone.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Sending half of a connection's outbound text queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbox {
    /// Creates an outbox and the receiver its writer task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Appends `message` to the queue.  Returns `false` if the writer is gone.
    pub fn enqueue(&self, message: String) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Stable reference to one registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    entry: Option<(SocketAddr, Outbox)>,
}

#[derive(Debug, Default)]
struct Inner {
    slots: Vec<Slot>,
    free: Vec<usize>,
    by_peer: HashMap<SocketAddr, ConnectionHandle>,
}

impl Inner {
    fn release(&mut self, handle: ConnectionHandle) {
        if let Some(slot) = self.slots.get_mut(handle.index) {
            if slot.generation == handle.generation && slot.entry.is_some() {
                slot.entry = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(handle.index);
            }
        }
    }

    fn resolve(&self, handle: ConnectionHandle) -> Option<&Outbox> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
            .map(|(_, outbox)| outbox)
    }
}

/// Registry of live WebSocket connections keyed by peer address.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the arena half-updated
        // in a way later calls would misread, so poisoning is ignored.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `outbox` under `peer`.
    ///
    /// A second registration for the same peer replaces the first.
    pub fn add_connection(&self, outbox: Outbox, peer: SocketAddr) -> ConnectionHandle {
        let mut inner = self.lock();
        if let Some(previous) = inner.by_peer.remove(&peer) {
            warn!("websocket peer {peer} registered twice; replacing previous connection");
            inner.release(previous);
        }

        let index = match inner.free.pop() {
            Some(index) => index,
            None => {
                inner.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                inner.slots.len() - 1
            }
        };
        let slot = &mut inner.slots[index];
        slot.entry = Some((peer, outbox));
        let handle = ConnectionHandle {
            index,
            generation: slot.generation,
        };
        inner.by_peer.insert(peer, handle);
        debug!("websocket peer {peer} registered ({} live)", inner.by_peer.len());
        handle
    }

    /// Removes the connection registered under `peer`.
    ///
    /// Idempotent: removing an unknown peer logs a warning and returns `false`.
    pub fn remove_connection(&self, peer: SocketAddr) -> bool {
        let mut inner = self.lock();
        match inner.by_peer.remove(&peer) {
            Some(handle) => {
                inner.release(handle);
                debug!("websocket peer {peer} removed ({} live)", inner.by_peer.len());
                true
            }
            None => {
                warn!("websocket peer {peer} not registered; nothing to remove");
                false
            }
        }
    }

    /// Removes the entry behind `handle` if it still refers to the same
    /// connection.  Used by session teardown so a replaced registration is
    /// left alone.
    pub fn release(&self, handle: ConnectionHandle) -> bool {
        let mut inner = self.lock();
        let Some(peer) = inner
            .slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
            .map(|(peer, _)| *peer)
        else {
            return false;
        };
        if inner.by_peer.get(&peer) == Some(&handle) {
            inner.by_peer.remove(&peer);
        }
        inner.release(handle);
        true
    }

    /// Queues `message` on every registered connection.
    ///
    /// Returns the number of connections that accepted it; entries whose
    /// writer has already gone away are skipped.
    pub fn broadcast(&self, message: &str) -> usize {
        let inner = self.lock();
        inner
            .slots
            .iter()
            .filter_map(|slot| slot.entry.as_ref())
            .filter(|(_, outbox)| outbox.enqueue(message.to_string()))
            .count()
    }

    /// Queues `message` on one connection.  Returns `false` for a stale
    /// handle or a closed connection.
    pub fn send_to(&self, handle: ConnectionHandle, message: &str) -> bool {
        let inner = self.lock();
        inner
            .resolve(handle)
            .is_some_and(|outbox| outbox.enqueue(message.to_string()))
    }

    /// Handle registered for `peer`, if any.
    pub fn handle_for(&self, peer: SocketAddr) -> Option<ConnectionHandle> {
        self.lock().by_peer.get(&peer).copied()
    }

    /// Number of registered connections, live or not.
    pub fn connection_count(&self) -> usize {
        self.lock().by_peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connection_count() == 0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_broadcast_reaches_every_live_connection() {
        // Arrange
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = Outbox::channel();
        let (b, mut rx_b) = Outbox::channel();
        registry.add_connection(a, peer(1));
        registry.add_connection(b, peer(2));

        // Act
        let delivered = registry.broadcast("ping");

        // Assert
        assert_eq!(delivered, 2);
        assert_eq!(rx_a.try_recv().as_deref(), Ok("ping"));
        assert_eq!(rx_b.try_recv().as_deref(), Ok("ping"));
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_skips_dead_entries() {
        let registry = ConnectionRegistry::new();
        let (live, mut rx_live) = Outbox::channel();
        let (dead, rx_dead) = Outbox::channel();
        registry.add_connection(live, peer(1));
        registry.add_connection(dead, peer(2));
        drop(rx_dead);

        assert_eq!(registry.broadcast("state"), 1);
        assert_eq!(rx_live.try_recv().as_deref(), Ok("state"));
        // Skipped, not pruned.
        assert_eq!(registry.connection_count(), 2);
    }

    #[test]
    fn test_broadcast_on_empty_registry() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.broadcast("x"), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_connection_is_idempotent() {
        // Arrange
        let registry = ConnectionRegistry::new();
        let (outbox, _rx) = Outbox::channel();
        registry.add_connection(outbox, peer(1));

        // Act / Assert
        assert!(registry.remove_connection(peer(1)));
        assert!(!registry.remove_connection(peer(1)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_handle_does_not_reach_reused_slot() {
        // Arrange: free a slot and let a new connection reuse it.
        let registry = ConnectionRegistry::new();
        let (first, _rx_first) = Outbox::channel();
        let stale = registry.add_connection(first, peer(1));
        registry.remove_connection(peer(1));
        let (second, mut rx_second) = Outbox::channel();
        let fresh = registry.add_connection(second, peer(2));

        // Act
        let via_stale = registry.send_to(stale, "old");
        let via_fresh = registry.send_to(fresh, "new");

        // Assert
        assert_ne!(stale, fresh);
        assert!(!via_stale);
        assert!(via_fresh);
        assert_eq!(rx_second.try_recv().as_deref(), Ok("new"));
        assert!(rx_second.try_recv().is_err());
    }

    #[test]
    fn test_duplicate_peer_replaces_registration() {
        let registry = ConnectionRegistry::new();
        let (old, mut rx_old) = Outbox::channel();
        let (new, mut rx_new) = Outbox::channel();
        let old_handle = registry.add_connection(old, peer(1));
        let new_handle = registry.add_connection(new, peer(1));

        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.handle_for(peer(1)), Some(new_handle));
        assert_eq!(registry.broadcast("hi"), 1);
        assert!(rx_old.try_recv().is_err());
        assert_eq!(rx_new.try_recv().as_deref(), Ok("hi"));

        // Teardown of the replaced session must not remove the new one.
        assert!(!registry.release(old_handle));
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn test_release_removes_own_entry() {
        let registry = ConnectionRegistry::new();
        let (outbox, _rx) = Outbox::channel();
        let handle = registry.add_connection(outbox, peer(7));

        assert!(registry.release(handle));
        assert!(!registry.release(handle));
        assert_eq!(registry.handle_for(peer(7)), None);
    }

    #[test]
    fn test_outbox_rejects_after_writer_drops() {
        let (outbox, rx) = Outbox::channel();
        assert!(outbox.enqueue("kept".to_string()));
        drop(rx);
        assert!(!outbox.enqueue("lost".to_string()));
    }
}
