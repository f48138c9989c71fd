use std::collections::VecDeque;

use super::types::{ConnId, Identity};

/// A connection waiting to be paired.
#[derive(Debug, Clone)]
pub struct WaitingEntry {
    pub conn: ConnId,
    pub identity: Identity,
}

/// Result of an enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    /// The connection or its identity already holds a slot; the request is
    /// absorbed, not failed
    AlreadyWaiting,
}

/// FIFO pool of connections awaiting a peer.
///
/// One slot per connection and one per identity: a duplicate request from a
/// double click or a reconnect race is a no-op. The dedup key is the email
/// when the identity carries one, otherwise the connection id. Only the
/// coordinator mutates the pool.
#[derive(Debug, Default)]
pub struct WaitingPool {
    entries: VecDeque<WaitingEntry>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Add a connection to the back of the queue unless it (or its
    /// identity) is already waiting.
    pub fn enqueue(&mut self, conn: ConnId, identity: Identity) -> EnqueueOutcome {
        if self.occupies_slot(&conn, &identity) {
            return EnqueueOutcome::AlreadyWaiting;
        }
        self.entries.push_back(WaitingEntry { conn, identity });
        EnqueueOutcome::Accepted
    }

    /// Take the entry that has waited longest.
    pub fn dequeue_oldest(&mut self) -> Option<WaitingEntry> {
        self.entries.pop_front()
    }

    /// Put a dequeued entry back at the head of the queue so it keeps its
    /// turn. Used when a freshly dequeued pair falls apart.
    pub fn requeue_front(&mut self, entry: WaitingEntry) {
        self.entries.push_front(entry);
    }

    /// Drop the entry for a connection, if any. Idempotent.
    pub fn remove(&mut self, conn: &ConnId) {
        self.entries.retain(|entry| entry.conn != *conn);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn occupies_slot(&self, conn: &ConnId, identity: &Identity) -> bool {
        self.entries.iter().any(|entry| {
            entry.conn == *conn
                || match (&entry.identity.email, &identity.email) {
                    (Some(waiting), Some(incoming)) => waiting == incoming,
                    _ => false,
                }
        })
    }
}
