//! Live connections and the connection limit.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use flare_core::ConnectionId;
use parking_lot::RwLock;

use super::connection::ClientConnection;

/// Connections currently open, with an atomic active count.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
    active: AtomicUsize,
    max: usize,
}

impl ConnectionRegistry {
    /// Registry admitting at most `max` connections.
    pub fn new(max: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active: AtomicUsize::new(0),
            max,
        }
    }

    /// Reserve room for one connection under a fresh id.
    ///
    /// Returns `None` at the limit. The reservation is held until the slot
    /// is dropped.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionSlot> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .ok()?;
        Some(ConnectionSlot {
            id: ConnectionId::new(),
            registry: Arc::clone(self),
        })
    }

    /// Make `connection` reachable by id.
    pub fn insert(&self, connection: Arc<ClientConnection>) {
        let _ = self
            .connections
            .write()
            .insert(connection.id.clone(), connection);
    }

    /// Forget `id`.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.write().remove(id)
    }

    /// Look up an open connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(id).cloned()
    }

    /// Reserved connection slots.
    pub fn count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// The configured limit.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Outbound frames dropped across open connections.
    pub fn dropped_messages(&self) -> u64 {
        self.connections
            .read()
            .values()
            .map(|c| c.drop_count())
            .sum()
    }
}

/// One reserved connection. Dropping it frees the slot and unregisters the id.
#[derive(Debug)]
pub struct ConnectionSlot {
    id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
}

impl ConnectionSlot {
    /// Id assigned to the connection.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let _ = self.registry.remove(&self.id);
        let _ = self.registry.active.fetch_sub(1, Ordering::AcqRel);
    }
}
