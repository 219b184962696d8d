//! Connection registry
//!
//! Holds every open connection for the lifetime of the service. All access
//! goes through one coarse lock; callers take the guard, do their lookups and
//! mutations, and drop it before sending anything.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tokio::sync::{mpsc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::protocol::{ConnectionId, Role, Signal};

/// Outbound half of a connection; the transport's writer task drains the other end.
pub type Outbox = mpsc::UnboundedSender<Signal>;

/// One open connection
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    /// None until the client registers
    pub role: Option<Role>,
    /// Matched counterpart, if any
    pub peer: Option<ConnectionId>,
    pub outbox: Outbox,
}

/// Snapshot counts for the health endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub connections: usize,
    pub phones: usize,
    pub viewers: usize,
    pub unregistered: usize,
    pub paired: usize,
}

/// Connection table. Only reachable through [`Registry::lock`].
#[derive(Debug, Default)]
pub struct Connections {
    /// Records keyed by arrival sequence, so iteration is insertion order
    entries: BTreeMap<u64, Connection>,
    index: HashMap<ConnectionId, u64>,
    next_seq: u64,
}

impl Connections {
    pub fn create(&mut self, id: ConnectionId, outbox: Outbox) -> Result<&Connection> {
        if self.index.contains_key(&id) {
            return Err(Error::DuplicateConnection(id));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(id, seq);

        let conn = self.entries.entry(seq).or_insert(Connection {
            id,
            role: None,
            peer: None,
            outbox,
        });
        Ok(conn)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.index.get(&id).and_then(|seq| self.entries.get(seq))
    }

    fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        let seq = self.index.get(&id)?;
        self.entries.get_mut(seq)
    }

    pub fn set_role(&mut self, id: ConnectionId, role: Role) {
        if let Some(conn) = self.get_mut(id) {
            conn.role = Some(role);
        }
    }

    /// One-directional; keeping the pair symmetric is the caller's job.
    pub fn set_peer(&mut self, id: ConnectionId, peer: Option<ConnectionId>) {
        if let Some(conn) = self.get_mut(id) {
            conn.peer = peer;
        }
    }

    /// Returns the removed record, or None if it was already gone.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let seq = self.index.remove(&id)?;
        self.entries.remove(&seq)
    }

    /// Every connection registered as `role` except `exclude`, oldest first.
    pub fn scan_by_role(
        &self,
        role: Role,
        exclude: ConnectionId,
    ) -> impl Iterator<Item = &Connection> + '_ {
        self.entries
            .values()
            .filter(move |conn| conn.role == Some(role) && conn.id != exclude)
    }

    pub fn stats(&self) -> RegistryStats {
        self.entries
            .values()
            .fold(RegistryStats::default(), |mut stats, conn| {
                stats.connections += 1;
                match conn.role {
                    Some(Role::Phone) => stats.phones += 1,
                    Some(Role::Viewer) => stats.viewers += 1,
                    None => stats.unregistered += 1,
                }
                if conn.peer.is_some() {
                    stats.paired += 1;
                }
                stats
            })
    }
}

/// Shared handle to the connection table
#[derive(Debug, Default)]
pub struct Registry {
    inner: Mutex<Connections>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> MutexGuard<'_, Connections> {
        self.inner.lock().await
    }

    pub async fn stats(&self) -> RegistryStats {
        self.lock().await.stats()
    }
}
