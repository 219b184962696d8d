//! Signaling relay
//!
//! Interprets inbound messages per connection, updates the registry and
//! forwards handshake payloads to the matched counterpart. Every handler works
//! out who gets what while holding the registry lock, then sends after the
//! lock is released.
//!
//! Matching: an offer goes to the phone's current viewer if it still has one,
//! otherwise to the earliest-registered viewer that is not paired. A paired
//! viewer is never handed to another phone.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{ConnectionId, Role, Signal};
use crate::registry::{Connection, Connections, Outbox, Registry};

/// A message bound for one connection, computed under the lock
struct Delivery {
    to: ConnectionId,
    outbox: Outbox,
    signal: Signal,
}

impl Delivery {
    fn new(conn: &Connection, signal: Signal) -> Self {
        Self {
            to: conn.id,
            outbox: conn.outbox.clone(),
            signal,
        }
    }

    fn send(self) -> Result<()> {
        self.outbox
            .send(self.signal)
            .map_err(|_| Error::ChannelClosed(self.to))
    }
}

/// Relay handle. Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct Relay {
    registry: Arc<Registry>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Register a freshly accepted transport connection.
    pub async fn accept(&self, outbox: Outbox) -> Result<ConnectionId> {
        let id = ConnectionId::new();
        self.registry.lock().await.create(id, outbox)?;
        info!(conn = %id, "Connection opened");
        Ok(id)
    }

    /// Decode and dispatch one inbound text frame.
    pub async fn handle_text(&self, id: ConnectionId, text: &str) {
        match Signal::decode(text).map_err(Error::from) {
            Ok(signal) => self.handle_signal(id, signal).await,
            Err(e) => warn!(conn = %id, error = %e, "Dropping inbound message"),
        }
    }

    pub async fn handle_signal(&self, id: ConnectionId, signal: Signal) {
        let deliveries = {
            let mut conns = self.registry.lock().await;
            match signal {
                Signal::Register { role } => register(&mut conns, id, role),
                Signal::Offer { sdp, .. } => offer(&mut conns, id, sdp),
                Signal::Answer { sdp, .. } => answer(&conns, id, sdp),
                Signal::IceCandidate { candidate, .. } => ice_candidate(&conns, id, candidate),
                other => {
                    debug!(conn = %id, kind = other.kind(), "Ignoring message");
                    Vec::new()
                }
            }
        };
        deliver(deliveries);
    }

    /// Transport closed. Safe to call more than once.
    pub async fn disconnect(&self, id: ConnectionId) {
        let deliveries = {
            let mut conns = self.registry.lock().await;
            let Some(conn) = conns.remove(id) else {
                return;
            };
            info!(conn = %id, role = ?conn.role, "Connection closed");

            match conn.peer.and_then(|peer_id| conns.get(peer_id)) {
                Some(peer) => {
                    let points_back = peer.peer == Some(id);
                    let notice = Delivery::new(peer, Signal::PeerDisconnected);
                    if points_back {
                        conns.set_peer(notice.to, None);
                    }
                    vec![notice]
                }
                None => Vec::new(),
            }
        };
        deliver(deliveries);
    }
}

fn deliver(deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        let kind = delivery.signal.kind();
        if let Err(e) = delivery.send() {
            debug!(kind, error = %e, "Dropped outbound message");
        }
    }
}

fn register(conns: &mut Connections, id: ConnectionId, role: Role) -> Vec<Delivery> {
    let Some(conn) = conns.get(id) else {
        return Vec::new();
    };
    let (previous, old_peer) = (conn.role, conn.peer);
    let mut deliveries: Vec<Delivery> = old_peer
        .and_then(|peer_id| unpair(conns, id, peer_id))
        .into_iter()
        .collect();

    conns.set_role(id, role);
    info!(conn = %id, ?role, ?previous, "Registered");

    let notice = role.ready_notice();
    deliveries.extend(
        conns
            .scan_by_role(role.counterpart(), id)
            .map(|other| Delivery::new(other, notice.clone())),
    );
    deliveries
}

/// Break the pair `id <-> peer_id`. The former peer is told if it still
/// pointed back at `id`.
fn unpair(conns: &mut Connections, id: ConnectionId, peer_id: ConnectionId) -> Option<Delivery> {
    conns.set_peer(id, None);
    let peer = conns.get(peer_id).filter(|peer| peer.peer == Some(id))?;
    let notice = Delivery::new(peer, Signal::PeerDisconnected);
    conns.set_peer(peer_id, None);
    debug!(conn = %id, peer = %peer_id, "Pairing dissolved");
    Some(notice)
}

fn offer(conns: &mut Connections, id: ConnectionId, sdp: Value) -> Vec<Delivery> {
    let Some(sender) = conns.get(id) else {
        return Vec::new();
    };
    if sender.role != Some(Role::Phone) {
        debug!(conn = %id, role = ?sender.role, "Ignoring offer from non-phone");
        return Vec::new();
    }

    let current = sender.peer.filter(|peer_id| {
        conns
            .get(*peer_id)
            .is_some_and(|peer| peer.role == Some(Role::Viewer) && peer.peer == Some(id))
    });
    let target = current.or_else(|| {
        conns
            .scan_by_role(Role::Viewer, id)
            .find(|viewer| viewer.peer.is_none())
            .map(|viewer| viewer.id)
    });
    let Some(target) = target else {
        debug!(conn = %id, "No viewer available, dropping offer");
        return Vec::new();
    };

    if current.is_none() {
        conns.set_peer(id, Some(target));
        conns.set_peer(target, Some(id));
        info!(phone = %id, viewer = %target, "Paired");
    }

    conns
        .get(target)
        .map(|viewer| {
            Delivery::new(
                viewer,
                Signal::Offer {
                    sdp,
                    from: Some(id),
                },
            )
        })
        .into_iter()
        .collect()
}

fn answer(conns: &Connections, id: ConnectionId, sdp: Value) -> Vec<Delivery> {
    let Some(sender) = conns.get(id) else {
        return Vec::new();
    };
    if sender.role != Some(Role::Viewer) {
        debug!(conn = %id, role = ?sender.role, "Ignoring answer from non-viewer");
        return Vec::new();
    }
    forward_to_peer(
        conns,
        sender,
        Signal::Answer {
            sdp,
            from: Some(id),
        },
    )
}

fn ice_candidate(conns: &Connections, id: ConnectionId, candidate: Value) -> Vec<Delivery> {
    let Some(sender) = conns.get(id) else {
        return Vec::new();
    };
    forward_to_peer(
        conns,
        sender,
        Signal::IceCandidate {
            candidate,
            from: Some(id),
        },
    )
}

fn forward_to_peer(conns: &Connections, sender: &Connection, signal: Signal) -> Vec<Delivery> {
    let Some(peer_id) = sender.peer else {
        debug!(conn = %sender.id, kind = signal.kind(), "No peer, dropping");
        return Vec::new();
    };
    match conns.get(peer_id) {
        Some(peer) => {
            debug!(from = %sender.id, to = %peer_id, kind = signal.kind(), "Forwarding");
            vec![Delivery::new(peer, signal)]
        }
        None => {
            debug!(conn = %sender.id, peer = %peer_id, "Peer is gone, dropping");
            Vec::new()
        }
    }
}
