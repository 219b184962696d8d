use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Opaque id handed out when a socket is accepted. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Camera source, sends the offer
    Phone,
    /// Sink, answers the offer
    Viewer,
}

impl Role {
    /// The role this one gets paired with.
    pub fn counterpart(self) -> Role {
        match self {
            Role::Phone => Role::Viewer,
            Role::Viewer => Role::Phone,
        }
    }

    /// Notice broadcast to the counterpart role when a connection registers as `self`.
    pub fn ready_notice(self) -> Signal {
        match self {
            Role::Phone => Signal::PhoneReady,
            Role::Viewer => Signal::ViewerReady,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Signal {
    // 1. Client announces what it is
    Register { role: Role },

    // 2. Relay tells the other side someone showed up
    PhoneReady,
    ViewerReady,

    // 3. Handshake payloads, passed through untouched.
    // `from` is filled by the relay with the sender's connection id.
    Offer {
        sdp: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ConnectionId>,
    },
    Answer {
        sdp: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ConnectionId>,
    },
    IceCandidate {
        candidate: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ConnectionId>,
    },

    // 4. The matched peer went away
    PeerDisconnected,

    #[serde(other)]
    Unknown,
}

impl Signal {
    /// Decode an inbound text frame.
    ///
    /// Any `from` the client put on the frame is dropped before decoding so a
    /// bogus value can neither fail the decode nor be trusted.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let mut value: Value = serde_json::from_str(text)?;
        if let Value::Object(map) = &mut value {
            map.remove("from");
        }
        serde_json::from_value(value)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name of the message type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Register { .. } => "register",
            Signal::PhoneReady => "phone-ready",
            Signal::ViewerReady => "viewer-ready",
            Signal::Offer { .. } => "offer",
            Signal::Answer { .. } => "answer",
            Signal::IceCandidate { .. } => "ice-candidate",
            Signal::PeerDisconnected => "peer-disconnected",
            Signal::Unknown => "unknown",
        }
    }
}
