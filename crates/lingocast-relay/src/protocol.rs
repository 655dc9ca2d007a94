//! Wire protocol for the signaling relay.
//!
//! Every frame is a UTF-8 JSON object tagged by `type`. The field names
//! here are the compatibility contract with the browser clients and
//! must not change. Handshake payloads (`offer`, `answer`, `candidate`)
//! are opaque to the relay and forwarded verbatim as [`serde_json::Value`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;
use crate::types::ClientId;

/// Target string addressing the current broadcaster of the sender's
/// language, used by listeners that do not know the broadcaster's
/// client identity.
pub const BROADCASTER_TARGET: &str = "broadcaster";

/// Messages sent by clients to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Bind a durable client identity to this socket.
    Identify {
        #[serde(rename = "clientId")]
        client_id: ClientId,
    },
    /// Register (or heartbeat-refresh) as the broadcaster for a language.
    Broadcaster {
        language: String,
        token: String,
        #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
        client_id: Option<ClientId>,
    },
    /// Register as a listener and ask the broadcaster to initiate a handshake.
    RequestOffer {
        language: String,
        #[serde(rename = "clientId")]
        client_id: ClientId,
    },
    /// SDP offer for the peer identified by `target`.
    Offer { offer: Value, target: String },
    /// SDP answer for the peer identified by `target`.
    Answer { answer: Value, target: String },
    /// ICE candidate for the peer identified by `target`.
    Candidate { candidate: Value, target: String },
    /// Broadcaster is closing its peer link to `target`.
    StopConnection { target: String },
    /// Broadcaster is releasing its language slot.
    StopBroadcast { language: String },
    /// Listener is detaching from a language.
    StopListening {
        language: String,
        #[serde(rename = "clientId")]
        client_id: ClientId,
    },
}

/// Messages pushed by the relay to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Tells the broadcaster to initiate a handshake with this listener.
    RequestOffer {
        #[serde(rename = "clientId")]
        client_id: ClientId,
    },
    /// Forwarded SDP offer; `clientId` identifies the originating peer
    /// when known.
    Offer {
        offer: Value,
        #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
        client_id: Option<ClientId>,
    },
    /// Forwarded SDP answer.
    Answer {
        answer: Value,
        #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
        client_id: Option<ClientId>,
    },
    /// Forwarded ICE candidate.
    Candidate {
        candidate: Value,
        #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
        client_id: Option<ClientId>,
    },
    /// Forwarded teardown notice for a peer link.
    StopConnection { target: String },
    /// Presence update pushed to every broadcaster; carries counts for
    /// all languages so one payload shape covers every change.
    ListenersCount { listeners: BTreeMap<String, usize> },
    /// Explicit rejection of a broadcaster registration so the UI can
    /// prompt re-authentication.
    Unauthorized { language: String, message: String },
}

/// The three verbatim-relayed handshake message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeKind {
    Offer,
    Answer,
    Candidate,
}

impl HandshakeKind {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            HandshakeKind::Offer => "offer",
            HandshakeKind::Answer => "answer",
            HandshakeKind::Candidate => "candidate",
        }
    }

    /// Wrap a payload into the outbound frame for this kind, tagging it
    /// with the originating peer's identity when known.
    pub fn to_server_message(self, payload: Value, from: Option<ClientId>) -> ServerMessage {
        match self {
            HandshakeKind::Offer => ServerMessage::Offer {
                offer: payload,
                client_id: from,
            },
            HandshakeKind::Answer => ServerMessage::Answer {
                answer: payload,
                client_id: from,
            },
            HandshakeKind::Candidate => ServerMessage::Candidate {
                candidate: payload,
                client_id: from,
            },
        }
    }
}

impl std::fmt::Display for HandshakeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decode one inbound frame.
///
/// An undecodable frame is a per-message failure; the caller discards
/// it and keeps the connection open.
pub fn decode_frame(text: &str) -> Result<ClientMessage, RelayError> {
    serde_json::from_str(text).map_err(|e| RelayError::malformed(e.to_string()))
}

/// Encode one outbound frame.
pub fn encode_frame(msg: &ServerMessage) -> Result<String, RelayError> {
    serde_json::to_string(msg).map_err(|e| RelayError::internal(e.to_string()))
}
