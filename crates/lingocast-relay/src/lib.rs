//! # lingocast-relay
//!
//! Session and routing engine for the Lingocast signaling relay.
//!
//! One broadcaster per spoken language streams live audio to many
//! listeners over direct WebRTC connections; this library is the relay
//! that exchanges their connection-setup handshake and tracks
//! presence. Audio never passes through it, and nothing is persisted:
//! all state is rebuilt from live connections after a restart.
//!
//! ## Architecture
//!
//! - **Connection Registry**: one record per live socket, owning the
//!   bounded outbound channel to that socket's writer task
//! - **Language Channel Table**: one slot per supported language, at
//!   most one active broadcaster per slot, listeners keyed by durable
//!   client identity
//! - **Session Manager**: processes every inbound frame and decides
//!   what to forward to whom
//! - **Router**: fire-and-forget delivery by connection, client
//!   identity, or handshake target; listener-count broadcasts
//! - **Liveness Monitor**: frees slots of broadcasters whose
//!   heartbeats have gone silent
//!
//! The registries are the only shared mutable state; each connection's
//! read buffers and decoded frames stay on that connection's task.

pub mod auth;
pub mod channels;
pub mod liveness;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod session;

mod error;
mod types;

pub use auth::{AuthorizeBroadcaster, BroadcastClaims, TokenVerifier};
pub use channels::{BroadcasterRef, LanguageChannelTable};
pub use error::RelayError;
pub use liveness::{LivenessConfig, LivenessMonitor};
pub use protocol::{decode_frame, encode_frame, ClientMessage, HandshakeKind, ServerMessage};
pub use registry::{ConnectionRegistry, SendResult};
pub use router::MessageRouter;
pub use session::SessionManager;
pub use types::{ClientId, ConnectionId, Role};
