//! Core identity types shared across the relay.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ephemeral identity of one live transport connection.
///
/// Assigned by the relay when the socket opens and destroyed with it.
/// Never leaves the process; clients are addressed by [`ClientId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh connection identity.
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
        write!(f, "{}", self.0)
    }
}

/// Durable, client-generated identity.
///
/// Stable across reconnects for a single browser tab, which is how the
/// relay recognizes "the same listener" after a socket drop. Opaque to
/// the relay; scoped per language when looked up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// View the raw identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a connection has taken on.
///
/// Sticky once set for the life of the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The authoritative media source for a language.
    Broadcaster,
    /// A participant receiving media for a language.
    Listener,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Broadcaster => write!(f, "broadcaster"),
            Role::Listener => write!(f, "listener"),
        }
    }
}
