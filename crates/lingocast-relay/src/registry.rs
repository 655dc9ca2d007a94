//! Connection Registry.
//!
//! Tracks one record per live transport connection, keyed by the
//! ephemeral [`ConnectionId`]. Each record owns the bounded outbound
//! channel for its socket; everything else about the connection (the
//! durable client identity, the sticky role and language, the last
//! heartbeat time) accumulates here as identify/register messages
//! arrive and dies with the socket.

use std::fmt;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::protocol::ServerMessage;
use crate::types::{ClientId, ConnectionId, Role};

/// Mutable per-connection state behind the entry's lock.
///
/// Role and language are sticky once set for the life of the socket; a
/// reconnect gets a brand-new record and re-earns them.
#[derive(Debug, Clone)]
struct ConnectionMeta {
    client_id: Option<ClientId>,
    role: Option<Role>,
    language: Option<String>,
    last_seen: Instant,
}

/// Connection state stored in the registry.
#[derive(Debug)]
pub struct ConnectionEntry {
    /// Bounded channel to the writer task for this socket.
    sender: mpsc::Sender<ServerMessage>,
    meta: RwLock<ConnectionMeta>,
}

impl ConnectionEntry {
    fn new(sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            sender,
            meta: RwLock::new(ConnectionMeta {
                client_id: None,
                role: None,
                language: None,
                last_seen: Instant::now(),
            }),
        }
    }

    /// Durable client identity, if the connection has identified.
    pub fn client_id(&self) -> Option<ClientId> {
        self.meta.read().map(|m| m.client_id.clone()).unwrap_or(None)
    }

    /// Role taken on by this connection, if any.
    pub fn role(&self) -> Option<Role> {
        self.meta.read().map(|m| m.role).unwrap_or(None)
    }

    /// Language this connection registered for, if any.
    pub fn language(&self) -> Option<String> {
        self.meta.read().map(|m| m.language.clone()).unwrap_or(None)
    }

    /// Time since the last registration or heartbeat.
    pub fn idle_for(&self) -> Duration {
        self.meta
            .read()
            .map(|m| m.last_seen.elapsed())
            .unwrap_or(Duration::ZERO)
    }
}

/// Result of attempting to send a message to a connection.
#[derive(Debug)]
pub enum SendResult {
    /// Message was queued for delivery.
    Sent,
    /// The recipient is not currently connected.
    NotConnected,
    /// The recipient's outbound queue is full; the frame is dropped
    /// rather than stalling the caller.
    ChannelFull,
    /// The recipient's writer task is gone; the stale entry is removed.
    ChannelClosed,
}

/// Registry of live connections.
///
/// Thread-safe via DashMap; lookup misses are a normal, expected case
/// (the peer is already gone), never an error.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Create a record for a newly opened socket.
    ///
    /// `sender` is the bounded outbound channel drained by the socket's
    /// writer task.
    #[instrument(skip(self, sender))]
    pub fn create(&self, sender: mpsc::Sender<ServerMessage>) -> ConnectionId {
        let id = ConnectionId::new();
        self.connections.insert(id, ConnectionEntry::new(sender));
        debug!(connection = %id, "Registered new connection");
        id
    }

    /// Remove the record for a closed socket.
    ///
    /// Returns the entry so the caller can inspect what the connection
    /// was (role, language, identity) for slot cleanup. Idempotent.
    #[instrument(skip(self), fields(connection = %id))]
    pub fn remove(&self, id: ConnectionId) -> Option<ConnectionEntry> {
        let removed = self.connections.remove(&id);
        if removed.is_some() {
            debug!("Unregistered connection");
        } else {
            debug!("Connection was not registered");
        }
        removed.map(|(_, entry)| entry)
    }

    /// Check if a connection is currently registered.
    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Bind a durable client identity to a connection.
    ///
    /// No-op if already bound to the same identity; re-binding to a
    /// different identity is allowed and logged (a tab regenerating its
    /// identity behaves like a new participant).
    pub fn bind_identity(&self, id: ConnectionId, client_id: &ClientId) {
        let Some(entry) = self.connections.get(&id) else {
            debug!(connection = %id, "Identify for unknown connection");
            return;
        };
        let Ok(mut meta) = entry.meta.write() else {
            return;
        };
        match &meta.client_id {
            Some(existing) if existing == client_id => {}
            Some(existing) => {
                warn!(connection = %id, old = %existing, new = %client_id,
                    "Connection re-identified with a different client identity");
                meta.client_id = Some(client_id.clone());
            }
            None => {
                debug!(connection = %id, client = %client_id, "Bound client identity");
                meta.client_id = Some(client_id.clone());
            }
        }
    }

    /// Set role and language on a connection, both sticky once set.
    ///
    /// Returns false if the connection already holds a conflicting role
    /// or a different language (the caller logs and drops the
    /// registration). A socket that wants another language reconnects.
    pub fn assign_role(&self, id: ConnectionId, role: Role, language: &str) -> bool {
        let Some(entry) = self.connections.get(&id) else {
            return false;
        };
        let Ok(mut meta) = entry.meta.write() else {
            return false;
        };
        if let Some(existing) = meta.role {
            if existing != role {
                warn!(connection = %id, existing = %existing, requested = %role,
                    "Connection attempted to switch roles; ignoring");
                return false;
            }
            if meta.language.as_deref() != Some(language) {
                warn!(connection = %id, existing = ?meta.language, requested = %language,
                    "Connection attempted to switch languages; ignoring");
                return false;
            }
        }
        meta.role = Some(role);
        meta.language = Some(language.to_string());
        meta.last_seen = Instant::now();
        true
    }

    /// Refresh the heartbeat time for a connection.
    pub fn touch(&self, id: ConnectionId) {
        if let Some(entry) = self.connections.get(&id) {
            if let Ok(mut meta) = entry.meta.write() {
                meta.last_seen = Instant::now();
            }
        }
    }

    /// Snapshot (client identity, role, language) for a connection.
    pub fn describe(
        &self,
        id: ConnectionId,
    ) -> Option<(Option<ClientId>, Option<Role>, Option<String>)> {
        let entry = self.connections.get(&id)?;
        let meta = entry.meta.read().ok()?;
        Some((meta.client_id.clone(), meta.role, meta.language.clone()))
    }

    /// Find the connection currently bound to a client identity within
    /// a language. The same identity could listen to another language
    /// from a different tab, so identity is scoped by language.
    pub fn lookup_by_client(&self, language: &str, client_id: &ClientId) -> Option<ConnectionId> {
        self.connections
            .iter()
            .find(|entry| {
                entry
                    .value()
                    .meta
                    .read()
                    .map(|m| {
                        m.client_id.as_ref() == Some(client_id)
                            && m.language.as_deref() == Some(language)
                    })
                    .unwrap_or(false)
            })
            .map(|entry| *entry.key())
    }

    /// All connections currently registered as broadcasters.
    pub fn broadcaster_connections(&self) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|entry| entry.value().role() == Some(Role::Broadcaster))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Broadcaster connections silent for longer than `timeout`,
    /// with the language each one holds.
    pub fn idle_broadcasters(&self, timeout: Duration) -> Vec<(ConnectionId, String)> {
        self.connections
            .iter()
            .filter(|entry| {
                entry.value().role() == Some(Role::Broadcaster)
                    && entry.value().idle_for() > timeout
            })
            .filter_map(|entry| entry.value().language().map(|lang| (*entry.key(), lang)))
            .collect()
    }

    /// Send a message to a connection.
    ///
    /// Fire-and-forget: `try_send` never blocks the caller. A full
    /// queue drops the frame; a closed channel evicts the stale entry.
    #[instrument(skip(self, message), fields(connection = %id))]
    pub fn send_to(&self, id: ConnectionId, message: ServerMessage) -> SendResult {
        let sender = match self.connections.get(&id) {
            Some(entry) => entry.value().sender.clone(),
            None => {
                debug!("Recipient not connected");
                return SendResult::NotConnected;
            }
        };

        match sender.try_send(message) {
            Ok(()) => {
                debug!("Message queued for delivery");
                SendResult::Sent
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Outbound queue full, dropping frame");
                SendResult::ChannelFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Outbound channel closed, connection may have dropped");
                self.connections.remove(&id);
                SendResult::ChannelClosed
            }
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}
