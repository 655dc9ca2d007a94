//! Message routing.
//!
//! Given a decision from the Session Manager, delivers a frame to one
//! specific connection (addressed directly, by language-scoped client
//! identity, or by a handshake target string) or broadcasts a
//! listener-count summary to every registered broadcaster. Delivery is
//! always fire-and-forget through the per-connection bounded queue; a
//! slow peer never stalls the Session Manager.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::channels::LanguageChannelTable;
use crate::protocol::ServerMessage;
use crate::registry::{ConnectionRegistry, SendResult};
use crate::types::ConnectionId;

/// Router over the shared registries.
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    channels: Arc<LanguageChannelTable>,
}

impl MessageRouter {
    /// Create a router over the shared registries.
    pub fn new(registry: Arc<ConnectionRegistry>, channels: Arc<LanguageChannelTable>) -> Self {
        Self { registry, channels }
    }

    /// Deliver a frame to one connection.
    ///
    /// Returns true if the frame was queued. Anything else is a logged
    /// silent drop; the sender's own retry logic is responsible for
    /// recovery.
    pub fn send_to_connection(&self, id: ConnectionId, message: ServerMessage) -> bool {
        match self.registry.send_to(id, message) {
            SendResult::Sent => true,
            SendResult::NotConnected | SendResult::ChannelClosed => {
                debug!(connection = %id, "Dropping frame for disconnected peer");
                false
            }
            SendResult::ChannelFull => {
                warn!(connection = %id, "Dropping frame for backed-up peer");
                false
            }
        }
    }

    /// Resolve a handshake target within a language.
    ///
    /// Targets name either the slot's current broadcaster (by client
    /// identity or the synthetic `"broadcaster"` string) or a listener
    /// identity attached to the language. A miss is normal: the peer is
    /// already gone.
    pub fn resolve_target(&self, language: &str, target: &str) -> Option<ConnectionId> {
        if let Some(broadcaster) = self.channels.broadcaster(language) {
            if broadcaster.matches_target(target) {
                return Some(broadcaster.connection);
            }
        }
        self.channels.listener_connection(language, &target.into())
    }

    /// Deliver a frame to the peer a handshake target addresses.
    ///
    /// Returns true if the frame was queued; an unresolvable target is
    /// logged and dropped without affecting any other session.
    #[instrument(skip(self, message), fields(language = %language, target = %target))]
    pub fn send_to_target(&self, language: &str, target: &str, message: ServerMessage) -> bool {
        match self.resolve_target(language, target) {
            Some(id) => self.send_to_connection(id, message),
            None => {
                debug!("Handshake target not connected, dropping");
                false
            }
        }
    }

    /// Push the current listener counts to every connection registered
    /// as a broadcaster. Returns how many broadcasters were reached.
    pub fn broadcast_listener_counts(&self) -> usize {
        let message = ServerMessage::ListenersCount {
            listeners: self.channels.counts(),
        };

        let mut reached = 0;
        for id in self.registry.broadcaster_connections() {
            if self.send_to_connection(id, message.clone()) {
                reached += 1;
            }
        }
        debug!(reached = reached, "Pushed listener counts to broadcasters");
        reached
    }
}
