//! Session Manager.
//!
//! Every inbound frame enters here. The manager mutates the Connection
//! Registry and Language Channel Table, then instructs the router to
//! forward zero or more outbound frames. Every operation is idempotent
//! enough to tolerate duplicate delivery and correct under arbitrary
//! interleaving across connections: broadcaster clears are always
//! identity-checked, listener membership is keyed by durable client
//! identity, and socket teardown may freely race explicit stop
//! messages from the same peer.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::auth::AuthorizeBroadcaster;
use crate::channels::{BroadcasterRef, LanguageChannelTable};
use crate::error::RelayError;
use crate::protocol::{ClientMessage, HandshakeKind, ServerMessage};
use crate::registry::ConnectionRegistry;
use crate::router::MessageRouter;
use crate::types::{ClientId, ConnectionId, Role};

/// The central state machine for the relay.
pub struct SessionManager {
    registry: Arc<ConnectionRegistry>,
    channels: Arc<LanguageChannelTable>,
    router: Arc<MessageRouter>,
    verifier: Arc<dyn AuthorizeBroadcaster>,
}

impl SessionManager {
    /// Create the manager over the shared registries.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        channels: Arc<LanguageChannelTable>,
        router: Arc<MessageRouter>,
        verifier: Arc<dyn AuthorizeBroadcaster>,
    ) -> Self {
        Self {
            registry,
            channels,
            router,
            verifier,
        }
    }

    /// Process one inbound frame from `conn`.
    ///
    /// Never fatal: every failure is either surfaced to the offending
    /// client as a frame or logged and dropped.
    pub fn handle(&self, conn: ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::Identify { client_id } => self.identify(conn, &client_id),
            ClientMessage::Broadcaster {
                language,
                token,
                client_id,
            } => {
                if let Err(e) = self.register_broadcaster(conn, &language, &token, client_id) {
                    warn!(connection = %conn, error = %e, "Broadcaster registration rejected");
                }
            }
            ClientMessage::RequestOffer {
                language,
                client_id,
            } => self.request_offer(conn, &language, client_id),
            ClientMessage::Offer { offer, target } => {
                self.relay_handshake(conn, HandshakeKind::Offer, offer, &target)
            }
            ClientMessage::Answer { answer, target } => {
                self.relay_handshake(conn, HandshakeKind::Answer, answer, &target)
            }
            ClientMessage::Candidate { candidate, target } => {
                self.relay_handshake(conn, HandshakeKind::Candidate, candidate, &target)
            }
            ClientMessage::StopConnection { target } => self.stop_connection(conn, &target),
            ClientMessage::StopBroadcast { language } => self.stop_broadcast(conn, &language),
            ClientMessage::StopListening {
                language,
                client_id,
            } => self.stop_listening(conn, &language, &client_id),
        }
    }

    /// Bind a durable client identity to a connection. No-op if already
    /// bound to the same identity.
    pub fn identify(&self, conn: ConnectionId, client_id: &ClientId) {
        self.registry.bind_identity(conn, client_id);
        self.registry.touch(conn);
    }

    /// Register (or heartbeat-refresh) `conn` as the broadcaster for a
    /// language.
    ///
    /// Rejection is explicit: the client receives an `unauthorized`
    /// frame so its UI can prompt re-authentication. On success the
    /// slot pointer is overwritten last-writer-wins; the displaced
    /// broadcaster's socket is left alone, its listeners detect the
    /// drop from the transport layer.
    #[instrument(skip(self, token, client_id), fields(connection = %conn, language = %language))]
    pub fn register_broadcaster(
        &self,
        conn: ConnectionId,
        language: &str,
        token: &str,
        client_id: Option<ClientId>,
    ) -> Result<(), RelayError> {
        if !self.channels.has_language(language) {
            self.reject(conn, language, "unsupported language");
            return Err(RelayError::UnknownLanguage(language.to_string()));
        }
        if !self.verifier.verify(token) {
            self.reject(conn, language, "invalid or expired token");
            return Err(RelayError::unauthorized(language));
        }

        if let Some(id) = &client_id {
            self.registry.bind_identity(conn, id);
        }
        if !self.registry.assign_role(conn, Role::Broadcaster, language) {
            // Role or language conflict on a live socket; refuse quietly.
            return Ok(());
        }

        let first_registration = !matches!(
            self.channels.broadcaster(language),
            Some(ref b) if b.connection == conn
        );
        self.channels.set_broadcaster(
            language,
            BroadcasterRef {
                connection: conn,
                client_id: self.registry.describe(conn).and_then(|(id, _, _)| id),
            },
        );

        // A fresh broadcaster needs the current counts immediately;
        // heartbeats do not re-announce.
        if first_registration {
            self.router.broadcast_listener_counts();
        }
        Ok(())
    }

    /// Register `client_id` as a listener on a language and ask the
    /// active broadcaster to initiate a handshake with it.
    ///
    /// With no broadcaster live, the request is dropped silently; the
    /// listener stays registered and counted, and will be served when
    /// it retries after a broadcaster appears. A redundant request from
    /// an already-served listener is re-forwarded as-is; the
    /// broadcaster decides whether to renegotiate.
    #[instrument(skip(self), fields(connection = %conn, language = %language, client = %client_id))]
    pub fn request_offer(&self, conn: ConnectionId, language: &str, client_id: ClientId) {
        if !self.channels.has_language(language) {
            warn!("Offer request for unsupported language, dropping");
            return;
        }

        self.registry.bind_identity(conn, &client_id);
        if !self.registry.assign_role(conn, Role::Listener, language) {
            return;
        }

        if self.channels.add_listener(language, client_id.clone(), conn) {
            self.router.broadcast_listener_counts();
        }

        match self.channels.broadcaster(language) {
            Some(broadcaster) => {
                self.router.send_to_connection(
                    broadcaster.connection,
                    ServerMessage::RequestOffer { client_id },
                );
            }
            None => {
                debug!("No active broadcaster, dropping offer request");
            }
        }
    }

    /// Forward a handshake payload verbatim to the peer `target`
    /// addresses within the sender's language.
    ///
    /// A disconnected target is a logged silent drop; the sender's own
    /// timeout/retry logic handles recovery.
    #[instrument(skip(self, payload), fields(connection = %conn, kind = %kind, target = %target))]
    pub fn relay_handshake(
        &self,
        conn: ConnectionId,
        kind: HandshakeKind,
        payload: Value,
        target: &str,
    ) {
        let Some((from, _, Some(language))) = self.registry.describe(conn) else {
            debug!("Handshake from unregistered connection, dropping");
            return;
        };
        self.router
            .send_to_target(&language, target, kind.to_server_message(payload, from));
    }

    /// Forward a broadcaster's teardown notice for its peer link to
    /// `target`.
    ///
    /// Does not detach the listener; it may immediately request a new
    /// offer.
    pub fn stop_connection(&self, conn: ConnectionId, target: &str) {
        let Some((_, Some(Role::Broadcaster), Some(language))) = self.registry.describe(conn)
        else {
            debug!(connection = %conn, "stop-connection from non-broadcaster, dropping");
            return;
        };
        self.router.send_to_target(
            &language,
            target,
            ServerMessage::StopConnection {
                target: target.to_string(),
            },
        );
    }

    /// Release the language slot, but only if `conn` still holds it.
    pub fn stop_broadcast(&self, conn: ConnectionId, language: &str) {
        if self.channels.clear_broadcaster_if_matches(language, conn) {
            info!(connection = %conn, language = %language, "Broadcast stopped");
        }
    }

    /// Detach a listener identity from a language.
    pub fn stop_listening(&self, conn: ConnectionId, language: &str, client_id: &ClientId) {
        debug!(connection = %conn, language = %language, client = %client_id, "Stop listening");
        if self.channels.remove_listener(language, client_id) {
            self.router.broadcast_listener_counts();
        }
    }

    /// Tear down all relay state for a closed socket.
    ///
    /// Idempotent and safe to race with explicit stop messages from the
    /// same peer. The broadcaster clear compares identities, so a slot
    /// already taken over by a newer broadcaster is left untouched; a
    /// listener that already reconnected under the same client identity
    /// keeps its membership.
    #[instrument(skip(self), fields(connection = %conn))]
    pub fn on_socket_closed(&self, conn: ConnectionId) {
        let Some(entry) = self.registry.remove(conn) else {
            return;
        };

        match (entry.role(), entry.language()) {
            (Some(Role::Broadcaster), Some(language)) => {
                if self.channels.clear_broadcaster_if_matches(&language, conn) {
                    info!(language = %language, "Broadcaster disconnected, slot freed");
                }
            }
            (Some(Role::Listener), Some(language)) => {
                if let Some(client_id) = entry.client_id() {
                    if self
                        .channels
                        .remove_listener_if_matches(&language, &client_id, conn)
                    {
                        self.router.broadcast_listener_counts();
                    }
                }
            }
            _ => {}
        }
    }

    fn reject(&self, conn: ConnectionId, language: &str, message: &str) {
        self.router.send_to_connection(
            conn,
            ServerMessage::Unauthorized {
                language: language.to_string(),
                message: message.to_string(),
            },
        );
    }
}
