//! Language Channel Table.
//!
//! One slot per supported language; each slot holds at most one active
//! broadcaster reference and the set of listener identities attached to
//! that language. Slots exist only for configured languages and every
//! mutation happens under the slot's shard lock, so no caller ever
//! observes a half-updated slot.
//!
//! Registration is last-writer-wins: only one physical source should be
//! live, so a newly-authorized broadcaster overwrites the pointer
//! instead of queuing behind it. Clearing is identity-checked, which is
//! what keeps a displaced broadcaster's late `stop-broadcast` (or its
//! socket close) from knocking out its replacement.

use std::collections::{BTreeMap, HashMap};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::protocol::BROADCASTER_TARGET;
use crate::types::{ClientId, ConnectionId};

/// Reference to the active broadcaster of a language slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcasterRef {
    /// The broadcaster's live connection.
    pub connection: ConnectionId,
    /// Durable identity, when the broadcaster supplied one.
    pub client_id: Option<ClientId>,
}

impl BroadcasterRef {
    /// Whether a handshake `target` string addresses this broadcaster.
    ///
    /// Listeners may address the broadcaster by its client identity or
    /// by the synthetic `"broadcaster"` target when they do not know it.
    pub fn matches_target(&self, target: &str) -> bool {
        if target == BROADCASTER_TARGET {
            return true;
        }
        self.client_id
            .as_ref()
            .map(|id| id.as_str() == target)
            .unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct LanguageSlot {
    broadcaster: Option<BroadcasterRef>,
    listeners: HashMap<ClientId, ConnectionId>,
}

/// Per-language registry of the current broadcaster and attached
/// listeners.
#[derive(Debug)]
pub struct LanguageChannelTable {
    slots: DashMap<String, LanguageSlot>,
}

impl LanguageChannelTable {
    /// Create the table with a fixed set of supported languages.
    pub fn new<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slots = DashMap::new();
        for language in languages {
            slots.insert(language.into(), LanguageSlot::default());
        }
        Self { slots }
    }

    /// Check whether a language is in the configured set.
    pub fn has_language(&self, language: &str) -> bool {
        self.slots.contains_key(language)
    }

    /// Install `broadcaster` as the active broadcaster for a language.
    ///
    /// Last-writer-wins: returns the displaced reference, if any. The
    /// relay never force-closes the displaced broadcaster's socket; it
    /// simply stops receiving request-offers.
    pub fn set_broadcaster(
        &self,
        language: &str,
        broadcaster: BroadcasterRef,
    ) -> Option<BroadcasterRef> {
        let mut slot = self.slots.get_mut(language)?;
        let previous = slot.broadcaster.replace(broadcaster.clone());
        match &previous {
            Some(old) if old.connection != broadcaster.connection => {
                info!(language = %language, old = %old.connection, new = %broadcaster.connection,
                    "Replaced active broadcaster");
            }
            Some(_) => {
                debug!(language = %language, "Broadcaster re-registered (heartbeat)");
            }
            None => {
                info!(language = %language, connection = %broadcaster.connection,
                    "Broadcaster registered");
            }
        }
        previous.filter(|old| old.connection != broadcaster.connection)
    }

    /// Clear the slot only if it still points at `connection`.
    ///
    /// Returns true if the slot was cleared. A newer broadcaster that
    /// already replaced `connection` is left untouched.
    pub fn clear_broadcaster_if_matches(&self, language: &str, connection: ConnectionId) -> bool {
        let Some(mut slot) = self.slots.get_mut(language) else {
            return false;
        };
        match &slot.broadcaster {
            Some(current) if current.connection == connection => {
                slot.broadcaster = None;
                info!(language = %language, connection = %connection, "Broadcaster slot cleared");
                true
            }
            _ => false,
        }
    }

    /// Current broadcaster reference for a language.
    pub fn broadcaster(&self, language: &str) -> Option<BroadcasterRef> {
        self.slots.get(language)?.broadcaster.clone()
    }

    /// Attach a listener identity to a language.
    ///
    /// Returns true if the identity was newly added — only then has the
    /// listener count changed. Re-attaching an existing identity from a
    /// new connection (a reconnect) re-points the mapping without
    /// double-counting.
    pub fn add_listener(
        &self,
        language: &str,
        client_id: ClientId,
        connection: ConnectionId,
    ) -> bool {
        let Some(mut slot) = self.slots.get_mut(language) else {
            return false;
        };
        let previous = slot.listeners.insert(client_id.clone(), connection);
        match previous {
            None => {
                debug!(language = %language, client = %client_id, "Listener attached");
                true
            }
            Some(old) if old != connection => {
                debug!(language = %language, client = %client_id,
                    "Listener reconnected on a new connection");
                false
            }
            Some(_) => false,
        }
    }

    /// Detach a listener identity from a language.
    ///
    /// Returns true if the identity was present.
    pub fn remove_listener(&self, language: &str, client_id: &ClientId) -> bool {
        let Some(mut slot) = self.slots.get_mut(language) else {
            return false;
        };
        let removed = slot.listeners.remove(client_id).is_some();
        if removed {
            debug!(language = %language, client = %client_id, "Listener detached");
        }
        removed
    }

    /// Detach a listener only if its mapping still points at
    /// `connection`.
    ///
    /// Used on socket close: if the listener already reconnected, the
    /// mapping points at the new connection and the stale close must
    /// not remove it.
    pub fn remove_listener_if_matches(
        &self,
        language: &str,
        client_id: &ClientId,
        connection: ConnectionId,
    ) -> bool {
        let Some(mut slot) = self.slots.get_mut(language) else {
            return false;
        };
        match slot.listeners.get(client_id) {
            Some(current) if *current == connection => {
                slot.listeners.remove(client_id);
                debug!(language = %language, client = %client_id, "Listener detached on close");
                true
            }
            _ => false,
        }
    }

    /// Connection currently bound to a listener identity.
    pub fn listener_connection(&self, language: &str, client_id: &ClientId) -> Option<ConnectionId> {
        self.slots.get(language)?.listeners.get(client_id).copied()
    }

    /// Listener counts for every configured language.
    ///
    /// Always carries all languages so a single payload shape covers
    /// every change.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.slots
            .iter()
            .map(|slot| (slot.key().clone(), slot.value().listeners.len()))
            .collect()
    }
}
