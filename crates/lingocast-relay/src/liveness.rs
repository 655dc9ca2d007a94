//! Liveness monitoring.
//!
//! Broadcasters heartbeat by re-registering every ~10s. Mobile
//! transports can go silent without a clean close, so a broadcaster
//! that has not been heard from for longer than the timeout window is
//! treated as closed for the purpose of freeing its language slot. The
//! transport close event remains the primary eviction path; this sweep
//! is hardening on top of it. Listener records are left to their
//! sockets, since sweeping them would fight the
//! reconnect-with-same-identity flow.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channels::LanguageChannelTable;
use crate::registry::ConnectionRegistry;
use crate::router::MessageRouter;

/// Heartbeat interval observed from clients.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Default eviction window, three missed heartbeats.
pub const DEFAULT_BROADCASTER_TIMEOUT: Duration = Duration::from_secs(30);

/// Timing knobs for the monitor.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// How often to sweep for silent broadcasters.
    pub sweep_interval: Duration,
    /// How long a broadcaster may stay silent before its slot is freed.
    pub broadcaster_timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            sweep_interval: HEARTBEAT_INTERVAL,
            broadcaster_timeout: DEFAULT_BROADCASTER_TIMEOUT,
        }
    }
}

/// Evicts silent broadcasters on a timer.
pub struct LivenessMonitor {
    registry: Arc<ConnectionRegistry>,
    channels: Arc<LanguageChannelTable>,
    router: Arc<MessageRouter>,
    config: LivenessConfig,
}

impl LivenessMonitor {
    /// Create a monitor over the shared registries.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        channels: Arc<LanguageChannelTable>,
        router: Arc<MessageRouter>,
        config: LivenessConfig,
    ) -> Self {
        Self {
            registry,
            channels,
            router,
            config,
        }
    }

    /// Run one sweep, returning the number of slots freed.
    ///
    /// A slot whose broadcaster was already replaced by a fresh
    /// registration is left alone; the clear compares identities.
    pub fn sweep(&self) -> usize {
        let mut evicted = 0;
        for (conn, language) in self
            .registry
            .idle_broadcasters(self.config.broadcaster_timeout)
        {
            if self.channels.clear_broadcaster_if_matches(&language, conn) {
                warn!(connection = %conn, language = %language,
                    "Evicted silent broadcaster");
                evicted += 1;
            }
        }
        if evicted > 0 {
            self.router.broadcast_listener_counts();
        }
        evicted
    }

    /// Spawn the sweep loop; cancels cleanly via `shutdown`.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.config.sweep_interval.as_secs(),
                timeout_secs = self.config.broadcaster_timeout.as_secs(),
                "Liveness monitor started"
            );
            let mut ticker = tokio::time::interval(self.config.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Liveness monitor stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::BroadcasterRef;
    use crate::types::Role;
    use tokio::sync::mpsc;

    fn monitor(timeout: Duration) -> (Arc<ConnectionRegistry>, Arc<LanguageChannelTable>, LivenessMonitor)
    {
        let registry = Arc::new(ConnectionRegistry::new());
        let channels = Arc::new(LanguageChannelTable::new(["es"]));
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&registry),
            Arc::clone(&channels),
        ));
        let m = LivenessMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&channels),
            router,
            LivenessConfig {
                sweep_interval: Duration::from_millis(10),
                broadcaster_timeout: timeout,
            },
        );
        (registry, channels, m)
    }

    #[tokio::test]
    async fn test_sweep_leaves_fresh_broadcaster() {
        let (registry, channels, monitor) = monitor(Duration::from_secs(30));
        let (tx, _rx) = mpsc::channel(16);
        let b = registry.create(tx);
        registry.assign_role(b, Role::Broadcaster, "es");
        channels.set_broadcaster(
            "es",
            BroadcasterRef {
                connection: b,
                client_id: None,
            },
        );

        assert_eq!(monitor.sweep(), 0);
        assert!(channels.broadcaster("es").is_some());
    }

    #[tokio::test]
    async fn test_sweep_evicts_silent_broadcaster() {
        let (registry, channels, monitor) = monitor(Duration::ZERO);
        let (tx, _rx) = mpsc::channel(16);
        let b = registry.create(tx);
        registry.assign_role(b, Role::Broadcaster, "es");
        channels.set_broadcaster(
            "es",
            BroadcasterRef {
                connection: b,
                client_id: None,
            },
        );

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(monitor.sweep(), 1);
        assert!(channels.broadcaster("es").is_none());

        // Sweeping again finds nothing to free.
        assert_eq!(monitor.sweep(), 0);
    }

    #[tokio::test]
    async fn test_sweep_leaves_replacement_alone() {
        let (registry, channels, monitor) = monitor(Duration::from_millis(40));
        let (tx1, _rx1) = mpsc::channel(16);
        let (tx2, _rx2) = mpsc::channel(16);

        let stale = registry.create(tx1);
        registry.assign_role(stale, Role::Broadcaster, "es");

        tokio::time::sleep(Duration::from_millis(60)).await;

        // A replacement already took the slot over.
        let fresh = registry.create(tx2);
        registry.assign_role(fresh, Role::Broadcaster, "es");
        channels.set_broadcaster(
            "es",
            BroadcasterRef {
                connection: fresh,
                client_id: None,
            },
        );

        monitor.sweep();
        assert_eq!(
            channels.broadcaster("es").map(|b| b.connection),
            Some(fresh)
        );
    }

    #[tokio::test]
    async fn test_spawn_cancels_cleanly() {
        let (_registry, _channels, monitor) = monitor(Duration::from_secs(30));
        let shutdown = CancellationToken::new();
        let handle = monitor.spawn(shutdown.clone());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
