use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::driver::DriverLocation;
use crate::protocol::ServerEvent;

/// Sender half of one driver connection's outbound queue; the socket's
/// writer task drains the other half.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// One authenticated driver connection. `conn_id` distinguishes a
/// replacement connection from the one it superseded, so a stale socket's
/// late cleanup or buffered events cannot touch the entry that replaced it.
#[derive(Debug, Clone)]
pub struct DriverConnection {
    pub conn_id: u64,
    pub tx: ConnectionSender,
    pub online: bool,
    pub location: Option<DriverLocation>,
    pub connected_at: DateTime<Utc>,
}

/// Row of the admin snapshot endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineDriver {
    pub driver_id: Uuid,
    pub connection_present: bool,
    pub location: Option<DriverLocation>,
}

/// Single source of truth for which drivers can currently receive a push,
/// and the only channel dispatch uses to reach them. One entry per driver;
/// a second connection from the same driver replaces the first.
#[async_trait]
pub trait PresenceRegistry: Send + Sync {
    /// Register an authenticated connection as connected-but-offline,
    /// replacing any prior entry for the driver (reconnect without a clean
    /// disconnect). Returns the connection id the caller must present for
    /// later mutations.
    async fn register(&self, driver_id: Uuid, tx: ConnectionSender) -> u64;

    /// Drop the entry on transport disconnect. A stale `conn_id` leaves a
    /// replacement entry untouched. Returns whether an entry was removed.
    async fn remove(&self, driver_id: Uuid, conn_id: u64) -> bool;

    /// Mark the driver eligible for dispatch pushes. Idempotent; the stored
    /// location is exactly what the driver shared this time (none clears a
    /// previous one).
    async fn set_online(
        &self,
        driver_id: Uuid,
        conn_id: u64,
        location: Option<DriverLocation>,
    ) -> bool;

    /// Take the driver out of dispatch while keeping the connection, so it
    /// still receives direct replies.
    async fn set_offline(&self, driver_id: Uuid, conn_id: u64) -> bool;

    async fn get(&self, driver_id: Uuid) -> Option<DriverConnection>;

    async fn is_online(&self, driver_id: Uuid) -> bool;

    /// Broadcast targets: every driver currently marked online.
    async fn online_ids(&self) -> Vec<Uuid>;

    async fn online_count(&self) -> usize;

    async fn connection_count(&self) -> usize;

    async fn snapshot(&self) -> Vec<OnlineDriver>;

    /// Unicast. A driver without a live connection is silently skipped;
    /// callers must not assume delivery.
    async fn send(&self, driver_id: Uuid, event: &ServerEvent);

    /// Fan out to a subset of drivers. A dead connection in the subset
    /// never aborts delivery to the rest.
    async fn broadcast(&self, driver_ids: &[Uuid], event: &ServerEvent);
}

/// Process-local registry. In-memory only, lifetime = process uptime; the
/// `isOnline` flag on the driver record is a best-effort mirror written
/// elsewhere, never read back here.
pub struct MemoryPresenceRegistry {
    entries: DashMap<Uuid, DriverConnection>,
    next_conn_id: AtomicU64,
}

impl MemoryPresenceRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_conn_id: AtomicU64::new(0),
        }
    }
}

impl Default for MemoryPresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PresenceRegistry for MemoryPresenceRegistry {
    async fn register(&self, driver_id: Uuid, tx: ConnectionSender) -> u64 {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            driver_id,
            DriverConnection {
                conn_id,
                tx,
                online: false,
                location: None,
                connected_at: Utc::now(),
            },
        );
        conn_id
    }

    async fn remove(&self, driver_id: Uuid, conn_id: u64) -> bool {
        self.entries
            .remove_if(&driver_id, |_, entry| entry.conn_id == conn_id)
            .is_some()
    }

    async fn set_online(
        &self,
        driver_id: Uuid,
        conn_id: u64,
        location: Option<DriverLocation>,
    ) -> bool {
        match self.entries.get_mut(&driver_id) {
            Some(mut entry) if entry.conn_id == conn_id => {
                entry.online = true;
                entry.location = location;
                true
            }
            _ => false,
        }
    }

    async fn set_offline(&self, driver_id: Uuid, conn_id: u64) -> bool {
        match self.entries.get_mut(&driver_id) {
            Some(mut entry) if entry.conn_id == conn_id => {
                entry.online = false;
                entry.location = None;
                true
            }
            _ => false,
        }
    }

    async fn get(&self, driver_id: Uuid) -> Option<DriverConnection> {
        self.entries.get(&driver_id).map(|entry| entry.value().clone())
    }

    async fn is_online(&self, driver_id: Uuid) -> bool {
        self.entries
            .get(&driver_id)
            .map(|entry| entry.online)
            .unwrap_or(false)
    }

    async fn online_ids(&self) -> Vec<Uuid> {
        self.entries
            .iter()
            .filter(|entry| entry.value().online)
            .map(|entry| *entry.key())
            .collect()
    }

    async fn online_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().online)
            .count()
    }

    async fn connection_count(&self) -> usize {
        self.entries.len()
    }

    async fn snapshot(&self) -> Vec<OnlineDriver> {
        self.entries
            .iter()
            .filter(|entry| entry.value().online)
            .map(|entry| OnlineDriver {
                driver_id: *entry.key(),
                connection_present: !entry.value().tx.is_closed(),
                location: entry.value().location.clone(),
            })
            .collect()
    }

    async fn send(&self, driver_id: Uuid, event: &ServerEvent) {
        if let Some(frame) = encode(event) {
            if let Some(entry) = self.entries.get(&driver_id) {
                let _ = entry.tx.send(frame);
            }
        }
    }

    async fn broadcast(&self, driver_ids: &[Uuid], event: &ServerEvent) {
        if let Some(frame) = encode(event) {
            for driver_id in driver_ids {
                if let Some(entry) = self.entries.get(driver_id) {
                    let _ = entry.tx.send(frame.clone());
                }
            }
        }
    }
}

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize outbound event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::{MemoryPresenceRegistry, PresenceRegistry};
    use crate::protocol::ServerEvent;

    fn channel() -> (super::ConnectionSender, mpsc::UnboundedReceiver<Message>) {
        mpsc::unbounded_channel()
    }

    fn ping(message: &str) -> ServerEvent {
        ServerEvent::AcceptError {
            message: message.to_string(),
        }
    }

    fn frame_text(msg: Message) -> String {
        match msg {
            Message::Text(text) => text.to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn register_replaces_prior_entry_with_latest_handle() {
        let registry = MemoryPresenceRegistry::new();
        let driver = Uuid::new_v4();

        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();

        let conn1 = registry.register(driver, tx1).await;
        registry.set_online(driver, conn1, None).await;
        let conn2 = registry.register(driver, tx2).await;

        assert_eq!(registry.connection_count().await, 1);
        assert_eq!(registry.get(driver).await.unwrap().conn_id, conn2);

        registry.send(driver, &ping("hello")).await;
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn stale_connection_cannot_mutate_replacement() {
        let registry = MemoryPresenceRegistry::new();
        let driver = Uuid::new_v4();

        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        let conn1 = registry.register(driver, tx1).await;
        let conn2 = registry.register(driver, tx2).await;
        registry.set_online(driver, conn2, None).await;

        assert!(!registry.set_offline(driver, conn1).await);
        assert!(!registry.remove(driver, conn1).await);
        assert!(registry.is_online(driver).await);
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn set_offline_keeps_connection_but_leaves_dispatch() {
        let registry = MemoryPresenceRegistry::new();
        let driver = Uuid::new_v4();

        let (tx, mut rx) = channel();
        let conn = registry.register(driver, tx).await;
        registry.set_online(driver, conn, None).await;
        assert_eq!(registry.online_ids().await, vec![driver]);

        assert!(registry.set_offline(driver, conn).await);
        assert!(registry.online_ids().await.is_empty());
        assert!(registry.get(driver).await.is_some());

        registry.send(driver, &ping("still connected")).await;
        let text = frame_text(rx.try_recv().unwrap());
        assert!(text.contains("still connected"));
    }

    #[tokio::test]
    async fn remove_clears_entry() {
        let registry = MemoryPresenceRegistry::new();
        let driver = Uuid::new_v4();

        let (tx, _rx) = channel();
        let conn = registry.register(driver, tx).await;
        registry.set_online(driver, conn, None).await;

        assert!(registry.remove(driver, conn).await);
        assert!(registry.get(driver).await.is_none());
        assert!(!registry.is_online(driver).await);
    }

    #[tokio::test]
    async fn send_to_absent_driver_is_a_noop() {
        let registry = MemoryPresenceRegistry::new();
        registry.send(Uuid::new_v4(), &ping("nobody home")).await;
    }

    #[tokio::test]
    async fn broadcast_survives_dead_connections() {
        let registry = MemoryPresenceRegistry::new();
        let dead = Uuid::new_v4();
        let alive = Uuid::new_v4();

        let (dead_tx, dead_rx) = channel();
        let (alive_tx, mut alive_rx) = channel();
        registry.register(dead, dead_tx).await;
        registry.register(alive, alive_tx).await;
        drop(dead_rx);

        registry.broadcast(&[dead, alive], &ping("fanout")).await;

        let text = frame_text(alive_rx.try_recv().unwrap());
        assert!(text.contains("fanout"));
    }

    #[tokio::test]
    async fn snapshot_lists_online_drivers_only() {
        let registry = MemoryPresenceRegistry::new();
        let online = Uuid::new_v4();
        let connected_only = Uuid::new_v4();

        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();
        let conn = registry.register(online, tx1).await;
        registry.register(connected_only, tx2).await;
        registry.set_online(online, conn, None).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].driver_id, online);
        assert!(snapshot[0].connection_present);
        assert!(snapshot[0].location.is_none());
    }
}
