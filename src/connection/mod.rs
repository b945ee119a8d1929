//! The Connection Manager (spec §4.C): owns every live driver handle, keyed by
//! connection id, and the status machine around connect/disconnect.

use std::{collections::HashMap, time::Instant};

use mongodb::{bson::doc, Client};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::model::{ConnectionId, ConnectionStatus, ServerDiagnostics};

/// Errors from the Connection Manager.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No driver handle is registered for the given connection id.
    #[error("not connected: {0}")]
    NotConnected(ConnectionId),
    /// A `connect` call is already in flight for this connection id.
    #[error("connection already in progress for {0}")]
    ConnectionInProgress(ConnectionId),
    /// Parsing the connection options, or reaching the server, failed.
    #[error("connection failed: {0}")]
    MongoDb(#[from] mongodb::error::Error),
    /// The connect attempt did not complete within the configured deadline.
    #[error("connect timed out after {0:?}")]
    Timeout(std::time::Duration),
}

enum Slot {
    Connecting,
    Connected(Client),
    Error(String),
}

/// Owns every live `mongodb::Client` handle, keyed by connection id. Connect/test are
/// idempotent per id: a second `connect` call while one is already in flight for the
/// same id is refused rather than racing two driver handles into the map.
pub struct ConnectionManager {
    connect_timeout: std::time::Duration,
    slots: RwLock<HashMap<ConnectionId, Slot>>,
}

impl ConnectionManager {
    /// Builds a manager that allows `connect_timeout` for each connect/test attempt.
    pub fn new(connect_timeout: std::time::Duration) -> Self {
        Self {
            connect_timeout,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Establishes (or replaces) the driver handle for `conn_id` using `uri`, pinging
    /// the server once before the handle is considered ready.
    #[instrument(skip(self, uri))]
    pub async fn connect(&self, conn_id: &str, uri: &str) -> Result<(), ConnectionError> {
        {
            let mut slots = self.slots.write().await;
            if matches!(slots.get(conn_id), Some(Slot::Connecting)) {
                return Err(ConnectionError::ConnectionInProgress(conn_id.to_string()));
            }
            slots.insert(conn_id.to_string(), Slot::Connecting);
        }

        let attempt = async {
            let client = Client::with_uri_str(uri).await?;
            client.database("admin").run_command(doc! { "ping": 1 }, None).await?;
            Ok::<Client, mongodb::error::Error>(client)
        };

        let result = tokio::time::timeout(self.connect_timeout, attempt).await;

        let mut slots = self.slots.write().await;
        match result {
            Ok(Ok(client)) => {
                info!(conn_id, "connected");
                slots.insert(conn_id.to_string(), Slot::Connected(client));
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(conn_id, error = %e, "connect failed");
                slots.insert(conn_id.to_string(), Slot::Error(e.to_string()));
                Err(ConnectionError::MongoDb(e))
            }
            Err(_) => {
                warn!(conn_id, timeout = ?self.connect_timeout, "connect timed out");
                slots.remove(conn_id);
                Err(ConnectionError::Timeout(self.connect_timeout))
            }
        }
    }

    /// Drops the driver handle for `conn_id`. A no-op if nothing was connected.
    pub async fn disconnect(&self, conn_id: &str) {
        self.slots.write().await.remove(conn_id);
    }

    /// Drops every driver handle. Used on app shutdown.
    pub async fn disconnect_all(&self) {
        self.slots.write().await.clear();
    }

    /// Alias for [`Self::disconnect_all`], named for the app-shutdown call site.
    pub async fn shutdown(&self) {
        self.disconnect_all().await;
    }

    /// Returns the current status for `conn_id`, or [`ConnectionStatus::Disconnected`]
    /// if no slot exists.
    pub async fn status(&self, conn_id: &str) -> ConnectionStatus {
        match self.slots.read().await.get(conn_id) {
            None => ConnectionStatus::Disconnected,
            Some(Slot::Connecting) => ConnectionStatus::Connecting,
            Some(Slot::Connected(_)) => ConnectionStatus::Connected,
            Some(Slot::Error(msg)) => ConnectionStatus::Error(msg.clone()),
        }
    }

    /// Returns a clone of the driver handle for `conn_id`, if connected.
    pub async fn get_client(&self, conn_id: &str) -> Result<Client, ConnectionError> {
        match self.slots.read().await.get(conn_id) {
            Some(Slot::Connected(client)) => Ok(client.clone()),
            _ => Err(ConnectionError::NotConnected(conn_id.to_string())),
        }
    }

    /// Connects transiently to `uri`, gathers [`ServerDiagnostics`], then tears the
    /// handle down again without registering it under any connection id (spec §4.C:
    /// `TestConnection` never mutates the manager's live-connection map).
    pub async fn test_connection(&self, uri: &str) -> Result<ServerDiagnostics, ConnectionError> {
        let started = Instant::now();
        let client = tokio::time::timeout(self.connect_timeout, Client::with_uri_str(uri))
            .await
            .map_err(|_| ConnectionError::Timeout(self.connect_timeout))??;

        let admin = client.database("admin");
        let hello = tokio::time::timeout(self.connect_timeout, admin.run_command(doc! { "hello": 1 }, None))
            .await
            .map_err(|_| ConnectionError::Timeout(self.connect_timeout))??;
        let round_trip_ms = started.elapsed().as_millis() as u64;

        let version = hello.get_str("version").unwrap_or("unknown").to_string();
        let set_name = hello.get_str("setName").ok().map(str::to_string);
        let is_primary_like = hello.get_bool("isWritablePrimary").unwrap_or(false) || hello.get_bool("ismaster").unwrap_or(false);
        let topology_kind = if set_name.is_some() {
            if is_primary_like {
                "ReplicaSetWithPrimary"
            } else {
                "ReplicaSetNoPrimary"
            }
        } else if hello.get_str("msg").map(|m| m == "isdbgrid").unwrap_or(false) {
            "Sharded"
        } else {
            "Single"
        }
        .to_string();

        Ok(ServerDiagnostics {
            version,
            topology_kind,
            replica_set_name: set_name,
            round_trip_ms,
            tls_enabled: uri.contains("tls=true") || uri.contains("ssl=true"),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn unconnected_id_reports_disconnected_status() {
        let manager = ConnectionManager::new(std::time::Duration::from_secs(10));
        assert_eq!(manager.status("missing").await, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn get_client_fails_when_not_connected() {
        let manager = ConnectionManager::new(std::time::Duration::from_secs(10));
        assert!(matches!(manager.get_client("missing").await, Err(ConnectionError::NotConnected(_))));
    }

    #[tokio::test]
    async fn disconnect_of_unknown_id_is_a_noop() {
        let manager = ConnectionManager::new(std::time::Duration::from_secs(10));
        manager.disconnect("missing").await;
        assert_eq!(manager.status("missing").await, ConnectionStatus::Disconnected);
    }
}
