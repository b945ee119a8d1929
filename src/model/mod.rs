//! The Saved Connection data model (spec §3) and its supplemental UI-facing types.

mod form;

pub use form::{AuthMechanism, ConnectionKind, FormData, HostPort, ProxyConfig, ReadPreference, WriteConcern};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Opaque, stable identifier for a Saved Connection.
pub type ConnectionId = String;

/// A record describing one saved MongoDB connection (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavedConnection {
    /// Stable opaque id.
    pub id: ConnectionId,
    /// Display name shown in the UI.
    pub name: String,
    /// Folder this connection is grouped under, for display only.
    pub folder_id: Option<String>,
    /// UI accent color (e.g. a hex string); opaque to the core.
    pub accent_color: Option<String>,
    /// Whether write operations should be refused by the UI layer.
    pub read_only: bool,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
    /// Last time this connection was opened.
    pub last_accessed_at: Option<OffsetDateTime>,
    /// The structured intent this connection was built from.
    pub form_data: FormData,
    /// The canonical URI passed to the driver. Never contains a password and never
    /// carries `mongopal.*`/`3t.*` vendor parameters (spec §3 invariants).
    pub stored_uri: String,
}

/// [`SavedConnection`] plus plaintext copies of every secret, materialized only when
/// the user explicitly reveals a secret or is editing a connection. Never persisted
/// to the config store without the Credential Store's encryption.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtendedConnection {
    /// The underlying saved connection (secret-free).
    #[serde(flatten)]
    pub connection: SavedConnection,
    /// The MongoDB user's password, if any.
    pub mongo_password: Option<String>,
    /// SSH tunnel password, if the tunnel uses password auth.
    pub ssh_password: Option<String>,
    /// SSH tunnel private key contents, if the tunnel uses key auth.
    pub ssh_private_key: Option<String>,
    /// Passphrase protecting `ssh_private_key`, if any.
    pub ssh_passphrase: Option<String>,
    /// SOCKS5 proxy password, if the proxy requires auth.
    pub socks5_password: Option<String>,
    /// Password protecting the TLS client key, if any.
    pub tls_key_password: Option<String>,
}

/// A UI-grouping folder. Forms a strict tree; never consulted by the core beyond
/// round-tripping its id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Folder {
    /// Stable opaque id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Parent folder id, if any.
    pub parent_id: Option<String>,
}

/// The live state of a registered connection, as observed through the Connection
/// Manager (SPEC_FULL §4 supplemental type — the distilled spec only describes
/// connect/disconnect outcomes, but a desktop UI needs a queryable status).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// No driver handle registered, no connect in progress.
    Disconnected,
    /// A `connect` call is in flight.
    Connecting,
    /// A driver handle is registered and usable.
    Connected,
    /// The last connect attempt failed with this message.
    Error(String),
}

/// Structured result of `TestConnection` (spec §4.C).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerDiagnostics {
    /// Reported MongoDB server version.
    pub version: String,
    /// Topology kind as reported by the driver (e.g. "Single", "ReplicaSetWithPrimary").
    pub topology_kind: String,
    /// Replica set name, if the deployment is a replica set.
    pub replica_set_name: Option<String>,
    /// Round-trip latency of the diagnostic ping, in milliseconds.
    pub round_trip_ms: u64,
    /// Whether the connection negotiated TLS.
    pub tls_enabled: bool,
}
