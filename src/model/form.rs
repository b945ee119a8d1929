//! Form Data — the structured connection intent the UI round-trips (spec §3).

use serde::{Deserialize, Serialize};

/// The shape of a MongoDB deployment a Saved Connection targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// A single `mongod`.
    Standalone,
    /// A classic replica set reached via an explicit host list.
    Replicaset,
    /// A sharded cluster reached via `mongos` routers.
    Sharded,
    /// A deployment resolved through a single `mongodb+srv://` hostname.
    Srv,
}

/// A supported authentication mechanism (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMechanism {
    /// No authentication.
    None,
    /// SCRAM-SHA-1.
    ScramSha1,
    /// SCRAM-SHA-256.
    ScramSha256,
    /// X.509 client-certificate authentication.
    X509,
    /// AWS IAM authentication.
    Aws,
    /// Kerberos (GSSAPI) authentication.
    Gssapi,
}

impl AuthMechanism {
    /// The driver-expected `authMechanism` spelling for this mechanism, or `None` for
    /// [`AuthMechanism::None`] (the pair is omitted entirely in that case, spec §4.B).
    pub fn driver_spelling(self) -> Option<&'static str> {
        match self {
            AuthMechanism::None => None,
            AuthMechanism::ScramSha1 => Some("SCRAM-SHA-1"),
            AuthMechanism::ScramSha256 => Some("SCRAM-SHA-256"),
            AuthMechanism::X509 => Some("MONGODB-X509"),
            AuthMechanism::Aws => Some("MONGODB-AWS"),
            AuthMechanism::Gssapi => Some("GSSAPI"),
        }
    }
}

/// MongoDB read preference modes the form can request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreference {
    /// Read from the primary only (the driver default).
    Primary,
    /// Prefer the primary, fall back to a secondary.
    PrimaryPreferred,
    /// Read from a secondary only.
    Secondary,
    /// Prefer a secondary, fall back to the primary.
    SecondaryPreferred,
    /// Read from the nearest member by network latency.
    Nearest,
}

impl Default for ReadPreference {
    fn default() -> Self {
        ReadPreference::Primary
    }
}

impl ReadPreference {
    /// The `readPreference` query-parameter spelling.
    pub fn as_uri_str(self) -> &'static str {
        match self {
            ReadPreference::Primary => "primary",
            ReadPreference::PrimaryPreferred => "primaryPreferred",
            ReadPreference::Secondary => "secondary",
            ReadPreference::SecondaryPreferred => "secondaryPreferred",
            ReadPreference::Nearest => "nearest",
        }
    }
}

/// Write concern (spec §3: `w`/`j`/`wtimeout`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConcern {
    /// The `w` value: a number of nodes, or a tag like `"majority"`.
    pub w: Option<String>,
    /// Whether writes must be journaled before acknowledgement.
    pub journal: Option<bool>,
    /// Write concern timeout, in milliseconds.
    pub wtimeout_ms: Option<u64>,
}

impl Default for WriteConcern {
    fn default() -> Self {
        Self {
            w: None,
            journal: None,
            wtimeout_ms: None,
        }
    }
}

/// One host/port pair in a standalone, replica-set, or sharded host list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPort {
    /// Hostname or literal IP (IPv6 addresses are written without brackets here; the
    /// URI builder adds them).
    pub host: String,
    /// Port number. `27017` is the MongoDB default and is omitted when building a URI.
    pub port: u16,
}

impl Default for HostPort {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 27017,
        }
    }
}

/// SSH tunnel or SOCKS5 proxy configuration. Stored verbatim by the Config Store;
/// tunnel/proxy setup itself is outside the core's scope (spec §3).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Whether this proxy/tunnel is enabled.
    pub enabled: bool,
    /// Proxy/tunnel host.
    pub host: Option<String>,
    /// Proxy/tunnel port.
    pub port: Option<u16>,
    /// Username, if the proxy/tunnel requires auth.
    pub username: Option<String>,
    /// Authentication method (e.g. `"password"`, `"key"`), opaque to the core.
    pub auth_method: Option<String>,
}

/// The structured connection intent a Saved Connection's `stored_uri` is derived from
/// (spec §3). Transient secret fields (`password`) never round-trip through the
/// Config Store — the Credential Store owns all secret material.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormData {
    /// Deployment shape.
    pub kind: ConnectionKind,
    /// Host/port pairs, used for standalone/replicaset/sharded.
    pub hosts: Vec<HostPort>,
    /// SRV hostname, used when `kind == Srv`.
    pub srv_host: Option<String>,
    /// Username, if authenticating.
    pub username: Option<String>,
    /// Password. Transient: present only while building/testing a URI, never
    /// persisted inside `FormData` itself.
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    /// Authentication mechanism.
    pub auth_mechanism: AuthMechanism,
    /// Database `authMechanism` credentials are checked against.
    pub auth_database: Option<String>,
    /// Replica set name, used when `kind == Replicaset`.
    pub replica_set_name: Option<String>,
    /// Whether TLS is enabled.
    pub tls_enabled: bool,
    /// Whether to accept invalid/self-signed TLS certificates.
    pub tls_allow_invalid_certificates: bool,
    /// Connection pool size.
    pub pool_size: Option<u32>,
    /// Whether to enable retryable writes.
    pub retry_writes: bool,
    /// Write concern.
    pub write_concern: WriteConcern,
    /// Read preference.
    pub read_preference: ReadPreference,
    /// `appName` reported to the server.
    pub app_name: Option<String>,
    /// Wire compressors to negotiate, in preference order.
    pub compressors: Vec<String>,
    /// Connect timeout, in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Socket timeout, in seconds.
    pub socket_timeout_secs: Option<u64>,
    /// Server selection timeout, in seconds.
    pub server_selection_timeout_secs: Option<u64>,
    /// Database selected by default when none is specified in a query.
    pub default_database: Option<String>,
    /// SSH tunnel configuration.
    pub ssh_tunnel: ProxyConfig,
    /// SOCKS5 proxy configuration.
    pub socks5_proxy: ProxyConfig,
}

impl Default for FormData {
    fn default() -> Self {
        Self {
            kind: ConnectionKind::Standalone,
            hosts: vec![HostPort::default()],
            srv_host: None,
            username: None,
            password: None,
            auth_mechanism: AuthMechanism::None,
            auth_database: None,
            replica_set_name: None,
            tls_enabled: false,
            tls_allow_invalid_certificates: false,
            pool_size: None,
            retry_writes: true,
            write_concern: WriteConcern::default(),
            read_preference: ReadPreference::default(),
            app_name: None,
            compressors: Vec::new(),
            connect_timeout_secs: None,
            socket_timeout_secs: None,
            server_selection_timeout_secs: None,
            default_database: None,
            ssh_tunnel: ProxyConfig::default(),
            socks5_proxy: ProxyConfig::default(),
        }
    }
}
