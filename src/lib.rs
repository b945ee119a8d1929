//! Connection, query, export/import, and schema-inference core for the MongoPal
//! desktop MongoDB explorer.
//!
//! This crate holds no UI and no IPC transport — it is the engine a desktop shell
//! (Tauri, Electron-via-sidecar, whatever) drives directly. Every long-running
//! component takes its [`events::EventEmitter`] capability at construction rather than
//! reaching for a global, so a host can wire up however many connections, export jobs,
//! and import jobs it needs without any of them sharing implicit state.

pub mod cancel;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod csvexport;
pub mod error;
pub mod events;
pub mod export;
pub mod import;
pub mod model;
pub mod pause;
pub mod query;
pub mod schema;
pub mod uri;

pub use error::{CoreError, CoreResult};

/// Initializes a `tracing` subscriber reading its filter from `RUST_LOG` (default
/// `info`), for hosts that don't already run their own subscriber setup.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
