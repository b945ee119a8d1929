//! Holds the core's tunable constants and their defaults.
//!
//! Mirrors the teacher's `MongoDbConfig` shape (a plain `Default`-able struct,
//! env-overridable for tests) but covers cross-cutting timeouts and checkpoint
//! intervals instead of just the database connection string, since this crate
//! has no binary/CLI entry point of its own to layer `apply_cli_args` onto.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cross-cutting configuration for the core's subsystems.
#[must_use]
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Deadline for `ConnectionManager::connect`. Default 10s (spec §4.C).
    pub connect_timeout: Duration,
    /// Default deadline attached to a single query operation. Default 30s (spec §4.C).
    pub query_timeout: Duration,
    /// How many documents/rows the CSV exporter processes between pause/cancel checks
    /// and progress events. Default 100 (spec §4.F).
    pub csv_checkpoint_interval: u64,
    /// How many documents the export/import pipelines process between pause/cancel
    /// checks and progress events. Default 100 (spec §4.G/§4.H).
    pub job_checkpoint_interval: u64,
    /// Fixed denominator used for export/import progress percentages (spec §4.G).
    pub progress_total: u64,
    /// Number of interval samples schema inference pulls by default. Default 10 (spec §4.E).
    pub default_sample_size: u64,
    /// Number of documents sampled for `GetCollectionProfile`. Default 5 (spec §4.D).
    pub profile_sample_size: i64,
    /// Maximum recursion depth for the profile field walker. Default 20 (spec §4.D).
    pub profile_max_depth: u32,
    /// Service name the credential store registers items under in the OS keyring.
    pub keyring_service: String,
    /// Name of the directory (under the app's config directory) holding encrypted
    /// per-connection vault files.
    pub vault_dir_name: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(30),
            csv_checkpoint_interval: 100,
            job_checkpoint_interval: 100,
            progress_total: 10_000,
            default_sample_size: 10,
            profile_sample_size: 5,
            profile_max_depth: 20,
            keyring_service: "mongopal".to_string(),
            vault_dir_name: "encrypted_connections".to_string(),
        }
    }
}

impl CoreConfig {
    /// Builds a config from `MONGOPAL_*` environment variables layered over
    /// [`CoreConfig::default`], for test/CI override. Unset variables keep defaults;
    /// malformed ones are ignored rather than causing a hard failure, since this is a
    /// convenience path, not a file-backed config (the UI's Config Store owns that).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(secs) = std::env::var("MONGOPAL_CONNECT_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.connect_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(secs) = std::env::var("MONGOPAL_QUERY_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.query_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(service) = std::env::var("MONGOPAL_KEYRING_SERVICE") {
            config.keyring_service = service;
        }
        config
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = CoreConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.query_timeout, Duration::from_secs(30));
        assert_eq!(config.job_checkpoint_interval, 100);
        assert_eq!(config.progress_total, 10_000);
        assert_eq!(config.default_sample_size, 10);
        assert_eq!(config.profile_sample_size, 5);
        assert_eq!(config.profile_max_depth, 20);
    }
}
