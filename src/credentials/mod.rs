//! The Credential Store (spec §4.A): keeps every secret belonging to a Saved
//! Connection out of the Config Store, behind the OS keyring and an AES-256-GCM
//! encrypted file vault, plus a random-key share-bundle format for handing a
//! connection to a teammate without a plaintext password in chat.

mod share;
mod vault;

pub use vault::VaultError;

use crate::model::ExtendedConnection;

pub use share::{decrypt_from_sharing, encrypt_for_sharing, encrypt_for_sharing_with_key};

/// Facade over the keyring + encrypted-file vault backends, scoped to one
/// connection's worth of secrets at a time.
pub struct CredentialStore {
    service: String,
    vault_dir: std::path::PathBuf,
}

impl CredentialStore {
    /// Builds a store rooted at `vault_dir` (typically the app's config directory
    /// plus [`crate::config::CoreConfig::vault_dir_name`]), registering keyring items
    /// under `service` (typically [`crate::config::CoreConfig::keyring_service`]).
    pub fn new(service: impl Into<String>, vault_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            service: service.into(),
            vault_dir: vault_dir.into(),
        }
    }

    /// Builds a store from a [`crate::config::CoreConfig`], rooting the vault under
    /// `config_dir`/`vault_dir_name`.
    pub fn from_config(config: &crate::config::CoreConfig, config_dir: impl AsRef<std::path::Path>) -> Self {
        Self::new(config.keyring_service.clone(), config_dir.as_ref().join(&config.vault_dir_name))
    }

    /// Persists every secret field of `conn` into the encrypted vault file for its
    /// connection id.
    pub fn save(&self, conn: &ExtendedConnection) -> Result<(), VaultError> {
        let plaintext = serde_json::to_vec(conn)?;
        vault::write_vault_file(&self.service, &self.vault_dir, &conn.connection.id, &plaintext)
    }

    /// Loads the secret fields for `conn_id` and merges them onto `connection`,
    /// returning the fully materialized [`ExtendedConnection`].
    pub fn load(
        &self,
        connection: crate::model::SavedConnection,
    ) -> Result<ExtendedConnection, VaultError> {
        let plaintext = vault::read_vault_file(&self.service, &self.vault_dir, &connection.id)?;
        let stored: ExtendedConnection = serde_json::from_slice(&plaintext)?;
        Ok(ExtendedConnection {
            connection,
            ..stored
        })
    }

    /// Deletes a connection's vault file and keyring key. Safe to call on a
    /// connection with no stored secrets.
    pub fn delete(&self, conn_id: &str) -> Result<(), VaultError> {
        vault::delete_vault(&self.service, &self.vault_dir, conn_id)
    }

    /// Regenerates `conn_id`'s AES key and re-encrypts its vault file. A manual
    /// remediation action; never triggered automatically by a failed read.
    pub fn rotate_key(&self, conn_id: &str) -> Result<(), VaultError> {
        vault::rotate_key(&self.service, &self.vault_dir, conn_id)
    }

    /// Seals `conn`'s secrets into a share bundle behind a freshly generated random
    /// key, returning `(envelope_json, detached_key)`. The key must reach the
    /// recipient over a channel separate from the envelope itself.
    pub fn export_share_bundle(
        &self,
        conn: &ExtendedConnection,
        now: time::OffsetDateTime,
    ) -> Result<(String, String), VaultError> {
        let plaintext = serde_json::to_vec(conn)?;
        share::encrypt_for_sharing(&plaintext, now)
    }

    /// Opens a share bundle produced by [`Self::export_share_bundle`] using its
    /// detached key, merging its secrets onto `connection`.
    pub fn import_share_bundle(
        &self,
        connection: crate::model::SavedConnection,
        bundle: &str,
        key: &str,
    ) -> Result<ExtendedConnection, VaultError> {
        let plaintext = share::decrypt_from_sharing(bundle, key)?;
        let stored: ExtendedConnection = serde_json::from_slice(&plaintext)?;
        Ok(ExtendedConnection {
            connection,
            ..stored
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{ConnectionKind, FormData, SavedConnection};
    use time::OffsetDateTime;

    fn sample_time() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn sample_connection(id: &str) -> ExtendedConnection {
        ExtendedConnection {
            connection: SavedConnection {
                id: id.to_string(),
                name: "Local".to_string(),
                folder_id: None,
                accent_color: None,
                read_only: false,
                created_at: OffsetDateTime::UNIX_EPOCH,
                last_accessed_at: None,
                form_data: FormData {
                    kind: ConnectionKind::Standalone,
                    ..FormData::default()
                },
                stored_uri: "mongodb://localhost/?directConnection=true".to_string(),
            },
            mongo_password: Some("hunter2".to_string()),
            ssh_password: None,
            ssh_private_key: None,
            ssh_passphrase: None,
            socks5_password: None,
            tls_key_password: None,
        }
    }

    #[test]
    fn share_bundle_round_trips_with_the_detached_key() {
        let store = CredentialStore::new("mongopal-test", std::env::temp_dir().join("mongopal-unused-vault"));
        let conn = sample_connection("conn-share-1");
        let (bundle, key) = store.export_share_bundle(&conn, sample_time()).unwrap();
        let restored = store
            .import_share_bundle(conn.connection.clone(), &bundle, &key)
            .unwrap();
        assert_eq!(restored.mongo_password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn share_bundle_rejects_wrong_key() {
        let store = CredentialStore::new("mongopal-test", std::env::temp_dir().join("mongopal-unused-vault"));
        let conn = sample_connection("conn-share-2");
        let (bundle, _) = store.export_share_bundle(&conn, sample_time()).unwrap();
        let (_, other_key) = share::encrypt_for_sharing(b"unused", sample_time()).unwrap();
        assert!(store
            .import_share_bundle(conn.connection.clone(), &bundle, &other_key)
            .is_err());
    }
}
