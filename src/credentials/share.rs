//! Share-bundle envelope (spec §4.A): a random-key-sealed export of a connection's
//! secrets, for handing a teammate a connection without handing them a plaintext
//! password over chat. The envelope travels with the connection (e.g. as a file or
//! pasted blob); the 32-byte key travels out of band (e.g. read aloud, sent over a
//! different channel) and is never embedded in the envelope itself.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::vault::VaultError;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const ENVELOPE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: u32,
    app: String,
    ts: String,
    nonce: String,
    data: String,
}

/// Generates a fresh random 32-byte share key.
fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Seals `plaintext` (typically a serialized [`crate::model::ExtendedConnection`])
/// behind a freshly generated random key, returning `(envelope_json, detached_key)`.
/// The key is base64url (no padding), 43 characters, and must be carried to the
/// recipient over a channel separate from the envelope itself (spec §4.A/§6).
pub fn encrypt_for_sharing(plaintext: &[u8], now: OffsetDateTime) -> Result<(String, String), VaultError> {
    let key = generate_key();
    let envelope = encrypt_with_key(plaintext, &key, now)?;
    Ok((envelope, URL_SAFE_NO_PAD.encode(key)))
}

/// Seals `plaintext` behind a caller-supplied 32-byte key rather than generating one,
/// for callers who manage their own key material (e.g. re-sharing under a
/// previously-issued share key instead of minting a new one).
pub fn encrypt_for_sharing_with_key(plaintext: &[u8], key: &[u8; KEY_LEN], now: OffsetDateTime) -> Result<String, VaultError> {
    encrypt_with_key(plaintext, key, now)
}

fn encrypt_with_key(plaintext: &[u8], key: &[u8; KEY_LEN], now: OffsetDateTime) -> Result<String, VaultError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::DecryptFailed(format!("failed to seal share bundle: {e}")))?;

    let ts = now
        .to_offset(time::UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|e| VaultError::DecryptFailed(format!("failed to format timestamp: {e}")))?;

    let envelope = Envelope {
        v: ENVELOPE_VERSION,
        app: "mongopal".to_string(),
        ts,
        nonce: URL_SAFE_NO_PAD.encode(nonce_bytes),
        data: URL_SAFE_NO_PAD.encode(ciphertext),
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Opens a bundle produced by [`encrypt_for_sharing`] using its detached base64url
/// key. Rejects envelopes from a newer format version outright rather than guessing
/// at forward compatibility. A malformed key string is reported distinctly from a
/// malformed envelope or a wrong-but-well-formed key (spec §4.A).
pub fn decrypt_from_sharing(envelope_json: &str, key: &str) -> Result<Vec<u8>, VaultError> {
    let envelope: Envelope = serde_json::from_str(envelope_json)?;
    if envelope.v != ENVELOPE_VERSION {
        return Err(VaultError::DecryptFailed(format!(
            "unsupported share bundle version {}",
            envelope.v
        )));
    }
    if envelope.app != "mongopal" {
        return Err(VaultError::DecryptFailed("not a mongopal share bundle".to_string()));
    }

    let key_bytes = URL_SAFE_NO_PAD
        .decode(key)
        .map_err(|e| VaultError::InvalidShareKey(format!("malformed share key: {e}")))?;
    let key: [u8; KEY_LEN] = key_bytes
        .try_into()
        .map_err(|_| VaultError::InvalidShareKey("share key has the wrong length".to_string()))?;

    let nonce_bytes = URL_SAFE_NO_PAD
        .decode(&envelope.nonce)
        .map_err(|e| VaultError::DecryptFailed(format!("malformed nonce: {e}")))?;
    let ciphertext = URL_SAFE_NO_PAD
        .decode(&envelope.data)
        .map_err(|e| VaultError::DecryptFailed(format!("malformed ciphertext: {e}")))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        .map_err(|_| VaultError::DecryptFailed("wrong key or corrupted bundle".to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_time() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn round_trips_with_the_detached_key() {
        let (bundle, key) = encrypt_for_sharing(b"{\"mongoPassword\":\"hunter2\"}", sample_time()).unwrap();
        let out = decrypt_from_sharing(&bundle, &key).unwrap();
        assert_eq!(out, b"{\"mongoPassword\":\"hunter2\"}");
    }

    #[test]
    fn detached_key_is_43_char_base64url() {
        let (_, key) = encrypt_for_sharing(b"secret payload", sample_time()).unwrap();
        assert_eq!(key.len(), 43);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn envelope_carries_an_rfc3339_timestamp() {
        let (bundle, _) = encrypt_for_sharing(b"secret payload", sample_time()).unwrap();
        let envelope: Envelope = serde_json::from_str(&bundle).unwrap();
        assert_eq!(envelope.ts, "2023-11-14T22:13:20Z");
    }

    #[test]
    fn rejects_wrong_key() {
        let (bundle, _) = encrypt_for_sharing(b"secret payload", sample_time()).unwrap();
        let (_, other_key) = encrypt_for_sharing(b"other payload", sample_time()).unwrap();
        assert!(matches!(decrypt_from_sharing(&bundle, &other_key), Err(VaultError::DecryptFailed(_))));
    }

    #[test]
    fn rejects_malformed_key_distinctly() {
        let (bundle, _) = encrypt_for_sharing(b"secret payload", sample_time()).unwrap();
        assert!(matches!(
            decrypt_from_sharing(&bundle, "not valid base64url!!"),
            Err(VaultError::InvalidShareKey(_))
        ));
    }

    #[test]
    fn rejects_tampered_envelope_version() {
        let (bundle, key) = encrypt_for_sharing(b"secret payload", sample_time()).unwrap();
        let mut envelope: Envelope = serde_json::from_str(&bundle).unwrap();
        envelope.v = 2;
        let tampered = serde_json::to_string(&envelope).unwrap();
        assert!(matches!(
            decrypt_from_sharing(&tampered, &key),
            Err(VaultError::DecryptFailed(_))
        ));
    }

    #[test]
    fn rejects_foreign_app_envelope() {
        let (bundle, key) = encrypt_for_sharing(b"secret payload", sample_time()).unwrap();
        let mut envelope: Envelope = serde_json::from_str(&bundle).unwrap();
        envelope.app = "other-app".to_string();
        let tampered = serde_json::to_string(&envelope).unwrap();
        assert!(matches!(
            decrypt_from_sharing(&tampered, &key),
            Err(VaultError::DecryptFailed(_))
        ));
    }
}
