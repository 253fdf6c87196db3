use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use super::encryption::FieldCipher;
use super::CryptoError;

pub const PBKDF2_ITERATIONS: u32 = 600_000;
pub const KEY_LENGTH: usize = 32; // AES-256
/// Shortest passphrase salt accepted for key derivation.
pub const MIN_SALT_LENGTH: usize = 16;
/// Hex characters of the key fingerprint carried in every ciphertext token.
pub const KEY_ID_LENGTH: usize = 16;

/// Process-wide record encryption key. Zeroed on drop.
///
/// Constructed once at startup and handed to the service; nothing reads key
/// material from ambient state.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct RecordKey {
    key_bytes: [u8; KEY_LENGTH],
    key_id: String,
}

impl RecordKey {
    pub fn from_bytes(key_bytes: [u8; KEY_LENGTH]) -> Self {
        let key_id = fingerprint(&key_bytes);
        Self { key_bytes, key_id }
    }

    /// Derive from passphrase + salt using PBKDF2-SHA256.
    pub fn derive(passphrase: &str, salt: &[u8]) -> Self {
        Self::derive_with_iterations(passphrase, salt, PBKDF2_ITERATIONS)
    }

    pub(crate) fn derive_with_iterations(passphrase: &str, salt: &[u8], iterations: u32) -> Self {
        let mut key_bytes = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut key_bytes);
        Self::from_bytes(key_bytes)
    }

    /// Decode a base64 key (standard alphabet) of exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let mut decoded = BASE64
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidKey("not valid base64".into()))?;
        if decoded.len() != KEY_LENGTH {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidKey(format!(
                "expected {KEY_LENGTH} bytes, got {len}"
            )));
        }
        let mut key_bytes = [0u8; KEY_LENGTH];
        key_bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self::from_bytes(key_bytes))
    }

    /// Generate a fresh random key.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key_bytes = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key_bytes);
        Self::from_bytes(key_bytes)
    }

    /// Short public fingerprint of the key, used to detect rotation per field.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub(crate) fn cipher(&self) -> FieldCipher<'_> {
        FieldCipher::new(&self.key_bytes, &self.key_id)
    }
}

impl std::fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordKey").field("key_id", &self.key_id).finish_non_exhaustive()
    }
}

fn fingerprint(key_bytes: &[u8; KEY_LENGTH]) -> String {
    let digest = Sha256::new()
        .chain_update(b"symptom-intake/key-id")
        .chain_update(key_bytes)
        .finalize();
    let mut hex = String::with_capacity(KEY_ID_LENGTH);
    for byte in digest.iter().take(KEY_ID_LENGTH / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_produces_deterministic_key() {
        let salt = [42u8; MIN_SALT_LENGTH];
        let key1 = RecordKey::derive_with_iterations("passphrase", &salt, 1_000);
        let key2 = RecordKey::derive_with_iterations("passphrase", &salt, 1_000);
        assert_eq!(key1.key_bytes, key2.key_bytes);
        assert_eq!(key1.key_id(), key2.key_id());
    }

    #[test]
    fn different_passphrases_produce_different_ids() {
        let salt = [42u8; MIN_SALT_LENGTH];
        let key1 = RecordKey::derive_with_iterations("one", &salt, 1_000);
        let key2 = RecordKey::derive_with_iterations("two", &salt, 1_000);
        assert_ne!(key1.key_id(), key2.key_id());
    }

    #[test]
    fn key_id_is_short_hex() {
        let key = RecordKey::from_bytes([7u8; KEY_LENGTH]);
        assert_eq!(key.key_id().len(), KEY_ID_LENGTH);
        assert!(key.key_id().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn base64_key_round_trip() {
        let encoded = BASE64.encode([9u8; KEY_LENGTH]);
        let key = RecordKey::from_base64(&encoded).unwrap();
        assert_eq!(key.key_id(), RecordKey::from_bytes([9u8; KEY_LENGTH]).key_id());
    }

    #[test]
    fn base64_key_wrong_length_rejected() {
        let encoded = BASE64.encode([9u8; 16]);
        assert!(matches!(
            RecordKey::from_base64(&encoded),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(RecordKey::from_base64("%%%").is_err());
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(RecordKey::generate().key_id(), RecordKey::generate().key_id());
    }

    #[test]
    fn debug_does_not_leak_key_bytes() {
        let key = RecordKey::from_bytes([1u8; KEY_LENGTH]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains(key.key_id()));
        assert!(!rendered.contains("key_bytes"));
    }
}
