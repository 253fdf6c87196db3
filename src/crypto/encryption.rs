use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64;
use base64::Engine;
use subtle::ConstantTimeEq;

use super::keys::KEY_LENGTH;
use super::CryptoError;

const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// Prefix and version of every ciphertext token: `enc:v1:<key_id>:<payload>`.
pub const TOKEN_PREFIX: &str = "enc";
pub const TOKEN_VERSION: &str = "v1";

/// Encrypted field: nonce + ciphertext (includes AES-GCM auth tag)
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_LENGTH],
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Serialize to bytes: [12-byte nonce][ciphertext...]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(NONCE_LENGTH + self.ciphertext.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    /// Deserialize from bytes: [12-byte nonce][ciphertext...]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(CryptoError::MalformedToken("payload too short".into()));
        }

        let mut nonce = [0u8; NONCE_LENGTH];
        nonce.copy_from_slice(&bytes[..NONCE_LENGTH]);
        let ciphertext = bytes[NONCE_LENGTH..].to_vec();

        Ok(Self { nonce, ciphertext })
    }
}

/// A parsed `enc:v1:<key_id>:<payload>` token.
#[derive(Debug, Clone, PartialEq)]
pub struct CipherToken {
    pub version: String,
    pub key_id: String,
    pub data: EncryptedData,
}

impl CipherToken {
    pub fn encode(&self) -> String {
        format!(
            "{TOKEN_PREFIX}:{}:{}:{}",
            self.version,
            self.key_id,
            BASE64.encode(self.data.to_bytes())
        )
    }

    pub fn parse(token: &str) -> Result<Self, CryptoError> {
        let mut parts = token.splitn(4, ':');
        let (Some(prefix), Some(version), Some(key_id), Some(payload)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CryptoError::MalformedToken("expected four segments".into()));
        };
        if prefix != TOKEN_PREFIX {
            return Err(CryptoError::MalformedToken("missing token prefix".into()));
        }
        if version != TOKEN_VERSION {
            return Err(CryptoError::UnsupportedVersion(version.to_string()));
        }
        let bytes = BASE64
            .decode(payload)
            .map_err(|_| CryptoError::MalformedToken("payload is not base64".into()))?;
        Ok(Self {
            version: version.to_string(),
            key_id: key_id.to_string(),
            data: EncryptedData::from_bytes(&bytes)?,
        })
    }
}

/// AES-256-GCM over single string fields, bound to the field name as AAD.
pub struct FieldCipher<'a> {
    key_bytes: &'a [u8; KEY_LENGTH],
    key_id: &'a str,
}

impl<'a> FieldCipher<'a> {
    pub(crate) fn new(key_bytes: &'a [u8; KEY_LENGTH], key_id: &'a str) -> Self {
        Self { key_bytes, key_id }
    }

    /// Encrypt plaintext with a random nonce and return the token text.
    pub fn encrypt_field(&self, field: &str, plaintext: &str) -> Result<String, CryptoError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key_bytes));

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: field.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(CipherToken {
            version: TOKEN_VERSION.to_string(),
            key_id: self.key_id.to_string(),
            data: EncryptedData {
                nonce: nonce_bytes,
                ciphertext,
            },
        }
        .encode())
    }

    /// Decrypt a token. Fails on foreign key id, tampering, or non-UTF-8 output.
    pub fn decrypt_field(&self, field: &str, token: &str) -> Result<String, CryptoError> {
        let parsed = CipherToken::parse(token)?;
        let same_key: bool = parsed.key_id.as_bytes().ct_eq(self.key_id.as_bytes()).into();
        if !same_key {
            return Err(CryptoError::KeyMismatch {
                expected: self.key_id.to_string(),
                found: parsed.key_id,
            });
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key_bytes));
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&parsed.data.nonce),
                Payload {
                    msg: parsed.data.ciphertext.as_ref(),
                    aad: field.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::RecordKey;

    fn test_key() -> RecordKey {
        RecordKey::from_bytes([3u8; KEY_LENGTH])
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = test_key();
        let token = key.cipher().encrypt_field("severity", "severe").unwrap();
        assert!(token.starts_with("enc:v1:"));
        assert!(!token.contains("severe"));
        assert_eq!(key.cipher().decrypt_field("severity", &token).unwrap(), "severe");
    }

    #[test]
    fn decrypt_with_wrong_key_reports_mismatch() {
        let token = test_key().cipher().encrypt_field("severity", "secret").unwrap();
        let other = RecordKey::from_bytes([4u8; KEY_LENGTH]);
        let result = other.cipher().decrypt_field("severity", &token);
        assert!(matches!(result, Err(CryptoError::KeyMismatch { .. })));
    }

    #[test]
    fn tampered_ciphertext_detected() {
        let key = test_key();
        let token = key.cipher().encrypt_field("duration", "three days").unwrap();
        let mut parsed = CipherToken::parse(&token).unwrap();
        parsed.data.ciphertext[0] ^= 0xFF;
        let result = key.cipher().decrypt_field("duration", &parsed.encode());
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn token_moved_to_another_field_fails() {
        let key = test_key();
        let token = key.cipher().encrypt_field("duration", "three days").unwrap();
        assert!(key.cipher().decrypt_field("triggers", &token).is_err());
    }

    #[test]
    fn different_encryptions_produce_different_tokens() {
        let key = test_key();
        let t1 = key.cipher().encrypt_field("f", "same data").unwrap();
        let t2 = key.cipher().encrypt_field("f", "same data").unwrap();
        assert_ne!(t1, t2);
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let key = test_key();
        let token = key.cipher().encrypt_field("f", "").unwrap();
        assert_eq!(key.cipher().decrypt_field("f", &token).unwrap(), "");
    }

    #[test]
    fn malformed_tokens_rejected() {
        let key = test_key();
        for bad in ["", "plain text", "enc:v1:abc", "enc:v1:abc:!!!", "enc:v1:abc:AAAA"] {
            assert!(
                matches!(
                    key.cipher().decrypt_field("f", bad),
                    Err(CryptoError::MalformedToken(_))
                ),
                "expected malformed for {bad:?}"
            );
        }
    }

    #[test]
    fn unknown_version_rejected() {
        let key = test_key();
        let token = key.cipher().encrypt_field("f", "x").unwrap().replacen(":v1:", ":v9:", 1);
        assert!(matches!(
            key.cipher().decrypt_field("f", &token),
            Err(CryptoError::UnsupportedVersion(v)) if v == "v9"
        ));
    }

    #[test]
    fn from_bytes_rejects_too_short() {
        assert!(EncryptedData::from_bytes(&[0u8; 10]).is_err());
    }
}
