pub mod encryption;
pub mod keys;
pub mod record;

pub use encryption::*;
pub use keys::*;
pub use record::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: wrong key or corrupted data")]
    DecryptionFailed,

    #[error("Ciphertext was produced with key {found}, expected {expected}")]
    KeyMismatch { expected: String, found: String },

    #[error("Malformed ciphertext token: {0}")]
    MalformedToken(String),

    #[error("Unsupported ciphertext token version: {0}")]
    UnsupportedVersion(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Record serialization failed: {0}")]
    Serialization(String),
}
