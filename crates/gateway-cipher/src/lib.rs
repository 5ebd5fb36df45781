//! Address Cipher
//!
//! Decrypts the destination address a client embeds in its handshake.
//! Ciphertexts use the OpenSSL `enc -aes-256-cbc -md md5` container:
//!
//! ```text
//! "Salted__" | 8-byte salt | AES-256-CBC(PKCS#7) body
//! ```
//!
//! Key and IV are derived from the shared secret and the salt with
//! `EVP_BytesToKey` (MD5, single iteration), so any OpenSSL-compatible
//! client library can produce routable handshakes.

mod aes256cbc;
mod secret;

pub use aes256cbc::{decrypt, decrypt_base64, encrypt, encrypt_base64, Aes256CbcCipher};
pub use secret::SharedSecret;

use thiserror::Error;

/// Address cipher errors
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Shared secret must not be empty")]
    EmptySecret,

    #[error("Ciphertext is missing the salt header")]
    MissingSaltHeader,

    #[error("Invalid ciphertext length: {0} bytes")]
    InvalidLength(usize),

    #[error("Invalid padding")]
    BadPadding,

    #[error("Base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Decryption service consumed by the handshake decoder.
///
/// Implementations own their secret; callers only hand over ciphertext.
pub trait AddressCipher: Send + Sync {
    /// Decrypt a raw ciphertext (binary frame payload)
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Decode a base64 line and decrypt it (text frame payload).
    /// A trailing `\n` or `\r\n` is ignored.
    fn decrypt_base64(&self, encoded: &[u8]) -> Result<Vec<u8>, CipherError>;
}
