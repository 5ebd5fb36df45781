//! AES-256-CBC with OpenSSL salted container and MD5 key derivation

use crate::{AddressCipher, CipherError, SharedSecret};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use md5::{Digest, Md5};
use rand::RngCore;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const SALT_HEADER: &[u8; 8] = b"Salted__";
const SALT_LEN: usize = 8;
const HEADER_LEN: usize = SALT_HEADER.len() + SALT_LEN;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// `EVP_BytesToKey` with MD5 and a single iteration
fn derive_key_iv(passphrase: &[u8], salt: &[u8]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let mut material = Vec::with_capacity(KEY_LEN + IV_LEN + 16);
    let mut digest: Vec<u8> = Vec::new();

    while material.len() < KEY_LEN + IV_LEN {
        let mut hasher = Md5::new();
        hasher.update(&digest);
        hasher.update(passphrase);
        hasher.update(salt);
        digest = hasher.finalize().to_vec();
        material.extend_from_slice(&digest);
    }

    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&material[..KEY_LEN]);
    iv.copy_from_slice(&material[KEY_LEN..KEY_LEN + IV_LEN]);
    (key, iv)
}

fn encrypt_with_salt(secret: &SharedSecret, salt: &[u8; SALT_LEN], plaintext: &[u8]) -> Vec<u8> {
    let (key, iv) = derive_key_iv(secret.as_bytes(), salt);
    let body = Aes256CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(SALT_HEADER);
    out.extend_from_slice(salt);
    out.extend_from_slice(&body);
    out
}

/// Encrypt `plaintext` under a fresh random salt
pub fn encrypt(secret: &SharedSecret, plaintext: &[u8]) -> Vec<u8> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    encrypt_with_salt(secret, &salt, plaintext)
}

/// Encrypt and base64-encode, ready to be sent as a text frame line
pub fn encrypt_base64(secret: &SharedSecret, plaintext: &[u8]) -> String {
    BASE64.encode(encrypt(secret, plaintext))
}

/// Decrypt a salted ciphertext
pub fn decrypt(secret: &SharedSecret, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
    if ciphertext.len() < HEADER_LEN || &ciphertext[..SALT_HEADER.len()] != SALT_HEADER {
        return Err(CipherError::MissingSaltHeader);
    }

    let salt = &ciphertext[SALT_HEADER.len()..HEADER_LEN];
    let body = &ciphertext[HEADER_LEN..];
    if body.is_empty() || body.len() % BLOCK_LEN != 0 {
        return Err(CipherError::InvalidLength(body.len()));
    }

    let (key, iv) = derive_key_iv(secret.as_bytes(), salt);
    Aes256CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(body)
        .map_err(|_| CipherError::BadPadding)
}

/// Decode a base64 line and decrypt it
pub fn decrypt_base64(secret: &SharedSecret, encoded: &[u8]) -> Result<Vec<u8>, CipherError> {
    let raw = BASE64.decode(trim_line_ending(encoded))?;
    decrypt(secret, &raw)
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// [`AddressCipher`] bound to one shared secret
#[derive(Debug, Clone)]
pub struct Aes256CbcCipher {
    secret: SharedSecret,
}

impl Aes256CbcCipher {
    pub fn new(secret: SharedSecret) -> Self {
        Self { secret }
    }
}

impl AddressCipher for Aes256CbcCipher {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        decrypt(&self.secret, ciphertext)
    }

    fn decrypt_base64(&self, encoded: &[u8]) -> Result<Vec<u8>, CipherError> {
        decrypt_base64(&self.secret, encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Produced by: openssl enc -aes-256-cbc -md md5 -S 0102030405060708 -pass pass:gateway-secret
    const OPENSSL_VECTOR: &str = "U2FsdGVkX18BAgMEBQYHCCvPDI1uPIThCyMsxch9UlM=";

    fn secret() -> SharedSecret {
        SharedSecret::new("gateway-secret").unwrap()
    }

    #[test]
    fn test_decrypts_openssl_output() {
        let plain = decrypt_base64(&secret(), OPENSSL_VECTOR.as_bytes()).unwrap();
        assert_eq!(plain, b"127.0.0.1:8080");
    }

    #[test]
    fn test_encrypt_matches_openssl_with_fixed_salt() {
        let salt = [1, 2, 3, 4, 5, 6, 7, 8];
        let ciphertext = encrypt_with_salt(&secret(), &salt, b"127.0.0.1:8080");
        assert_eq!(BASE64.encode(ciphertext), OPENSSL_VECTOR);
    }

    #[test]
    fn test_line_ending_is_ignored() {
        let line = format!("{}\r\n", OPENSSL_VECTOR);
        let plain = decrypt_base64(&secret(), line.as_bytes()).unwrap();
        assert_eq!(plain, b"127.0.0.1:8080");
    }

    #[test]
    fn test_random_salt_differs_per_call() {
        let a = encrypt(&secret(), b"10.0.0.1:22");
        let b = encrypt(&secret(), b"10.0.0.1:22");
        assert_ne!(a, b);
        assert_eq!(decrypt(&secret(), &a).unwrap(), decrypt(&secret(), &b).unwrap());
    }

    #[test]
    fn test_wrong_secret_fails() {
        let other = SharedSecret::new("not-the-secret").unwrap();
        let err = decrypt_base64(&other, OPENSSL_VECTOR.as_bytes()).unwrap_err();
        assert!(matches!(err, CipherError::BadPadding));
    }

    #[test]
    fn test_missing_header() {
        let err = decrypt(&secret(), b"not salted at all").unwrap_err();
        assert!(matches!(err, CipherError::MissingSaltHeader));
    }

    #[test]
    fn test_truncated_body() {
        let mut ciphertext = encrypt(&secret(), b"host:1");
        ciphertext.truncate(HEADER_LEN + 5);
        let err = decrypt(&secret(), &ciphertext).unwrap_err();
        assert!(matches!(err, CipherError::InvalidLength(5)));
    }

    #[test]
    fn test_invalid_base64() {
        let err = decrypt_base64(&secret(), b"!!!not base64!!!\n").unwrap_err();
        assert!(matches!(err, CipherError::Base64(_)));
    }

    #[test]
    fn test_cipher_trait_object() {
        let cipher: Box<dyn AddressCipher> = Box::new(Aes256CbcCipher::new(secret()));
        let raw = encrypt(&secret(), b"backend.internal:9000");
        assert_eq!(cipher.decrypt(&raw).unwrap(), b"backend.internal:9000");
    }
}
