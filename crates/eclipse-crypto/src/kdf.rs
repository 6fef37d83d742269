//! Key derivation: PBKDF2-HMAC-SHA256 password → AES-256 key

use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// A 256-bit key derived from a backup password.
///
/// Derived fresh for every encrypt/decrypt call and zeroized on drop.
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

pub fn derive_key(password: &SecretString, salt: &[u8], iterations: u32) -> DerivedKey {
    let mut bytes = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(password.expose_secret().as_bytes(), salt, iterations, &mut bytes);
    DerivedKey { bytes }
}
