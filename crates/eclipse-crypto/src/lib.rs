//! eclipse-crypto: password-based encryption of exported backups
//!
//! Scheme:
//! ```text
//! password + salt(16, random) ──PBKDF2-HMAC-SHA256 × 120000──▶ key(32)
//! key + iv(12, random) ──AES-256-GCM──▶ ciphertext || tag(16)
//! ```
//! Salt, IV and ciphertext travel base64url (unpadded) in an
//! [`EncryptedPayload`]. Keys are never cached between calls.

pub mod envelope;
pub mod kdf;

pub use envelope::{decrypt, encrypt, encrypt_at, looks_encrypted, EncryptedPayload};
pub use kdf::{derive_key, DerivedKey};

/// Size of the derived AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// PBKDF2 salt length
pub const SALT_SIZE: usize = 16;

/// AES-GCM nonce length (96-bit)
pub const IV_SIZE: usize = 12;

/// The only PBKDF2 iteration count accepted on decrypt
pub const ITERATIONS: u32 = 120_000;

pub const ENVELOPE_VERSION: u32 = 1;
pub const ALGORITHM: &str = "AES-GCM";
pub const KDF: &str = "PBKDF2-SHA256";
