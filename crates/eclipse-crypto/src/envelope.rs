//! Password-encrypted payload envelope.
//!
//! ```text
//! { "version": 1, "algorithm": "AES-GCM", "kdf": "PBKDF2-SHA256",
//!   "iterations": 120000, "salt": b64url, "iv": b64url,
//!   "cipherText": b64url(ciphertext || tag), "createdAt": <ms> }
//! ```

use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use eclipse_core::{EclipseError, EclipseResult};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::kdf::derive_key;
use crate::{ALGORITHM, ENVELOPE_VERSION, ITERATIONS, IV_SIZE, KDF, SALT_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    pub version: u32,
    pub algorithm: String,
    pub kdf: String,
    pub iterations: u32,
    pub salt: String,
    pub iv: String,
    pub cipher_text: String,
    pub created_at: i64,
}

impl EncryptedPayload {
    pub fn to_json(&self) -> EclipseResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and structurally validate. Does not touch the ciphertext.
    pub fn from_json(text: &str) -> EclipseResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| EclipseError::InvalidPackageStructure(format!("encrypted payload: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> EclipseResult<Self> {
        let payload: Self = serde_json::from_value(value)
            .map_err(|e| EclipseError::InvalidPackageStructure(format!("encrypted payload: {e}")))?;
        payload.validate()?;
        Ok(payload)
    }

    fn validate(&self) -> EclipseResult<()> {
        if self.version != ENVELOPE_VERSION {
            return Err(EclipseError::InvalidPackageStructure(format!(
                "unsupported encrypted payload version {}",
                self.version
            )));
        }
        if self.algorithm != ALGORITHM || self.kdf != KDF {
            return Err(EclipseError::InvalidPackageStructure(format!(
                "unsupported cipher suite {}/{}",
                self.algorithm, self.kdf
            )));
        }
        if self.iterations != ITERATIONS {
            return Err(EclipseError::UnsupportedIterationCount {
                found: self.iterations,
                expected: ITERATIONS,
            });
        }
        Ok(())
    }
}

/// Whether `json` is shaped like an [`EncryptedPayload`], without decrypting.
pub fn looks_encrypted(json: &str) -> bool {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(obj)) => {
            ["cipherText", "iv", "salt", "kdf"]
                .iter()
                .all(|k| obj.get(*k).is_some_and(Value::is_string))
        }
        _ => false,
    }
}

pub fn encrypt(plain_text: &str, password: &SecretString) -> EclipseResult<EncryptedPayload> {
    encrypt_at(plain_text, password, chrono::Utc::now().timestamp_millis())
}

pub fn encrypt_at(
    plain_text: &str,
    password: &SecretString,
    created_at: i64,
) -> EclipseResult<EncryptedPayload> {
    if password.expose_secret().is_empty() {
        return Err(EclipseError::PasswordRequired);
    }

    let mut salt = [0u8; SALT_SIZE];
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut iv);

    let key = derive_key(password, &salt, ITERATIONS);
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| EclipseError::InvalidPackageStructure("bad key length".into()))?;
    let cipher_text = cipher
        .encrypt(Nonce::from_slice(&iv), plain_text.as_bytes())
        .map_err(|_| EclipseError::InvalidPackageStructure("encryption failed".into()))?;

    debug!(bytes = plain_text.len(), "encrypted payload");
    Ok(EncryptedPayload {
        version: ENVELOPE_VERSION,
        algorithm: ALGORITHM.to_string(),
        kdf: KDF.to_string(),
        iterations: ITERATIONS,
        salt: URL_SAFE_NO_PAD.encode(salt),
        iv: URL_SAFE_NO_PAD.encode(iv),
        cipher_text: URL_SAFE_NO_PAD.encode(cipher_text),
        created_at,
    })
}

/// Decrypt a payload.
///
/// Structural problems are reported precisely. Everything on the ciphertext
/// path (bad base64, wrong password, tampering, non-UTF-8 output) collapses
/// into `DecryptionFailed`.
pub fn decrypt(payload: &EncryptedPayload, password: &SecretString) -> EclipseResult<String> {
    payload.validate()?;
    if password.expose_secret().is_empty() {
        return Err(EclipseError::PasswordRequired);
    }

    let salt = URL_SAFE_NO_PAD
        .decode(&payload.salt)
        .map_err(|_| EclipseError::DecryptionFailed)?;
    let iv = URL_SAFE_NO_PAD
        .decode(&payload.iv)
        .map_err(|_| EclipseError::DecryptionFailed)?;
    let cipher_text = URL_SAFE_NO_PAD
        .decode(&payload.cipher_text)
        .map_err(|_| EclipseError::DecryptionFailed)?;
    if iv.len() != IV_SIZE {
        return Err(EclipseError::DecryptionFailed);
    }

    let key = derive_key(password, &salt, payload.iterations);
    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| EclipseError::DecryptionFailed)?;
    let plain = cipher
        .decrypt(Nonce::from_slice(&iv), cipher_text.as_ref())
        .map_err(|_| EclipseError::DecryptionFailed)?;

    debug!(bytes = plain.len(), "decrypted payload");
    String::from_utf8(plain).map_err(|_| EclipseError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pw(s: &str) -> SecretString {
        SecretString::from(s)
    }

    #[test]
    fn test_envelope_fields() {
        let payload = encrypt_at("{}", &pw("hunter2"), 42).unwrap();
        assert_eq!(payload.version, 1);
        assert_eq!(payload.algorithm, "AES-GCM");
        assert_eq!(payload.kdf, "PBKDF2-SHA256");
        assert_eq!(payload.iterations, 120_000);
        assert_eq!(payload.created_at, 42);
        assert_eq!(URL_SAFE_NO_PAD.decode(&payload.salt).unwrap().len(), 16);
        assert_eq!(URL_SAFE_NO_PAD.decode(&payload.iv).unwrap().len(), 12);
        // 2 bytes of plaintext + 16-byte tag
        assert_eq!(URL_SAFE_NO_PAD.decode(&payload.cipher_text).unwrap().len(), 18);
        assert!(!payload.cipher_text.contains('='));
    }

    #[test]
    fn test_json_field_names() {
        let payload = encrypt_at("x", &pw("p"), 1).unwrap();
        let json = payload.to_json().unwrap();
        assert!(json.contains("\"cipherText\""));
        assert!(json.contains("\"createdAt\""));
        assert!(looks_encrypted(&json));
        assert_eq!(EncryptedPayload::from_json(&json).unwrap(), payload);
    }

    #[test]
    fn test_empty_password_rejected() {
        assert!(matches!(encrypt("{}", &pw("")), Err(EclipseError::PasswordRequired)));
    }

    #[test]
    fn test_fresh_salt_and_iv() {
        let a = encrypt_at("same", &pw("p"), 0).unwrap();
        let b = encrypt_at("same", &pw("p"), 0).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.cipher_text, b.cipher_text);
    }

    #[test]
    fn test_bad_base64_is_generic_failure() {
        let mut payload = encrypt_at("{}", &pw("p"), 0).unwrap();
        payload.cipher_text = "!!!not base64!!!".into();
        assert!(matches!(decrypt(&payload, &pw("p")), Err(EclipseError::DecryptionFailed)));
    }

    #[test]
    fn test_structural_errors_are_precise() {
        let mut payload = encrypt_at("{}", &pw("p"), 0).unwrap();
        payload.iterations = 100_000;
        assert!(matches!(
            decrypt(&payload, &pw("p")),
            Err(EclipseError::UnsupportedIterationCount { found: 100_000, expected: 120_000 })
        ));

        payload.iterations = 120_000;
        payload.algorithm = "AES-CBC".into();
        assert!(matches!(
            decrypt(&payload, &pw("p")),
            Err(EclipseError::InvalidPackageStructure(_))
        ));

        assert!(matches!(
            EncryptedPayload::from_json(r#"{"version":1,"algorithm":"AES-GCM"}"#),
            Err(EclipseError::InvalidPackageStructure(_))
        ));
    }

    #[test]
    fn test_looks_encrypted_rejects_packages() {
        assert!(!looks_encrypted(r#"{"type":"eclipse-full-backup","localStorageEntries":{}}"#));
        assert!(!looks_encrypted("not json"));
        assert!(!looks_encrypted("[]"));
    }
}
