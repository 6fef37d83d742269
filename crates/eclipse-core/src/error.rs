use thiserror::Error;

pub type EclipseResult<T> = Result<T, EclipseError>;

#[derive(Debug, Error)]
pub enum EclipseError {
    #[error("invalid backup container: {0}")]
    InvalidContainer(String),

    #[error("unsupported container compression method {0} (only store is supported)")]
    UnsupportedCompression(u16),

    #[error("invalid backup package structure: {0}")]
    InvalidPackageStructure(String),

    #[error("unsupported backup format version {found:?} (expected {expected:?})")]
    UnsupportedFormatVersion { found: String, expected: String },

    #[error("a password is required for encrypted backups")]
    PasswordRequired,

    /// Deliberately carries no detail: a wrong password and a corrupted
    /// ciphertext must be indistinguishable to the caller.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("unsupported key derivation iteration count {found} (expected {expected})")]
    UnsupportedIterationCount { found: u32, expected: u32 },

    #[error("no backup found at remote path {0}")]
    RemoteNotFound(String),

    #[error("space not found: {0}")]
    SpaceNotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("import failed ({}): {source}", rollback_note(.rolled_back))]
    ImportFailed {
        #[source]
        source: Box<EclipseError>,
        rolled_back: bool,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn rollback_note(rolled_back: &bool) -> &'static str {
    if *rolled_back {
        "previous state restored"
    } else {
        "rollback also failed"
    }
}

impl EclipseError {
    /// Whether bytes that failed to open as a container should be retried as
    /// raw JSON.
    pub fn is_container_error(&self) -> bool {
        matches!(
            self,
            EclipseError::InvalidContainer(_) | EclipseError::UnsupportedCompression(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_failed_message_reports_rollback() {
        let err = EclipseError::ImportFailed {
            source: Box::new(EclipseError::Persistence("disk full".into())),
            rolled_back: true,
        };
        let msg = err.to_string();
        assert!(msg.contains("previous state restored"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_decryption_failed_has_no_detail() {
        assert_eq!(EclipseError::DecryptionFailed.to_string(), "decryption failed");
    }

    #[test]
    fn test_container_errors_classified() {
        assert!(EclipseError::InvalidContainer("x".into()).is_container_error());
        assert!(EclipseError::UnsupportedCompression(8).is_container_error());
        assert!(!EclipseError::DecryptionFailed.is_container_error());
    }
}
