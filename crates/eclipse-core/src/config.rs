use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EclipseError, EclipseResult};
use crate::policy::{ConflictPolicy, ImportStrategy, SearchEnginePolicy, SpaceNamePolicy};
use crate::section::SectionSet;

/// Top-level configuration (loaded from eclipse.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EclipseConfig {
    pub log: LogConfig,
    pub store: StoreConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub merge: MergeConfig,
}

impl EclipseConfig {
    /// Load from a TOML file, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> EclipseResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| EclipseError::Config(format!("parsing {}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding entries.json, wallpapers.json and sticker-assets.json
    pub data_dir: PathBuf,
}

/// WebDAV backup target. The password is never stored here; it is read from
/// the environment variable named by `password_env`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// WebDAV endpoint (e.g. https://dav.example.com/remote.php/webdav)
    pub endpoint: String,
    /// WebDAV username
    pub username: Option<String>,
    /// Environment variable holding the WebDAV password
    pub password_env: String,
    /// Root directory on the WebDAV server
    pub root: String,
    /// Name of the sync file under `root`
    pub file_name: String,
    /// Refuse plaintext http:// endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Encrypt the cloud envelope before upload
    pub encrypt: bool,
    /// Environment variable holding the backup password
    pub password_env: String,
    /// merge or overwrite
    pub strategy: ImportStrategy,
    /// Sections a pull is allowed to touch
    pub import_scope: SectionSet,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub space_name: SpaceNamePolicy,
    pub search_engine: SearchEnginePolicy,
}

impl MergeConfig {
    pub fn policy(&self) -> ConflictPolicy {
        ConflictPolicy {
            space_name: self.space_name,
            search_engine: self.search_engine,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.local/share/eclipse"),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/webdav".into(),
            username: None,
            password_env: "ECLIPSE_WEBDAV_PASSWORD".into(),
            root: "/eclipse".into(),
            file_name: "eclipse-sync.json".into(),
            enforce_tls: false,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            encrypt: false,
            password_env: "ECLIPSE_BACKUP_PASSWORD".into(),
            strategy: ImportStrategy::Merge,
            import_scope: SectionSet::ALL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[log]
level = "debug"
format = "json"

[store]
data_dir = "/var/lib/eclipse"

[remote]
endpoint = "https://dav.example.com/webdav"
username = "alice"
root = "/backups"
file_name = "tab.json"
enforce_tls = true

[sync]
encrypt = true
strategy = "overwrite"
import_scope = { space = true, zen_shelf = false, config = true }

[merge]
space_name = "keep_local"
search_engine = "keep_remote"
"#;
        let config: EclipseConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.store.data_dir, PathBuf::from("/var/lib/eclipse"));
        assert_eq!(config.remote.username.as_deref(), Some("alice"));
        assert!(config.remote.enforce_tls);
        assert!(config.sync.encrypt);
        assert_eq!(config.sync.strategy, ImportStrategy::Overwrite);
        assert!(!config.sync.import_scope.zen_shelf);
        assert_eq!(config.merge.space_name, SpaceNamePolicy::KeepLocal);
        assert_eq!(config.merge.search_engine, SearchEnginePolicy::KeepRemote);
    }

    #[test]
    fn test_parse_defaults() {
        let config: EclipseConfig = toml::from_str("").unwrap();

        assert_eq!(config.log.level, "info");
        assert_eq!(config.remote.file_name, "eclipse-sync.json");
        assert!(!config.sync.encrypt);
        assert_eq!(config.sync.import_scope, SectionSet::ALL);
        assert_eq!(config.sync.strategy, ImportStrategy::Merge);
        assert_eq!(config.merge.policy(), ConflictPolicy::default());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = EclipseConfig::load(Path::new("/nonexistent/eclipse.toml")).unwrap();
        assert_eq!(config.sync.password_env, "ECLIPSE_BACKUP_PASSWORD");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = EclipseConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: EclipseConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.remote.endpoint, parsed.remote.endpoint);
        assert_eq!(config.sync.import_scope, parsed.sync.import_scope);
    }
}
