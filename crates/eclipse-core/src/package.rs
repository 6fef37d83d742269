//! BackupPackage: the canonical snapshot unit.
//!
//! JSON shape:
//! ```text
//! { "type": "eclipse-full-backup" | "eclipse-space-snapshot",
//!   "exportVersion": "1.0.0",
//!   "createdAt": <ms>,
//!   "localStorageEntries": { "<key>": "<string>" | null, ... },
//!   "assets": { "wallpapers": [...], "stickerAssets": [...] } }
//! ```
//! Binary asset fields are embedded as `data:` URLs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{EclipseError, EclipseResult};

/// The only export version this implementation reads or writes.
pub const FORMAT_VERSION: &str = "1.0.0";

/// Key → optional raw value. `None` means "not present / delete".
pub type Entries = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageKind {
    #[serde(rename = "eclipse-full-backup")]
    FullBackup,
    #[serde(rename = "eclipse-space-snapshot")]
    SpaceSnapshot,
}

impl PackageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageKind::FullBackup => "eclipse-full-backup",
            PackageKind::SpaceSnapshot => "eclipse-space-snapshot",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "eclipse-full-backup" => Some(PackageKind::FullBackup),
            "eclipse-space-snapshot" => Some(PackageKind::SpaceSnapshot),
            _ => None,
        }
    }

    /// Name of the JSON document inside a `.zip` backup.
    pub fn container_file_name(&self) -> &'static str {
        match self {
            PackageKind::FullBackup => "backup.json",
            PackageKind::SpaceSnapshot => "snapshot.json",
        }
    }
}

/// Binary payload carried inside the JSON document as a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Blob {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    /// Parse `data:<mime>[;base64],<payload>`. Non-base64 payloads are taken
    /// as raw text bytes.
    pub fn from_data_url(url: &str) -> Result<Self, String> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| "missing data: prefix".to_string())?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| "missing ',' separator".to_string())?;

        let (mime, is_base64) = match meta.strip_suffix(";base64") {
            Some(mime) => (mime, true),
            None => (meta, false),
        };
        let mime = if mime.is_empty() {
            "application/octet-stream"
        } else {
            mime
        };

        let bytes = if is_base64 {
            STANDARD
                .decode(payload.trim())
                .map_err(|e| format!("invalid base64 payload: {e}"))?
        } else {
            payload.as_bytes().to_vec()
        };

        Ok(Self::new(mime, bytes))
    }
}

impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

impl<'de> Deserialize<'de> for Blob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let url = String::deserialize(deserializer)?;
        Blob::from_data_url(&url).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WallpaperAsset {
    pub id: String,
    #[serde(default)]
    pub created_at: i64,
    pub data: Blob,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Blob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerAsset {
    pub id: String,
    #[serde(default)]
    pub created_at: i64,
    pub data: Blob,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageAssets {
    #[serde(default)]
    pub wallpapers: Vec<WallpaperAsset>,
    #[serde(default)]
    pub sticker_assets: Vec<StickerAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupPackage {
    #[serde(rename = "type")]
    pub kind: PackageKind,
    #[serde(rename = "exportVersion")]
    pub format_version: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "localStorageEntries")]
    pub entries: Entries,
    pub assets: PackageAssets,
}

impl<'de> Deserialize<'de> for BackupPackage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        BackupPackage::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl BackupPackage {
    pub fn new(kind: PackageKind, created_at: i64) -> Self {
        Self {
            kind,
            format_version: FORMAT_VERSION.to_string(),
            created_at,
            entries: Entries::new(),
            assets: PackageAssets::default(),
        }
    }

    /// Raw value of an entry, if present.
    pub fn entry(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|v| v.as_deref())
    }

    pub fn set_entry(&mut self, key: &str, value: Option<String>) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn to_value(&self) -> EclipseResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json(&self) -> EclipseResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> EclipseResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> EclipseResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| EclipseError::InvalidPackageStructure(format!("not JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Validate and parse a JSON value.
    ///
    /// Structural problems map to `InvalidPackageStructure`; a version other
    /// than [`FORMAT_VERSION`] is always `UnsupportedFormatVersion`.
    pub fn from_value(value: Value) -> EclipseResult<Self> {
        let Value::Object(mut obj) = value else {
            return Err(EclipseError::InvalidPackageStructure(
                "package is not a JSON object".into(),
            ));
        };

        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .and_then(PackageKind::from_tag)
            .ok_or_else(|| {
                EclipseError::InvalidPackageStructure("missing or unknown package type".into())
            })?;

        let version = obj
            .get("exportVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| EclipseError::InvalidPackageStructure("missing exportVersion".into()))?;
        if version != FORMAT_VERSION {
            return Err(EclipseError::UnsupportedFormatVersion {
                found: version.to_string(),
                expected: FORMAT_VERSION.to_string(),
            });
        }

        let created_at = obj.get("createdAt").and_then(Value::as_i64).unwrap_or(0);

        let entries = match obj.remove("localStorageEntries") {
            Some(Value::Object(map)) => map
                .into_iter()
                .map(|(key, value)| (key, entry_value(value)))
                .collect(),
            _ => {
                return Err(EclipseError::InvalidPackageStructure(
                    "localStorageEntries must be an object".into(),
                ))
            }
        };

        let assets = match obj.remove("assets") {
            None | Some(Value::Null) => PackageAssets::default(),
            Some(raw) => serde_json::from_value(raw)
                .map_err(|e| EclipseError::InvalidPackageStructure(format!("assets: {e}")))?,
        };

        Ok(Self {
            kind,
            format_version: FORMAT_VERSION.to_string(),
            created_at,
            entries,
            assets,
        })
    }
}

/// Entry values are strings; anything else is kept as its JSON text.
fn entry_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> BackupPackage {
        let mut pkg = BackupPackage::new(PackageKind::FullBackup, 1_700_000_000_000);
        pkg.set_entry(crate::keys::LANGUAGE, Some("en".into()));
        pkg.set_entry(crate::keys::APP_CONFIG, None);
        pkg.assets.wallpapers.push(WallpaperAsset {
            id: "wp-1".into(),
            created_at: 5,
            data: Blob::new("image/webp", vec![1, 2, 3]),
            thumbnail: Some(Blob::new("image/webp", vec![9])),
        });
        pkg
    }

    #[test]
    fn test_json_shape() {
        let value = sample().to_value().unwrap();
        assert_eq!(value["type"], "eclipse-full-backup");
        assert_eq!(value["exportVersion"], "1.0.0");
        assert_eq!(value["localStorageEntries"]["eclipse-language"], "en");
        assert!(value["localStorageEntries"]["eclipse-config"].is_null());
        assert_eq!(value["assets"]["wallpapers"][0]["data"], "data:image/webp;base64,AQID");
        assert!(value["assets"]["stickerAssets"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_json_roundtrip() {
        let pkg = sample();
        let parsed = BackupPackage::from_json(&pkg.to_json().unwrap()).unwrap();
        assert_eq!(parsed, pkg);
    }

    #[test]
    fn test_version_mismatch_is_fatal() {
        let raw = json!({
            "type": "eclipse-full-backup",
            "exportVersion": "0.9.0",
            "createdAt": 1,
            "localStorageEntries": {}
        });
        match BackupPackage::from_value(raw) {
            Err(EclipseError::UnsupportedFormatVersion { found, .. }) => assert_eq!(found, "0.9.0"),
            other => panic!("expected UnsupportedFormatVersion, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let raw = json!({"type": "other", "exportVersion": "1.0.0", "localStorageEntries": {}});
        assert!(matches!(
            BackupPackage::from_value(raw),
            Err(EclipseError::InvalidPackageStructure(_))
        ));
    }

    #[test]
    fn test_missing_entries_rejected() {
        let raw = json!({"type": "eclipse-full-backup", "exportVersion": "1.0.0"});
        assert!(matches!(
            BackupPackage::from_value(raw),
            Err(EclipseError::InvalidPackageStructure(_))
        ));
    }

    #[test]
    fn test_missing_assets_default_to_empty() {
        let raw = json!({
            "type": "eclipse-space-snapshot",
            "exportVersion": "1.0.0",
            "createdAt": 7,
            "localStorageEntries": {"eclipse-language": "de", "eclipse-config": {"a": 1}}
        });
        let pkg = BackupPackage::from_value(raw).unwrap();
        assert_eq!(pkg.kind, PackageKind::SpaceSnapshot);
        assert_eq!(pkg.entry("eclipse-language"), Some("de"));
        assert_eq!(pkg.entry("eclipse-config"), Some(r#"{"a":1}"#));
        assert!(pkg.assets.wallpapers.is_empty());
    }

    #[test]
    fn test_data_url_parsing() {
        let blob = Blob::from_data_url("data:image/png;base64,AAEC").unwrap();
        assert_eq!(blob.mime, "image/png");
        assert_eq!(blob.bytes, vec![0, 1, 2]);

        let text = Blob::from_data_url("data:,hello").unwrap();
        assert_eq!(text.mime, "application/octet-stream");
        assert_eq!(text.bytes, b"hello");

        assert!(Blob::from_data_url("https://example.com/a.png").is_err());
        assert!(Blob::from_data_url("data:image/png;base64").is_err());
    }
}
