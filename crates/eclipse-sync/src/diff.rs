//! Section-hash change detection for cloud sync.
//!
//! A [`CloudSyncEnvelope`] carries the backup plus one SHA-256 per section.
//! Hashes cover a canonical JSON projection (object keys sorted, entry values
//! parsed as JSON where possible), so re-serializing a package without
//! changing its content never changes its hashes.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use eclipse_core::package::BackupPackage;
use eclipse_core::section::{Section, SectionSet};
use eclipse_core::{EclipseError, EclipseResult};
use eclipse_crypto::{decrypt, looks_encrypted, EncryptedPayload};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use tracing::debug;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionHashes {
    pub space: String,
    pub zen_shelf: String,
    pub config: String,
}

impl SectionHashes {
    pub fn compute(package: &BackupPackage) -> EclipseResult<Self> {
        Ok(Self {
            space: hash_section(package, Section::Space)?,
            zen_shelf: hash_section(package, Section::ZenShelf)?,
            config: hash_section(package, Section::Config)?,
        })
    }

    pub fn get(&self, section: Section) -> &str {
        match section {
            Section::Space => &self.space,
            Section::ZenShelf => &self.zen_shelf,
            Section::Config => &self.config,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSyncEnvelope {
    pub schema_version: u32,
    pub generated_at: i64,
    pub backup: BackupPackage,
    pub section_hashes: SectionHashes,
}

impl CloudSyncEnvelope {
    pub fn to_json(&self) -> EclipseResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an envelope, or a bare legacy package (wrapped on the fly).
    ///
    /// Hashes are always recomputed from the backup content; recorded hashes
    /// that disagree are only logged.
    pub fn from_json(text: &str) -> EclipseResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| EclipseError::InvalidPackageStructure(format!("not JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> EclipseResult<Self> {
        let Value::Object(mut obj) = value else {
            return Err(EclipseError::InvalidPackageStructure(
                "sync document is not a JSON object".into(),
            ));
        };

        if !obj.contains_key("backup") {
            let backup = BackupPackage::from_value(Value::Object(obj))?;
            debug!("legacy package without envelope");
            let generated_at = backup.created_at;
            return build_envelope(backup, generated_at);
        }

        let schema_version = obj
            .get("schemaVersion")
            .and_then(Value::as_u64)
            .unwrap_or(u64::from(SCHEMA_VERSION));
        if schema_version != u64::from(SCHEMA_VERSION) {
            return Err(EclipseError::InvalidPackageStructure(format!(
                "unsupported sync schema version {schema_version}"
            )));
        }
        let generated_at = obj.get("generatedAt").and_then(Value::as_i64).unwrap_or(0);
        let recorded: Option<SectionHashes> = obj
            .remove("sectionHashes")
            .and_then(|v| serde_json::from_value(v).ok());
        let backup = BackupPackage::from_value(obj.remove("backup").unwrap_or(Value::Null))?;

        let envelope = build_envelope(backup, generated_at)?;
        if let Some(recorded) = recorded {
            if recorded != envelope.section_hashes {
                debug!(
                    recorded = ?recorded,
                    computed = ?envelope.section_hashes,
                    "recorded section hashes disagree with content, using computed"
                );
            }
        }
        Ok(envelope)
    }
}

pub fn build_envelope(backup: BackupPackage, generated_at: i64) -> EclipseResult<CloudSyncEnvelope> {
    let section_hashes = SectionHashes::compute(&backup)?;
    Ok(CloudSyncEnvelope {
        schema_version: SCHEMA_VERSION,
        generated_at,
        backup,
        section_hashes,
    })
}

/// Sections whose hashes differ.
pub fn diff(local: &SectionHashes, remote: &SectionHashes) -> SectionSet {
    Section::ALL
        .into_iter()
        .filter(|s| local.get(*s) != remote.get(*s))
        .collect()
}

/// Sections an import may touch: requested and actually changed.
pub fn restrict_import_scope(requested: SectionSet, changed: SectionSet) -> SectionSet {
    requested.intersect(&changed)
}

/// Open a sync or backup document: decrypt when it is an encrypted payload,
/// then parse as envelope or bare package.
pub fn open_document(text: &str, password: Option<&SecretString>) -> EclipseResult<CloudSyncEnvelope> {
    if looks_encrypted(text) {
        let password = password.ok_or(EclipseError::PasswordRequired)?;
        let payload = EncryptedPayload::from_json(text)?;
        let plain = decrypt(&payload, password)?;
        return CloudSyncEnvelope::from_json(&plain);
    }
    CloudSyncEnvelope::from_json(text)
}

// ── Canonical projection ──────────────────────────────────────────────────────

fn projection(package: &BackupPackage, section: Section) -> EclipseResult<Value> {
    let entries: Map<String, Value> = package
        .entries
        .iter()
        .filter(|(key, _)| Section::of_entry_key(key) == section)
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.clone(), entry_json(v))))
        .collect();

    let mut obj = Map::new();
    obj.insert("entries".into(), Value::Object(entries));
    match section {
        Section::Space => {}
        Section::ZenShelf => {
            obj.insert(
                "stickerAssets".into(),
                serde_json::to_value(&package.assets.sticker_assets)?,
            );
        }
        Section::Config => {
            obj.insert(
                "wallpapers".into(),
                serde_json::to_value(&package.assets.wallpapers)?,
            );
        }
    }
    Ok(Value::Object(obj))
}

fn entry_json(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn hash_section(package: &BackupPackage, section: Section) -> EclipseResult<String> {
    let mut canonical = String::new();
    write_canonical(&projection(package, section)?, &mut canonical);
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(digest))
}

/// Compact JSON with object keys in byte order, independent of how the
/// `serde_json` map happens to be ordered.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(&Value::String(key.clone()), out);
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}
