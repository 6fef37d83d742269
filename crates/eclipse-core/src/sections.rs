//! Typed views over a package's raw entries.
//!
//! Parsing is lenient: a missing or malformed entry yields that entry's
//! empty value, and a malformed list item is dropped on its own, so a corrupt
//! sticker list never blocks restoring spaces. Unknown JSON fields are kept
//! in `extra` and written back verbatim.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::EclipseResult;
use crate::keys;
use crate::package::{BackupPackage, Entries};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpacesState {
    #[serde(default, deserialize_with = "null_default")]
    pub spaces: Vec<Space>,
    #[serde(default, deserialize_with = "null_default")]
    pub active_space_id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub version: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub apps: Vec<DockItem>,
    #[serde(default, deserialize_with = "null_default")]
    pub created_at: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Space {
    /// Every URL in the dock, including those inside folders.
    pub fn urls(&self) -> Vec<&str> {
        let mut urls = Vec::new();
        for item in &self.apps {
            item.collect_urls(&mut urls);
        }
        urls
    }
}

/// A dock entry: a leaf app (has `url`) or a folder (has `children`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockItem {
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<DockItem>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DockItem {
    pub fn is_folder(&self) -> bool {
        self.children.is_some()
    }

    fn collect_urls<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Some(url) = &self.url {
            out.push(url);
        }
        for child in self.children.iter().flatten() {
            child.collect_urls(out);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StickerKind {
    #[default]
    Text,
    Image,
    Widget,
    /// A kind this build does not know; kept verbatim.
    Other(String),
}

impl From<String> for StickerKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "text" => StickerKind::Text,
            "image" => StickerKind::Image,
            "widget" => StickerKind::Widget,
            _ => StickerKind::Other(s),
        }
    }
}

impl From<StickerKind> for String {
    fn from(kind: StickerKind) -> Self {
        match kind {
            StickerKind::Text => "text".into(),
            StickerKind::Image => "image".into(),
            StickerKind::Widget => "widget".into(),
            StickerKind::Other(s) => s,
        }
    }
}

impl Serialize for StickerKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from(self.clone()))
    }
}

impl<'de> Deserialize<'de> for StickerKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(StickerKind::from(String::deserialize(deserializer)?))
    }
}

/// A sticky note. `content` is text or an inline data URL, and is empty when
/// the image lives in `assets.stickerAssets` under `asset_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sticker {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: StickerKind,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchEngine {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A recycle-bin record (deleted dock item or deleted space). Only the id is
/// interpreted; everything else is opaque history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecycleRecord {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Treats an explicit `null` like a missing field.
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Whether a present entry fails to parse as `T`. Missing and `null`
/// entries are readable: they simply hold the empty value.
pub fn is_unreadable<T: DeserializeOwned>(entries: &Entries, key: &str) -> bool {
    let Some(Some(raw)) = entries.get(key) else {
        return false;
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => false,
        Ok(value) => serde_json::from_value::<T>(value).is_err(),
        Err(_) => true,
    }
}

/// Parse an object-valued entry, falling back to `T::default()`.
pub fn read_entry<T: DeserializeOwned + Default>(entries: &Entries, key: &str) -> T {
    let Some(Some(raw)) = entries.get(key) else {
        return T::default();
    };
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(key, error = %e, "malformed entry, using empty value");
            T::default()
        }
    }
}

/// Parse a list-valued entry item by item, dropping only malformed items.
pub fn read_list<T: DeserializeOwned>(entries: &Entries, key: &str) -> Vec<T> {
    let Some(Some(raw)) = entries.get(key) else {
        return Vec::new();
    };
    let items: Vec<Value> = match serde_json::from_str(raw) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            warn!(key, "entry is not a list, using empty list");
            return Vec::new();
        }
        Err(e) => {
            warn!(key, error = %e, "malformed entry, using empty list");
            return Vec::new();
        }
    };
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(key, index, error = %e, "dropping malformed list item");
                None
            }
        })
        .collect()
}

pub fn write_entry<T: Serialize + ?Sized>(
    entries: &mut Entries,
    key: &str,
    value: &T,
) -> EclipseResult<()> {
    entries.insert(key.to_string(), Some(serde_json::to_string(value)?));
    Ok(())
}

impl BackupPackage {
    pub fn spaces_state(&self) -> SpacesState {
        read_entry(&self.entries, keys::SPACES_STATE)
    }

    pub fn stickers(&self) -> Vec<Sticker> {
        read_list(&self.entries, keys::STICKERS)
    }

    pub fn deleted_stickers(&self) -> Vec<Sticker> {
        read_list(&self.entries, keys::DELETED_STICKERS)
    }

    pub fn deleted_dock_items(&self) -> Vec<RecycleRecord> {
        read_list(&self.entries, keys::DELETED_DOCK_ITEMS)
    }

    pub fn deleted_spaces(&self) -> Vec<RecycleRecord> {
        read_list(&self.entries, keys::DELETED_SPACES)
    }

    pub fn search_engines(&self) -> Vec<SearchEngine> {
        read_list(&self.entries, keys::SEARCH_ENGINES)
    }

    /// Per-space rule objects keyed by space id.
    pub fn space_rules(&self) -> BTreeMap<String, Value> {
        read_entry(&self.entries, keys::SPACE_RULES)
    }

    pub fn space_overrides(&self) -> BTreeMap<String, Value> {
        read_entry(&self.entries, keys::SPACE_OVERRIDES)
    }

    pub fn set_spaces_state(&mut self, state: &SpacesState) -> EclipseResult<()> {
        write_entry(&mut self.entries, keys::SPACES_STATE, state)
    }

    pub fn set_stickers(&mut self, stickers: &[Sticker]) -> EclipseResult<()> {
        write_entry(&mut self.entries, keys::STICKERS, stickers)
    }

    pub fn set_deleted_stickers(&mut self, stickers: &[Sticker]) -> EclipseResult<()> {
        write_entry(&mut self.entries, keys::DELETED_STICKERS, stickers)
    }

    pub fn set_deleted_dock_items(&mut self, records: &[RecycleRecord]) -> EclipseResult<()> {
        write_entry(&mut self.entries, keys::DELETED_DOCK_ITEMS, records)
    }

    pub fn set_deleted_spaces(&mut self, records: &[RecycleRecord]) -> EclipseResult<()> {
        write_entry(&mut self.entries, keys::DELETED_SPACES, records)
    }

    pub fn set_search_engines(&mut self, engines: &[SearchEngine]) -> EclipseResult<()> {
        write_entry(&mut self.entries, keys::SEARCH_ENGINES, engines)
    }

    pub fn set_space_rules(&mut self, rules: &BTreeMap<String, Value>) -> EclipseResult<()> {
        write_entry(&mut self.entries, keys::SPACE_RULES, rules)
    }

    pub fn set_space_overrides(&mut self, overrides: &BTreeMap<String, Value>) -> EclipseResult<()> {
        write_entry(&mut self.entries, keys::SPACE_OVERRIDES, overrides)
    }
}
