//! Local persisted state: the key-value entries plus the two asset lists.
//!
//! Entry writes are patches: `Some` sets a key, `None` removes it, and keys
//! not mentioned are left alone. Asset writes replace the whole list.

use async_trait::async_trait;
use eclipse_core::package::{Entries, StickerAsset, WallpaperAsset};
use eclipse_core::{EclipseError, EclipseResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Every stored entry, as `Some(value)`.
    async fn read_all_entries(&self) -> EclipseResult<Entries>;
    async fn write_all_entries(&self, entries: &Entries) -> EclipseResult<()>;

    async fn read_all_wallpapers(&self) -> EclipseResult<Vec<WallpaperAsset>>;
    async fn write_all_wallpapers(&self, wallpapers: &[WallpaperAsset]) -> EclipseResult<()>;

    async fn read_all_sticker_assets(&self) -> EclipseResult<Vec<StickerAsset>>;
    async fn write_all_sticker_assets(&self, assets: &[StickerAsset]) -> EclipseResult<()>;
}

fn apply_patch(store: &mut BTreeMap<String, String>, patch: &Entries) {
    for (key, value) in patch {
        match value {
            Some(v) => {
                store.insert(key.clone(), v.clone());
            }
            None => {
                store.remove(key);
            }
        }
    }
}

fn as_entries(store: &BTreeMap<String, String>) -> Entries {
    store
        .iter()
        .map(|(k, v)| (k.clone(), Some(v.clone())))
        .collect()
}

// ── In-memory adapter ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, String>,
    wallpapers: Vec<WallpaperAsset>,
    sticker_assets: Vec<StickerAsset>,
}

/// Process-local adapter for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    state: Mutex<MemoryState>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with string entries.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        if let Ok(mut state) = store.state.lock() {
            state.entries = entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect();
        }
        store
    }

    fn lock(&self) -> EclipseResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| EclipseError::Persistence("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryPersistence {
    async fn read_all_entries(&self) -> EclipseResult<Entries> {
        Ok(as_entries(&self.lock()?.entries))
    }

    async fn write_all_entries(&self, entries: &Entries) -> EclipseResult<()> {
        apply_patch(&mut self.lock()?.entries, entries);
        Ok(())
    }

    async fn read_all_wallpapers(&self) -> EclipseResult<Vec<WallpaperAsset>> {
        Ok(self.lock()?.wallpapers.clone())
    }

    async fn write_all_wallpapers(&self, wallpapers: &[WallpaperAsset]) -> EclipseResult<()> {
        self.lock()?.wallpapers = wallpapers.to_vec();
        Ok(())
    }

    async fn read_all_sticker_assets(&self) -> EclipseResult<Vec<StickerAsset>> {
        Ok(self.lock()?.sticker_assets.clone())
    }

    async fn write_all_sticker_assets(&self, assets: &[StickerAsset]) -> EclipseResult<()> {
        self.lock()?.sticker_assets = assets.to_vec();
        Ok(())
    }
}

// ── Directory adapter ────────────────────────────────────────────────────────

const ENTRIES_FILE: &str = "entries.json";
const WALLPAPERS_FILE: &str = "wallpapers.json";
const STICKER_ASSETS_FILE: &str = "sticker-assets.json";

/// JSON files under one directory, each replaced atomically (write then rename).
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn load<T: DeserializeOwned + Default>(&self, name: &str) -> EclipseResult<T> {
        let path = self.root.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                EclipseError::Persistence(format!("parsing {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(EclipseError::Persistence(format!(
                "reading {}: {e}",
                path.display()
            ))),
        }
    }

    async fn store<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> EclipseResult<()> {
        let json = serde_json::to_vec_pretty(value)?;
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            EclipseError::Persistence(format!("creating {}: {e}", self.root.display()))
        })?;

        let path = self.root.join(name);
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await.map_err(|e| {
            EclipseError::Persistence(format!("writing {}: {e}", tmp_path.display()))
        })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            EclipseError::Persistence(format!("renaming into {}: {e}", path.display()))
        })?;

        debug!(path = %path.display(), bytes = json.len(), "stored");
        Ok(())
    }
}

#[async_trait]
impl PersistenceAdapter for DirectoryStore {
    async fn read_all_entries(&self) -> EclipseResult<Entries> {
        let store: BTreeMap<String, String> = self.load(ENTRIES_FILE).await?;
        Ok(as_entries(&store))
    }

    async fn write_all_entries(&self, entries: &Entries) -> EclipseResult<()> {
        let mut store: BTreeMap<String, String> = self.load(ENTRIES_FILE).await?;
        apply_patch(&mut store, entries);
        self.store(ENTRIES_FILE, &store).await
    }

    async fn read_all_wallpapers(&self) -> EclipseResult<Vec<WallpaperAsset>> {
        self.load(WALLPAPERS_FILE).await
    }

    async fn write_all_wallpapers(&self, wallpapers: &[WallpaperAsset]) -> EclipseResult<()> {
        self.store(WALLPAPERS_FILE, wallpapers).await
    }

    async fn read_all_sticker_assets(&self) -> EclipseResult<Vec<StickerAsset>> {
        self.load(STICKER_ASSETS_FILE).await
    }

    async fn write_all_sticker_assets(&self, assets: &[StickerAsset]) -> EclipseResult<()> {
        self.store(STICKER_ASSETS_FILE, assets).await
    }
}
