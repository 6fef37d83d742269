//! Backup export, backup files and transactional import.

use chrono::{DateTime, Local, Utc};
use eclipse_core::ids::IdGenerator;
use eclipse_core::keys;
use eclipse_core::package::{BackupPackage, Entries, PackageKind, StickerAsset, WallpaperAsset};
use eclipse_core::policy::{ConflictPolicy, ImportStrategy};
use eclipse_core::section::{Section, SectionSet};
use eclipse_core::sections::SpacesState;
use eclipse_core::{EclipseError, EclipseResult};
use eclipse_storage::PersistenceAdapter;
use secrecy::SecretString;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::diff::open_document;
use crate::merge::{merge_packages, FamilyCounts, MergePreview};

/// Config-section entries a space snapshot carries for its space.
const SNAPSHOT_ENTRIES: [&str; 2] = [keys::SPACE_RULES, keys::SPACE_OVERRIDES];

// ── Export ────────────────────────────────────────────────────────────────────

/// Snapshot every known entry and both asset lists. Known keys that are not
/// stored locally are carried as `null`.
pub async fn export_full(
    adapter: &dyn PersistenceAdapter,
    now: DateTime<Utc>,
) -> EclipseResult<BackupPackage> {
    let stored = adapter.read_all_entries().await?;
    let mut package = BackupPackage::new(PackageKind::FullBackup, now.timestamp_millis());
    for key in keys::ALL {
        package.set_entry(key, stored.get(key).cloned().flatten());
    }
    package.assets.wallpapers = adapter.read_all_wallpapers().await?;
    package.assets.sticker_assets = adapter.read_all_sticker_assets().await?;
    Ok(package)
}

/// Snapshot a single space with its rules and overrides.
pub async fn export_space_snapshot(
    adapter: &dyn PersistenceAdapter,
    space_id: &str,
    now: DateTime<Utc>,
) -> EclipseResult<BackupPackage> {
    let stored = adapter.read_all_entries().await?;
    let mut full = BackupPackage::new(PackageKind::FullBackup, 0);
    full.entries = stored;

    let state = full.spaces_state();
    let space = state
        .spaces
        .iter()
        .find(|s| s.id == space_id)
        .cloned()
        .ok_or_else(|| EclipseError::SpaceNotFound(space_id.to_string()))?;

    let mut package = BackupPackage::new(PackageKind::SpaceSnapshot, now.timestamp_millis());
    package.set_spaces_state(&SpacesState {
        spaces: vec![space],
        active_space_id: space_id.to_string(),
        version: state.version,
        extra: state.extra.clone(),
    })?;

    let rules = full.space_rules();
    if let Some(rule) = rules.get(space_id) {
        package.set_space_rules(&BTreeMap::from([(space_id.to_string(), rule.clone())]))?;
    }
    let overrides = full.space_overrides();
    if let Some(over) = overrides.get(space_id) {
        package.set_space_overrides(&BTreeMap::from([(space_id.to_string(), over.clone())]))?;
    }

    info!(space = space_id, "exported space snapshot");
    Ok(package)
}

// ── Backup files ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BackupFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Serialize a package as a `.zip` container, or as an encrypted payload
/// (`.enc.json`) when a password is given.
pub fn write_backup_file(
    package: &BackupPackage,
    password: Option<&SecretString>,
) -> EclipseResult<BackupFile> {
    let created = DateTime::from_timestamp_millis(package.created_at).unwrap_or_default();
    let prefix = match package.kind {
        PackageKind::FullBackup => "eclipse-backup",
        PackageKind::SpaceSnapshot => "eclipse-space",
    };
    let stem = format!("{prefix}-{}", created.format("%Y%m%d-%H%M%S"));

    let file = match password {
        Some(password) => {
            let payload = eclipse_crypto::encrypt_at(&package.to_json()?, password, package.created_at)?;
            BackupFile {
                file_name: format!("{stem}.enc.json"),
                bytes: payload.to_json()?.into_bytes(),
            }
        }
        None => {
            let modified = created.with_timezone(&Local).naive_local();
            let bytes = eclipse_container::encode_at(
                package.kind.container_file_name(),
                &package.to_json_pretty()?,
                modified,
            )?;
            BackupFile {
                file_name: format!("{stem}.zip"),
                bytes,
            }
        }
    };

    info!(file = %file.file_name, bytes = file.bytes.len(), "wrote backup file");
    Ok(file)
}

/// Open a backup file: container, raw JSON, encrypted payload or sync
/// envelope are all accepted.
pub fn read_backup_file(bytes: &[u8], password: Option<&SecretString>) -> EclipseResult<BackupPackage> {
    let text = match eclipse_container::decode(bytes) {
        Ok(entry) => entry.content,
        Err(e) if e.is_container_error() => {
            tracing::debug!(error = %e, "not a container, trying raw JSON");
            String::from_utf8(bytes.to_vec()).map_err(|_| {
                EclipseError::InvalidPackageStructure("backup file is neither a container nor UTF-8 JSON".into())
            })?
        }
        Err(e) => return Err(e),
    };
    Ok(open_document(&text, password)?.backup)
}

// ── Import ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    pub strategy: ImportStrategy,
    pub scope: SectionSet,
    pub policy: ConflictPolicy,
    pub now: DateTime<Utc>,
}

impl ImportOptions {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            strategy: ImportStrategy::Merge,
            scope: SectionSet::ALL,
            policy: ConflictPolicy::default(),
            now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub strategy: ImportStrategy,
    pub scope: SectionSet,
    pub preview: MergePreview,
}

/// Compute what an import would do without writing anything.
pub async fn preview_import(
    adapter: &dyn PersistenceAdapter,
    incoming: &BackupPackage,
    options: &ImportOptions,
    ids: &mut dyn IdGenerator,
) -> EclipseResult<ImportReport> {
    let local = export_full(adapter, options.now).await?;
    let (_, report) = plan_import(&local, incoming, options, ids)?;
    Ok(report)
}

/// Apply `incoming` to local state. On any write failure the captured state
/// is written back and the error is returned as `ImportFailed`.
pub async fn import_package(
    adapter: &dyn PersistenceAdapter,
    incoming: &BackupPackage,
    options: &ImportOptions,
    ids: &mut dyn IdGenerator,
) -> EclipseResult<ImportReport> {
    let local = export_full(adapter, options.now).await?;
    let (target, report) = plan_import(&local, incoming, options, ids)?;
    write_transactional(adapter, &target).await?;
    info!(
        strategy = %report.strategy,
        scope = %report.scope,
        summary = %report.preview.summary(),
        "import complete"
    );
    Ok(report)
}

/// The package local state should become, and the report describing it.
pub fn plan_import(
    local: &BackupPackage,
    incoming: &BackupPackage,
    options: &ImportOptions,
    ids: &mut dyn IdGenerator,
) -> EclipseResult<(BackupPackage, ImportReport)> {
    let (strategy, scope) = match incoming.kind {
        PackageKind::SpaceSnapshot => (ImportStrategy::Merge, SectionSet::only(Section::Space)),
        PackageKind::FullBackup => (options.strategy, options.scope),
    };

    let (mut target, preview) = match strategy {
        ImportStrategy::Merge => {
            let outcome = merge_packages(local, incoming, options.policy, options.now, ids)?;
            let carried: &[&str] = match incoming.kind {
                PackageKind::SpaceSnapshot => &SNAPSHOT_ENTRIES,
                PackageKind::FullBackup => &[],
            };
            let target = restore_out_of_scope(local, outcome.merged, scope, carried);
            (target, scoped_preview(outcome.preview, scope))
        }
        ImportStrategy::Overwrite => overwrite(local, incoming, scope),
    };
    target.created_at = options.now.timestamp_millis();

    Ok((target, ImportReport { strategy, scope, preview }))
}

fn entries_in<'a>(entries: &'a Entries, section: Section) -> impl Iterator<Item = (&'a String, &'a Option<String>)> {
    entries
        .iter()
        .filter(move |(key, _)| Section::of_entry_key(key) == section)
}

/// Put every section outside `scope` back to its local value, except the
/// `carried` keys which keep their merged value.
fn restore_out_of_scope(
    local: &BackupPackage,
    mut merged: BackupPackage,
    scope: SectionSet,
    carried: &[&str],
) -> BackupPackage {
    for section in Section::ALL {
        if scope.contains(section) {
            continue;
        }
        merged
            .entries
            .retain(|key, _| Section::of_entry_key(key) != section || carried.contains(&key.as_str()));
        for (key, value) in entries_in(&local.entries, section) {
            if !carried.contains(&key.as_str()) {
                merged.entries.insert(key.clone(), value.clone());
            }
        }
        match section {
            Section::Space => {}
            Section::ZenShelf => merged.assets.sticker_assets = local.assets.sticker_assets.clone(),
            Section::Config => merged.assets.wallpapers = local.assets.wallpapers.clone(),
        }
    }
    merged
}

fn scoped_preview(mut preview: MergePreview, scope: SectionSet) -> MergePreview {
    preview
        .unreadable_entries
        .retain(|key| scope.contains(Section::of_entry_key(key)));
    if !scope.contains(Section::Space) {
        preview.spaces = FamilyCounts::default();
        preview.deleted_dock_items = FamilyCounts::default();
        preview.deleted_spaces = FamilyCounts::default();
        preview.space_renames.clear();
        preview.skipped_spaces.clear();
    }
    if !scope.contains(Section::ZenShelf) {
        preview.stickers = FamilyCounts::default();
        preview.deleted_stickers = FamilyCounts::default();
        preview.sticker_assets = FamilyCounts::default();
    }
    if !scope.contains(Section::Config) {
        preview.search_engines = FamilyCounts::default();
        preview.wallpapers = FamilyCounts::default();
        preview.entries = FamilyCounts::default();
    }
    preview
}

fn replaced(current: usize, incoming: usize) -> FamilyCounts {
    FamilyCounts {
        current,
        incoming,
        added: incoming,
        overwritten: current,
        conflicting: 0,
    }
}

/// Replace every in-scope section with the incoming one. Local keys of an
/// in-scope section that the incoming package lacks are deleted.
fn overwrite(local: &BackupPackage, incoming: &BackupPackage, scope: SectionSet) -> (BackupPackage, MergePreview) {
    let mut target = local.clone();
    let mut preview = MergePreview::default();

    for section in scope.iter() {
        let local_keys: Vec<String> = entries_in(&local.entries, section).map(|(k, _)| k.clone()).collect();
        for key in local_keys {
            target.entries.insert(key, None);
        }
        for (key, value) in entries_in(&incoming.entries, section) {
            target.entries.insert(key.clone(), value.clone());
        }

        match section {
            Section::Space => {
                preview.spaces = replaced(local.spaces_state().spaces.len(), incoming.spaces_state().spaces.len());
                preview.deleted_dock_items =
                    replaced(local.deleted_dock_items().len(), incoming.deleted_dock_items().len());
                preview.deleted_spaces = replaced(local.deleted_spaces().len(), incoming.deleted_spaces().len());
            }
            Section::ZenShelf => {
                target.assets.sticker_assets = incoming.assets.sticker_assets.clone();
                preview.stickers = replaced(local.stickers().len(), incoming.stickers().len());
                preview.deleted_stickers =
                    replaced(local.deleted_stickers().len(), incoming.deleted_stickers().len());
                preview.sticker_assets = replaced(
                    local.assets.sticker_assets.len(),
                    incoming.assets.sticker_assets.len(),
                );
            }
            Section::Config => {
                target.assets.wallpapers = incoming.assets.wallpapers.clone();
                preview.search_engines = replaced(local.search_engines().len(), incoming.search_engines().len());
                preview.wallpapers = replaced(local.assets.wallpapers.len(), incoming.assets.wallpapers.len());
                let count = |pkg: &BackupPackage| {
                    entries_in(&pkg.entries, Section::Config)
                        .filter(|(k, v)| k.as_str() != keys::SEARCH_ENGINES && v.is_some())
                        .count()
                };
                preview.entries = replaced(count(local), count(incoming));
            }
        }
    }
    (target, preview)
}

// ── Transactional write ───────────────────────────────────────────────────────

struct Captured {
    entries: Entries,
    wallpapers: Vec<WallpaperAsset>,
    sticker_assets: Vec<StickerAsset>,
}

async fn write_all(
    adapter: &dyn PersistenceAdapter,
    entries: &Entries,
    wallpapers: &[WallpaperAsset],
    sticker_assets: &[StickerAsset],
) -> EclipseResult<()> {
    adapter.write_all_entries(entries).await?;
    adapter.write_all_wallpapers(wallpapers).await?;
    adapter.write_all_sticker_assets(sticker_assets).await?;
    Ok(())
}

/// Capture, write, and on failure write the capture back.
pub async fn write_transactional(adapter: &dyn PersistenceAdapter, target: &BackupPackage) -> EclipseResult<()> {
    let captured = Captured {
        entries: adapter.read_all_entries().await?,
        wallpapers: adapter.read_all_wallpapers().await?,
        sticker_assets: adapter.read_all_sticker_assets().await?,
    };

    let result = write_all(
        adapter,
        &target.entries,
        &target.assets.wallpapers,
        &target.assets.sticker_assets,
    )
    .await;
    let Err(source) = result else {
        return Ok(());
    };

    warn!(error = %source, "import write failed, restoring previous state");
    let mut restore = captured.entries.clone();
    for key in target.entries.keys() {
        restore.entry(key.clone()).or_insert(None);
    }
    let rolled_back = match write_all(adapter, &restore, &captured.wallpapers, &captured.sticker_assets).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "rollback failed, local state may be partial");
            false
        }
    };

    Err(EclipseError::ImportFailed {
        source: Box::new(source),
        rolled_back,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use eclipse_core::ids::SequentialIds;
    use eclipse_storage::MemoryPersistence;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap()
    }

    #[tokio::test]
    async fn test_export_full_carries_every_known_key() {
        let store = MemoryPersistence::with_entries([(keys::LANGUAGE, "en"), ("unrelated", "x")]);
        let pkg = export_full(&store, now()).await.unwrap();
        assert_eq!(pkg.entries.len(), keys::ALL.len());
        assert_eq!(pkg.entry(keys::LANGUAGE), Some("en"));
        assert!(pkg.entries[keys::STICKERS].is_none());
        assert!(!pkg.entries.contains_key("unrelated"));
    }

    #[tokio::test]
    async fn test_space_snapshot_unknown_space() {
        let store = MemoryPersistence::new();
        assert!(matches!(
            export_space_snapshot(&store, "nope", now()).await,
            Err(EclipseError::SpaceNotFound(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_backup_file_names() {
        let pkg = BackupPackage::new(PackageKind::FullBackup, now().timestamp_millis());
        let file = write_backup_file(&pkg, None).unwrap();
        assert_eq!(file.file_name, "eclipse-backup-20260304-050607.zip");

        let snap = BackupPackage::new(PackageKind::SpaceSnapshot, now().timestamp_millis());
        let file = write_backup_file(&snap, None).unwrap();
        assert_eq!(file.file_name, "eclipse-space-20260304-050607.zip");
        assert_eq!(eclipse_container::decode(&file.bytes).unwrap().name, "snapshot.json");
    }

    #[test]
    fn test_overwrite_deletes_missing_in_scope_keys() {
        let mut local = BackupPackage::new(PackageKind::FullBackup, 0);
        local.set_entry(keys::LANGUAGE, Some("en".into()));
        local.set_entry(keys::STICKERS, Some("[]".into()));
        let mut incoming = BackupPackage::new(PackageKind::FullBackup, 0);
        incoming.set_entry(keys::APP_CONFIG, Some("{}".into()));

        let options = ImportOptions {
            strategy: ImportStrategy::Overwrite,
            scope: SectionSet::only(Section::Config),
            ..ImportOptions::new(now())
        };
        let (target, report) = plan_import(&local, &incoming, &options, &mut SequentialIds::new()).unwrap();
        assert_eq!(target.entries[keys::LANGUAGE], None);
        assert_eq!(target.entry(keys::APP_CONFIG), Some("{}"));
        assert_eq!(target.entry(keys::STICKERS), Some("[]"));
        assert_eq!(report.preview.entries.overwritten, 1);
    }

    #[test]
    fn test_snapshot_forces_space_merge() {
        let local = BackupPackage::new(PackageKind::FullBackup, 0);
        let mut snap = BackupPackage::new(PackageKind::SpaceSnapshot, 0);
        snap.set_entry(keys::LANGUAGE, Some("fr".into()));
        let options = ImportOptions {
            strategy: ImportStrategy::Overwrite,
            ..ImportOptions::new(now())
        };
        let (target, report) = plan_import(&local, &snap, &options, &mut SequentialIds::new()).unwrap();
        assert_eq!(report.strategy, ImportStrategy::Merge);
        assert_eq!(report.scope, SectionSet::only(Section::Space));
        assert_eq!(target.entry(keys::LANGUAGE), None);
        assert_eq!(report.preview.entries, FamilyCounts::default());
    }

    #[tokio::test]
    async fn test_snapshot_import_carries_rules_and_overrides() {
        let source = MemoryPersistence::with_entries([
            (
                keys::SPACES_STATE,
                r#"{"spaces":[{"id":"s9","name":"Lab","apps":[]},{"id":"s1","name":"Main","apps":[]}],"activeSpaceId":"s1","version":1}"#,
            ),
            (keys::SPACE_RULES, r#"{"s9":{"pin":true},"s1":{"pin":false}}"#),
            (keys::SPACE_OVERRIDES, r#"{"s9":{"wallpaper":"wp"}}"#),
            (keys::LANGUAGE, "fr"),
        ]);
        let snap = export_space_snapshot(&source, "s9", now()).await.unwrap();

        let target = MemoryPersistence::with_entries([
            (keys::SPACE_RULES, r#"{"s2":{"pin":true}}"#),
            (keys::LANGUAGE, "en"),
        ]);
        import_package(&target, &snap, &ImportOptions::new(now()), &mut SequentialIds::new())
            .await
            .unwrap();

        let after = export_full(&target, now()).await.unwrap();
        assert_eq!(after.spaces_state().spaces[0].id, "s9");
        let rules = after.space_rules();
        assert_eq!(rules["s9"]["pin"], true);
        assert_eq!(rules["s2"]["pin"], true);
        assert!(!rules.contains_key("s1"));
        assert_eq!(after.space_overrides()["s9"]["wallpaper"], "wp");
        assert_eq!(after.entry(keys::LANGUAGE), Some("en"));
    }
}
