//! Two-way merge of a local and an incoming backup package.
//!
//! Nothing local is silently lost: local records are copied first and
//! incoming records are layered on top. No identifier is shared between two
//! different records in the result; colliding incoming ids are replaced with
//! fresh ones from the injected [`IdGenerator`] and every reference to a
//! remapped space, sticker asset or wallpaper is rewritten.
//!
//! A local family entry that is present but does not parse is carried over
//! verbatim and left unmerged, so a corrupt field never wipes local data.
//!
//! Given the same inputs, policy, `now` and id sequence the output is
//! byte-identical: only ordered collections are iterated.

use chrono::{DateTime, Utc};
use eclipse_core::ids::IdGenerator;
use eclipse_core::keys;
use eclipse_core::package::{BackupPackage, StickerAsset, WallpaperAsset};
use eclipse_core::policy::{ConflictPolicy, SearchEnginePolicy, SpaceNamePolicy};
use eclipse_core::sections::{self, DockItem, RecycleRecord, SearchEngine, Space, SpacesState, Sticker};
use eclipse_core::EclipseResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Entry keys owned by a typed merge family. Every other key is merged as an
/// opaque value.
const FAMILY_KEYS: [&str; 6] = [
    keys::SPACES_STATE,
    keys::STICKERS,
    keys::DELETED_STICKERS,
    keys::DELETED_DOCK_ITEMS,
    keys::DELETED_SPACES,
    keys::SEARCH_ENGINES,
];

/// Entries keyed by space id, merged per inner key after the spaces.
const MAP_KEYS: [&str; 2] = [keys::SPACE_RULES, keys::SPACE_OVERRIDES];

// ── Preview ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyCounts {
    /// Records on the local side
    pub current: usize,
    /// Records on the incoming side
    pub incoming: usize,
    /// Incoming records added to the result
    pub added: usize,
    /// Local records replaced or extended by incoming ones
    pub overwritten: usize,
    /// Incoming records that hit a name or id conflict
    pub conflicting: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceRename {
    pub from: String,
    pub to: String,
}

/// What a merge did (or would do), family by family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergePreview {
    pub spaces: FamilyCounts,
    pub stickers: FamilyCounts,
    pub deleted_stickers: FamilyCounts,
    pub deleted_dock_items: FamilyCounts,
    pub deleted_spaces: FamilyCounts,
    pub search_engines: FamilyCounts,
    pub wallpapers: FamilyCounts,
    pub sticker_assets: FamilyCounts,
    /// Opaque entries (config, language, rules, ...)
    pub entries: FamilyCounts,
    pub space_renames: Vec<SpaceRename>,
    pub skipped_spaces: Vec<String>,
    /// Local entries kept verbatim because they could not be parsed
    pub unreadable_entries: Vec<String>,
}

impl MergePreview {
    fn families(&self) -> [(&'static str, &FamilyCounts); 9] {
        [
            ("spaces", &self.spaces),
            ("stickers", &self.stickers),
            ("deleted_stickers", &self.deleted_stickers),
            ("deleted_dock_items", &self.deleted_dock_items),
            ("deleted_spaces", &self.deleted_spaces),
            ("search_engines", &self.search_engines),
            ("wallpapers", &self.wallpapers),
            ("sticker_assets", &self.sticker_assets),
            ("entries", &self.entries),
        ]
    }

    /// Returns true if the merge adds or replaces anything.
    pub fn has_changes(&self) -> bool {
        self.families()
            .iter()
            .any(|(_, c)| c.added > 0 || c.overwritten > 0)
    }

    pub fn total_conflicts(&self) -> usize {
        self.families().iter().map(|(_, c)| c.conflicting).sum()
    }

    /// Summary for display.
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = self
            .families()
            .iter()
            .filter(|(_, c)| c.added + c.overwritten + c.conflicting > 0)
            .map(|(name, c)| {
                format!(
                    "{name}: +{} ~{} !{}",
                    c.added, c.overwritten, c.conflicting
                )
            })
            .collect();
        if !self.space_renames.is_empty() {
            parts.push(format!("renamed spaces={}", self.space_renames.len()));
        }
        if !self.skipped_spaces.is_empty() {
            parts.push(format!("skipped spaces={}", self.skipped_spaces.len()));
        }
        if !self.unreadable_entries.is_empty() {
            parts.push(format!("unreadable entries={}", self.unreadable_entries.join(",")));
        }
        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub merged: BackupPackage,
    pub preview: MergePreview,
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Merge `incoming` into `local`.
///
/// The result keeps `local.kind` and is stamped with `now`.
pub fn merge_packages(
    local: &BackupPackage,
    incoming: &BackupPackage,
    policy: ConflictPolicy,
    now: DateTime<Utc>,
    ids: &mut dyn IdGenerator,
) -> EclipseResult<MergeOutcome> {
    let mut merger = Merger {
        policy,
        now,
        ids,
        preview: MergePreview::default(),
    };
    let mut merged = BackupPackage::new(local.kind, now.timestamp_millis());

    // Assets first: the asset remaps feed pointer and sticker merging.
    let (wallpapers, wallpaper_remap, counts) = merger.merge_records(
        &local.assets.wallpapers,
        &incoming.assets.wallpapers,
        "wallpaper",
        |a: &WallpaperAsset, b: &WallpaperAsset| a.id == b.id && a.data.bytes == b.data.bytes,
    );
    merger.preview.wallpapers = counts;
    let (sticker_assets, asset_remap, counts) = merger.merge_records(
        &local.assets.sticker_assets,
        &incoming.assets.sticker_assets,
        "sticker-asset",
        |a: &StickerAsset, b: &StickerAsset| a.id == b.id && a.data.bytes == b.data.bytes,
    );
    merger.preview.sticker_assets = counts;
    merged.assets.wallpapers = wallpapers;
    merged.assets.sticker_assets = sticker_assets;

    merger.merge_opaque_entries(local, incoming, &mut merged);
    if local.entry(keys::WALLPAPERS).is_none() {
        remap_pointer_entry(&mut merged, keys::WALLPAPERS, &wallpaper_remap);
    }

    let space_ids = if merger.keep_if_unreadable::<SpacesState>(local, &mut merged, keys::SPACES_STATE) {
        None
    } else {
        let (state, space_ids) = merger.merge_spaces(&local.spaces_state(), &incoming.spaces_state());
        put_family(&mut merged, local, incoming, keys::SPACES_STATE, &state)?;
        Some(space_ids)
    };
    merger.merge_space_maps(local, incoming, &mut merged, space_ids.as_ref());

    let remap_assets = |stickers: Vec<Sticker>| -> Vec<Sticker> {
        stickers
            .into_iter()
            .map(|mut s| {
                if let Some(new_id) = s.asset_id.as_ref().and_then(|id| asset_remap.get(id)) {
                    s.asset_id = Some(new_id.clone());
                }
                s
            })
            .collect()
    };

    if !merger.keep_if_unreadable::<Vec<Sticker>>(local, &mut merged, keys::STICKERS) {
        let (stickers, _, counts) = merger.merge_records(
            &local.stickers(),
            &remap_assets(incoming.stickers()),
            "sticker",
            |a: &Sticker, b: &Sticker| a == b,
        );
        merger.preview.stickers = counts;
        put_family(&mut merged, local, incoming, keys::STICKERS, &stickers)?;
    }

    if !merger.keep_if_unreadable::<Vec<Sticker>>(local, &mut merged, keys::DELETED_STICKERS) {
        let (deleted_stickers, _, counts) = merger.merge_records(
            &local.deleted_stickers(),
            &remap_assets(incoming.deleted_stickers()),
            "sticker",
            |a: &Sticker, b: &Sticker| a == b,
        );
        merger.preview.deleted_stickers = counts;
        put_family(&mut merged, local, incoming, keys::DELETED_STICKERS, &deleted_stickers)?;
    }

    if !merger.keep_if_unreadable::<Vec<RecycleRecord>>(local, &mut merged, keys::DELETED_DOCK_ITEMS) {
        let (deleted_dock_items, _, counts) = merger.merge_records(
            &local.deleted_dock_items(),
            &incoming.deleted_dock_items(),
            "dock",
            |a: &RecycleRecord, b: &RecycleRecord| a == b,
        );
        merger.preview.deleted_dock_items = counts;
        put_family(&mut merged, local, incoming, keys::DELETED_DOCK_ITEMS, &deleted_dock_items)?;
    }

    if !merger.keep_if_unreadable::<Vec<RecycleRecord>>(local, &mut merged, keys::DELETED_SPACES) {
        let (deleted_spaces, _, counts) = merger.merge_records(
            &local.deleted_spaces(),
            &incoming.deleted_spaces(),
            "space",
            |a: &RecycleRecord, b: &RecycleRecord| a == b,
        );
        merger.preview.deleted_spaces = counts;
        put_family(&mut merged, local, incoming, keys::DELETED_SPACES, &deleted_spaces)?;
    }

    if !merger.keep_if_unreadable::<Vec<SearchEngine>>(local, &mut merged, keys::SEARCH_ENGINES) {
        let (engines, redirects) = merger.merge_search_engines(&local.search_engines(), &incoming.search_engines());
        put_family(&mut merged, local, incoming, keys::SEARCH_ENGINES, &engines)?;
        repoint_selected_engine(&mut merged, &engines, &redirects);
    }

    let preview = merger.preview;
    info!(summary = %preview.summary(), "merged packages");
    Ok(MergeOutcome { merged, preview })
}

/// Write a merged family back as an entry.
///
/// When the merged value equals one side's parsed value, that side's raw text
/// is kept verbatim. Nothing is written when neither side carries the key.
fn put_family<T>(
    merged: &mut BackupPackage,
    local: &BackupPackage,
    incoming: &BackupPackage,
    key: &str,
    value: &T,
) -> EclipseResult<()>
where
    T: Serialize + PartialEq + FamilyValue,
{
    let local_raw = local.entry(key);
    let incoming_raw = incoming.entry(key);

    match (local_raw, incoming_raw) {
        (None, None) => {
            if local.entries.contains_key(key) || incoming.entries.contains_key(key) {
                merged.set_entry(key, None);
            }
        }
        (Some(raw), _) if T::parse(local, key) == *value => {
            merged.set_entry(key, Some(raw.to_string()));
        }
        (None, Some(raw)) if T::parse(incoming, key) == *value => {
            merged.set_entry(key, Some(raw.to_string()));
        }
        _ => sections::write_entry(&mut merged.entries, key, value)?,
    }
    Ok(())
}

/// Typed families that can be re-read from a package for comparison.
trait FamilyValue: Sized {
    fn parse(pkg: &BackupPackage, key: &str) -> Self;
}

impl FamilyValue for SpacesState {
    fn parse(pkg: &BackupPackage, key: &str) -> Self {
        sections::read_entry(&pkg.entries, key)
    }
}

impl<T: serde::de::DeserializeOwned> FamilyValue for Vec<T> {
    fn parse(pkg: &BackupPackage, key: &str) -> Self {
        sections::read_list(&pkg.entries, key)
    }
}

/// Rewrite ids inside a pointer entry (a string, a list, or an object of
/// them) through `remap`. Values that are not JSON are left alone.
fn remap_pointer_entry(merged: &mut BackupPackage, key: &str, remap: &BTreeMap<String, String>) {
    if remap.is_empty() {
        return;
    }
    let Some(Ok(mut value)) = merged.entry(key).map(serde_json::from_str::<Value>) else {
        return;
    };
    if rewrite_ids(&mut value, remap) {
        debug!(key, "rewrote remapped ids in pointer entry");
        merged.set_entry(key, Some(value.to_string()));
    }
}

fn rewrite_ids(value: &mut Value, remap: &BTreeMap<String, String>) -> bool {
    match value {
        Value::String(id) => match remap.get(id.as_str()) {
            Some(new_id) => {
                *id = new_id.clone();
                true
            }
            None => false,
        },
        Value::Array(items) => items.iter_mut().fold(false, |hit, v| rewrite_ids(v, remap) | hit),
        Value::Object(fields) => fields.values_mut().fold(false, |hit, v| rewrite_ids(v, remap) | hit),
        _ => false,
    }
}

/// Point the selected engine at its replacement when the merge removed it.
/// The entry is either a JSON string or a bare id.
fn repoint_selected_engine(
    merged: &mut BackupPackage,
    engines: &[SearchEngine],
    redirects: &BTreeMap<String, String>,
) {
    let Some(raw) = merged.entry(keys::SEARCH_ENGINE) else {
        return;
    };
    let quoted = serde_json::from_str::<String>(raw).ok();
    let mut selected = quoted.clone().unwrap_or_else(|| raw.to_string());
    let original = selected.clone();

    for _ in 0..=redirects.len() {
        if engines.iter().any(|e| e.id == selected) {
            break;
        }
        match redirects.get(&selected) {
            Some(next) => selected = next.clone(),
            None => break,
        }
    }
    if selected == original || !engines.iter().any(|e| e.id == selected) {
        return;
    }

    info!(from = %original, to = %selected, "selected search engine replaced, following it");
    let text = match quoted {
        Some(_) => Value::String(selected).to_string(),
        None => selected,
    };
    merged.set_entry(keys::SEARCH_ENGINE, Some(text));
}

/// How incoming space ids map into the merged state.
#[derive(Debug, Default)]
struct SpaceIdMap {
    remapped: BTreeMap<String, String>,
    /// Incoming spaces dropped under a keep-local name conflict.
    skipped: BTreeSet<String>,
}

// ── Identified records ────────────────────────────────────────────────────────

trait Identified {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
}

macro_rules! impl_identified {
    ($($ty:ty),*) => {
        $(impl Identified for $ty {
            fn id(&self) -> &str {
                &self.id
            }
            fn set_id(&mut self, id: String) {
                self.id = id;
            }
        })*
    };
}

impl_identified!(Sticker, RecycleRecord, WallpaperAsset, StickerAsset);

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

// ── Merger ────────────────────────────────────────────────────────────────────

struct Merger<'a> {
    policy: ConflictPolicy,
    now: DateTime<Utc>,
    ids: &'a mut dyn IdGenerator,
    preview: MergePreview,
}

impl Merger<'_> {
    /// Carry a local family entry over verbatim when it does not parse as
    /// `T`. Returns true if the family must not be merged.
    fn keep_if_unreadable<T: DeserializeOwned>(
        &mut self,
        local: &BackupPackage,
        merged: &mut BackupPackage,
        key: &str,
    ) -> bool {
        if !sections::is_unreadable::<T>(&local.entries, key) {
            return false;
        }
        warn!(key, "local entry is unreadable, keeping it as is and skipping its merge");
        merged.set_entry(key, local.entry(key).map(str::to_string));
        self.preview.unreadable_entries.push(key.to_string());
        true
    }

    /// A fresh id not in `used`; recorded as used.
    fn fresh_id(&mut self, prefix: &str, used: &mut BTreeSet<String>) -> String {
        loop {
            let candidate = self.ids.next_id(prefix);
            if used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Concatenate record lists: identical incoming records are dropped,
    /// colliding ids are remapped. Returns the list and the old → new id map.
    fn merge_records<T, F>(
        &mut self,
        local: &[T],
        incoming: &[T],
        prefix: &str,
        same: F,
    ) -> (Vec<T>, BTreeMap<String, String>, FamilyCounts)
    where
        T: Identified + Clone,
        F: Fn(&T, &T) -> bool,
    {
        let mut merged: Vec<T> = local.to_vec();
        let mut used: BTreeSet<String> = local.iter().map(|r| r.id().to_string()).collect();
        let mut remap = BTreeMap::new();
        let mut family = FamilyCounts {
            current: local.len(),
            incoming: incoming.len(),
            ..Default::default()
        };

        for record in incoming {
            if merged.iter().any(|existing| same(existing, record)) {
                continue;
            }
            let mut record = record.clone();
            if used.contains(record.id()) {
                let new_id = self.fresh_id(prefix, &mut used);
                debug!(prefix, from = record.id(), to = %new_id, "remapped colliding id");
                remap.insert(record.id().to_string(), new_id.clone());
                record.set_id(new_id);
                family.conflicting += 1;
            } else {
                used.insert(record.id().to_string());
            }
            merged.push(record);
            family.added += 1;
        }

        (merged, remap, family)
    }

    /// Returns the merged list and, for every engine id the merge dropped,
    /// the id of the engine that took its place.
    fn merge_search_engines(
        &mut self,
        local: &[SearchEngine],
        incoming: &[SearchEngine],
    ) -> (Vec<SearchEngine>, BTreeMap<String, String>) {
        let mut merged: Vec<SearchEngine> = local.to_vec();
        let mut redirects = BTreeMap::new();
        let mut family = FamilyCounts {
            current: local.len(),
            incoming: incoming.len(),
            ..Default::default()
        };

        for engine in incoming {
            if merged.iter().any(|existing| existing == engine) {
                continue;
            }
            let matches: Vec<usize> = merged
                .iter()
                .enumerate()
                .filter(|(_, m)| m.id == engine.id || (!engine.url.is_empty() && m.url == engine.url))
                .map(|(i, _)| i)
                .collect();

            let Some(&first) = matches.first() else {
                merged.push(engine.clone());
                family.added += 1;
                continue;
            };

            family.conflicting += 1;
            match self.policy.search_engine {
                SearchEnginePolicy::KeepLocal => {
                    debug!(id = %engine.id, "search engine conflict, keeping local");
                    if merged[first].id != engine.id {
                        redirects.insert(engine.id.clone(), merged[first].id.clone());
                    }
                }
                SearchEnginePolicy::KeepRemote => {
                    debug!(id = %engine.id, replaced = matches.len(), "search engine conflict, keeping remote");
                    family.overwritten += matches.len();
                    for &idx in matches.iter().rev() {
                        let removed = merged.remove(idx);
                        if removed.id != engine.id {
                            redirects.insert(removed.id, engine.id.clone());
                        }
                    }
                    merged.insert(first, engine.clone());
                }
            }
        }

        self.preview.search_engines = family;
        (merged, redirects)
    }

    fn conflict_name(&self, name: &str, taken: &BTreeSet<String>) -> String {
        let stamp = self.now.format("%Y%m%d-%H%M%S");
        let name = name.trim();
        let base = format!("{name} (conflict-{stamp})");
        if !taken.contains(&normalize_name(&base)) {
            return base;
        }
        let mut n = 2u32;
        loop {
            let candidate = format!("{name} (conflict-{stamp}-{n})");
            if !taken.contains(&normalize_name(&candidate)) {
                return candidate;
            }
            n += 1;
        }
    }

    fn merge_spaces(&mut self, local: &SpacesState, incoming: &SpacesState) -> (SpacesState, SpaceIdMap) {
        let mut merged = local.clone();
        let mut id_map = SpaceIdMap::default();
        if merged.active_space_id.is_empty() {
            merged.active_space_id = incoming.active_space_id.clone();
        }
        merged.version = merged.version.max(incoming.version);
        if local.spaces.is_empty() && local.extra.is_empty() {
            merged.extra = incoming.extra.clone();
        }

        let mut family = FamilyCounts {
            current: local.spaces.len(),
            incoming: incoming.spaces.len(),
            ..Default::default()
        };
        let local_names: BTreeSet<String> =
            local.spaces.iter().map(|s| normalize_name(&s.name)).collect();
        let mut taken_names = local_names.clone();
        let mut space_ids: BTreeSet<String> = local.spaces.iter().map(|s| s.id.clone()).collect();
        let mut item_ids = BTreeSet::new();
        for space in &local.spaces {
            collect_item_ids(&space.apps, &mut item_ids);
        }

        for space in &incoming.spaces {
            let key = normalize_name(&space.name);

            let same_space = local
                .spaces
                .iter()
                .position(|s| s.id == space.id && normalize_name(&s.name) == key);
            if let Some(idx) = same_space {
                let added = self.union_dock(&mut merged.spaces[idx], &space.apps, &mut item_ids);
                if added > 0 {
                    family.overwritten += 1;
                }
                debug!(space = %space.id, added, "merged dock items into matching space");
                continue;
            }

            let mut candidate = space.clone();
            if local_names.contains(&key) {
                family.conflicting += 1;
                match self.policy.space_name {
                    SpaceNamePolicy::KeepLocal => {
                        debug!(name = %space.name, "space name conflict, keeping local");
                        self.preview.skipped_spaces.push(space.name.clone());
                        id_map.skipped.insert(space.id.clone());
                        continue;
                    }
                    SpaceNamePolicy::KeepBoth => {
                        let renamed = self.conflict_name(&space.name, &taken_names);
                        debug!(from = %space.name, to = %renamed, "space name conflict, keeping both");
                        self.preview.space_renames.push(SpaceRename {
                            from: space.name.clone(),
                            to: renamed.clone(),
                        });
                        candidate.name = renamed;
                    }
                }
            }

            if space_ids.contains(&candidate.id) {
                candidate.id = self.fresh_id("space", &mut space_ids);
                debug!(from = %space.id, to = %candidate.id, "remapped colliding space id");
                id_map.remapped.insert(space.id.clone(), candidate.id.clone());
            } else {
                space_ids.insert(candidate.id.clone());
            }
            self.remap_items(&mut candidate.apps, &mut item_ids);
            taken_names.insert(normalize_name(&candidate.name));
            merged.spaces.push(candidate);
            family.added += 1;
        }

        self.preview.spaces = family;
        (merged, id_map)
    }

    /// Give every item (and folder child) an id not yet in use.
    fn remap_items(&mut self, items: &mut [DockItem], used: &mut BTreeSet<String>) {
        for item in items {
            if used.contains(&item.id) {
                item.id = self.fresh_id("dock", used);
            } else {
                used.insert(item.id.clone());
            }
            if let Some(children) = item.children.as_mut() {
                self.remap_items(children, used);
            }
        }
    }

    /// Union incoming dock items into `target` by URL. Returns the number of
    /// top-level items appended.
    fn union_dock(
        &mut self,
        target: &mut Space,
        incoming: &[DockItem],
        used: &mut BTreeSet<String>,
    ) -> usize {
        let mut urls: BTreeSet<String> = target.urls().into_iter().map(str::to_string).collect();
        let mut added = 0;

        for item in incoming {
            let mut item = item.clone();
            match item.children.take() {
                Some(children) => {
                    let kept: Vec<DockItem> = children
                        .into_iter()
                        .filter(|child| match &child.url {
                            Some(url) => urls.insert(url.clone()),
                            None => true,
                        })
                        .collect();
                    if kept.is_empty() {
                        continue;
                    }
                    item.children = Some(kept);
                }
                None => match &item.url {
                    Some(url) => {
                        if !urls.insert(url.clone()) {
                            continue;
                        }
                    }
                    None => {
                        if target.apps.iter().any(|existing| existing.id == item.id) {
                            continue;
                        }
                    }
                },
            }
            self.remap_items(std::slice::from_mut(&mut item), used);
            target.apps.push(item);
            added += 1;
        }
        added
    }

    /// Opaque entries: local wins, incoming fills what is absent locally.
    fn merge_opaque_entries(
        &mut self,
        local: &BackupPackage,
        incoming: &BackupPackage,
        merged: &mut BackupPackage,
    ) {
        let mut family = FamilyCounts::default();
        let all_keys: BTreeSet<&String> = local.entries.keys().chain(incoming.entries.keys()).collect();

        for key in all_keys {
            if FAMILY_KEYS.contains(&key.as_str()) || MAP_KEYS.contains(&key.as_str()) {
                continue;
            }
            let ours = local.entry(key);
            let theirs = incoming.entry(key);
            family.current += usize::from(ours.is_some());
            family.incoming += usize::from(theirs.is_some());

            let value = match (ours, theirs) {
                (Some(a), Some(b)) => {
                    if a != b {
                        family.conflicting += 1;
                        debug!(key = %key, "entry differs, keeping local");
                    }
                    Some(a.to_string())
                }
                (Some(a), None) => Some(a.to_string()),
                (None, Some(b)) => {
                    family.added += 1;
                    Some(b.to_string())
                }
                (None, None) => None,
            };
            merged.set_entry(key, value);
        }

        self.preview.entries = family;
    }

    /// Space rules and overrides: local wins per space id, incoming fills
    /// the ids absent locally after following the space remap. With no
    /// space merge (`ids` is None) incoming contributions are dropped.
    fn merge_space_maps(
        &mut self,
        local: &BackupPackage,
        incoming: &BackupPackage,
        merged: &mut BackupPackage,
        ids: Option<&SpaceIdMap>,
    ) {
        let mut family = self.preview.entries;

        for key in MAP_KEYS {
            let ours = local.entry(key);
            let theirs = incoming.entry(key);
            family.current += usize::from(ours.is_some());
            family.incoming += usize::from(theirs.is_some());

            let value = match (ours, theirs, ids) {
                (None, None, _) => {
                    if local.entries.contains_key(key) || incoming.entries.contains_key(key) {
                        merged.set_entry(key, None);
                    }
                    continue;
                }
                (ours, Some(_), None) => {
                    debug!(key, "spaces were not merged, ignoring incoming entry");
                    ours.map(str::to_string)
                }
                (ours, None, _) => ours.map(str::to_string),
                (ours, Some(b), Some(ids)) => {
                    let parsed = (
                        ours.map(serde_json::from_str::<Value>),
                        serde_json::from_str::<Value>(b),
                    );
                    match parsed {
                        (None, Ok(Value::Object(mut theirs))) => {
                            family.added += 1;
                            if rekey_space_map(&mut theirs, ids) {
                                Some(Value::Object(theirs).to_string())
                            } else {
                                Some(b.to_string())
                            }
                        }
                        (None, _) => {
                            family.added += 1;
                            Some(b.to_string())
                        }
                        (Some(Ok(Value::Object(mut filled))), Ok(Value::Object(mut theirs))) => {
                            rekey_space_map(&mut theirs, ids);
                            let mut added = 0;
                            for (id, value) in theirs {
                                if !filled.contains_key(&id) {
                                    filled.insert(id, value);
                                    added += 1;
                                }
                            }
                            family.added += added;
                            match (added, ours) {
                                (0, Some(a)) => Some(a.to_string()),
                                _ => {
                                    family.overwritten += 1;
                                    Some(Value::Object(filled).to_string())
                                }
                            }
                        }
                        _ => {
                            if ours != Some(b) {
                                family.conflicting += 1;
                                debug!(key, "entry differs, keeping local");
                            }
                            ours.map(str::to_string)
                        }
                    }
                }
            };
            merged.set_entry(key, value);
        }

        self.preview.entries = family;
    }
}

/// Move incoming per-space keys onto the ids their spaces got in the merge.
/// Keys of skipped spaces are dropped. Returns whether anything changed.
fn rekey_space_map(theirs: &mut Map<String, Value>, ids: &SpaceIdMap) -> bool {
    if ids.remapped.is_empty() && ids.skipped.is_empty() {
        return false;
    }
    let mut changed = false;
    let mut rekeyed = Map::new();
    for (key, value) in std::mem::take(theirs) {
        if ids.skipped.contains(&key) {
            changed = true;
        } else if let Some(new_id) = ids.remapped.get(&key) {
            rekeyed.insert(new_id.clone(), value);
            changed = true;
        } else if !rekeyed.contains_key(&key) {
            rekeyed.insert(key, value);
        }
    }
    *theirs = rekeyed;
    changed
}

fn collect_item_ids(items: &[DockItem], out: &mut BTreeSet<String>) {
    for item in items {
        out.insert(item.id.clone());
        if let Some(children) = &item.children {
            collect_item_ids(children, out);
        }
    }
}
