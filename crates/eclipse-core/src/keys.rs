//! Persisted entry keys carried by a backup package.

pub const SPACES_STATE: &str = "eclipse-spaces-state";
pub const STICKERS: &str = "eclipse-stickers";
pub const DELETED_STICKERS: &str = "eclipse-deleted-stickers";
pub const DELETED_DOCK_ITEMS: &str = "eclipse-deleted-dock-items";
pub const DELETED_SPACES: &str = "eclipse-deleted-spaces";
pub const SEARCH_ENGINE: &str = "eclipse-search-engine";
pub const SEARCH_ENGINES: &str = "eclipse-search-engines";
pub const APP_CONFIG: &str = "eclipse-config";
pub const LANGUAGE: &str = "eclipse-language";
pub const SPACE_RULES: &str = "eclipse-space-rules";
pub const SPACE_OVERRIDES: &str = "eclipse-space-overrides";
pub const WALLPAPERS: &str = "eclipse-wallpapers";

/// Every key a full backup reads from and writes to persistence.
pub const ALL: [&str; 12] = [
    SPACES_STATE,
    STICKERS,
    DELETED_STICKERS,
    DELETED_DOCK_ITEMS,
    DELETED_SPACES,
    SEARCH_ENGINE,
    SEARCH_ENGINES,
    APP_CONFIG,
    LANGUAGE,
    SPACE_RULES,
    SPACE_OVERRIDES,
    WALLPAPERS,
];
