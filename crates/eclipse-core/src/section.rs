//! The three coarse sections used for change detection and import scoping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    /// Space state, deleted dock items, deleted spaces
    Space,
    /// Stickers, deleted stickers, sticker assets
    ZenShelf,
    /// Every other entry, plus wallpapers
    Config,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Space, Section::ZenShelf, Section::Config];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Space => "space",
            Section::ZenShelf => "zenShelf",
            Section::Config => "config",
        }
    }

    /// Section owning an entry key. Unknown keys fall into `Config`.
    pub fn of_entry_key(key: &str) -> Section {
        match key {
            keys::SPACES_STATE | keys::DELETED_DOCK_ITEMS | keys::DELETED_SPACES => Section::Space,
            keys::STICKERS | keys::DELETED_STICKERS => Section::ZenShelf,
            _ => Section::Config,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of sections: used both for "which sections changed" and for
/// "which sections an import may touch".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SectionSet {
    pub space: bool,
    #[serde(alias = "zen_shelf")]
    pub zen_shelf: bool,
    pub config: bool,
}

impl SectionSet {
    pub const EMPTY: SectionSet = SectionSet {
        space: false,
        zen_shelf: false,
        config: false,
    };

    pub const ALL: SectionSet = SectionSet {
        space: true,
        zen_shelf: true,
        config: true,
    };

    pub fn only(section: Section) -> Self {
        let mut set = Self::EMPTY;
        set.insert(section);
        set
    }

    pub fn contains(&self, section: Section) -> bool {
        match section {
            Section::Space => self.space,
            Section::ZenShelf => self.zen_shelf,
            Section::Config => self.config,
        }
    }

    pub fn insert(&mut self, section: Section) {
        match section {
            Section::Space => self.space = true,
            Section::ZenShelf => self.zen_shelf = true,
            Section::Config => self.config = true,
        }
    }

    pub fn intersect(&self, other: &SectionSet) -> SectionSet {
        SectionSet {
            space: self.space && other.space,
            zen_shelf: self.zen_shelf && other.zen_shelf,
            config: self.config && other.config,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.space && !self.zen_shelf && !self.config
    }

    pub fn iter(&self) -> impl Iterator<Item = Section> + '_ {
        Section::ALL.into_iter().filter(|s| self.contains(*s))
    }
}

impl FromIterator<Section> for SectionSet {
    fn from_iter<I: IntoIterator<Item = Section>>(iter: I) -> Self {
        let mut set = SectionSet::EMPTY;
        for section in iter {
            set.insert(section);
        }
        set
    }
}

impl FromStr for SectionSet {
    type Err = String;

    /// Parse a comma-separated list: `space,zen-shelf,config` or `all`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = SectionSet::EMPTY;
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.to_ascii_lowercase().as_str() {
                "all" => set = SectionSet::ALL,
                "space" | "spaces" => set.space = true,
                "zen-shelf" | "zen_shelf" | "zenshelf" | "stickers" => set.zen_shelf = true,
                "config" => set.config = true,
                other => return Err(format!("unknown section: {other}")),
            }
        }
        Ok(set)
    }
}

impl fmt::Display for SectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(|s| s.as_str()).collect();
        f.write_str(&names.join(","))
    }
}
