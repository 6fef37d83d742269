//! Conflict policies and import strategies.
//!
//! Modeled as enums rather than flags so new policy values can be added
//! without touching call sites.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do with an incoming space whose name collides with a local one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceNamePolicy {
    /// Keep both: rename the incoming space to `"<name> (conflict-<ts>)"`.
    #[default]
    KeepBoth,
    /// Keep the local space, skip the incoming one.
    KeepLocal,
}

/// What to do with an incoming search engine matching a local one by id or url.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchEnginePolicy {
    #[default]
    KeepLocal,
    /// Incoming engine replaces every local engine it conflicts with.
    KeepRemote,
}

/// Policy pair consulted by the merge engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPolicy {
    pub space_name: SpaceNamePolicy,
    pub search_engine: SearchEnginePolicy,
}

/// How an incoming package is applied to local state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStrategy {
    /// Combine both sides through the merge engine.
    #[default]
    Merge,
    /// Replace in-scope sections with the incoming values.
    Overwrite,
}

fn normalize_token(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect::<String>()
        .to_ascii_lowercase()
}

impl FromStr for SpaceNamePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "keepboth" => Ok(Self::KeepBoth),
            "keeplocal" => Ok(Self::KeepLocal),
            other => Err(format!("unknown space name policy: {other}")),
        }
    }
}

impl FromStr for SearchEnginePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "keeplocal" => Ok(Self::KeepLocal),
            "keepremote" => Ok(Self::KeepRemote),
            other => Err(format!("unknown search engine policy: {other}")),
        }
    }
}

impl FromStr for ImportStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "merge" => Ok(Self::Merge),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(format!("unknown import strategy: {other}")),
        }
    }
}

impl fmt::Display for ImportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge => f.write_str("merge"),
            Self::Overwrite => f.write_str("overwrite"),
        }
    }
}
