//! Merge configuration: autoresolve strategies and derived-field rules.
//!
//! Paths are star-paths (`/cells/*/outputs`). Keys written with concrete
//! indices are normalised when the configuration is loaded.
//!
//! ```
//! use nbdime::merge::{MergeConfig, Strategy};
//! use nbdime_path::split_path;
//!
//! let config = MergeConfig::from_toml_str(r#"
//!     conflict_default = "remote"
//!
//!     [strategies]
//!     fall_back = "use-local"
//!
//!     [strategies.paths]
//!     "/cells/0/outputs" = "union"
//! "#).unwrap();
//! assert_eq!(config.strategies.get(&split_path("/cells/3/outputs")), Some(Strategy::Union));
//! assert_eq!(config.strategies.fall_back, Some(Strategy::UseLocal));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use nbdime_path::{split_path, star_path, star_path_str, validate_path, Key, PathError};

use crate::error::MergeError;

use super::decisions::Action;

/// How a conflict at a configured path is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Leave the conflict for external resolution.
    Mergetool,
    /// Conflicts here are a bug in the input; raise an error.
    Fail,
    UseBase,
    UseLocal,
    UseRemote,
    /// Reset the value to empty.
    Clear,
    /// Keep both sides' changes, local first.
    Union,
    /// Keep the largest number.
    TakeMax,
    /// Splice both output lists into one, between conflict markers.
    InlineOutputs,
    /// Replace the conflicting lines of a text by both sides' lines,
    /// between conflict markers.
    InlineSource,
    /// Reset the container holding the conflict to empty.
    ClearParent,
    /// Keep base and store both sides under `nbdime-conflicts`.
    RecordConflict,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Mergetool => "mergetool",
            Strategy::Fail => "fail",
            Strategy::UseBase => "use-base",
            Strategy::UseLocal => "use-local",
            Strategy::UseRemote => "use-remote",
            Strategy::Clear => "clear",
            Strategy::Union => "union",
            Strategy::TakeMax => "take-max",
            Strategy::InlineOutputs => "inline-outputs",
            Strategy::InlineSource => "inline-source",
            Strategy::ClearParent => "clear-parent",
            Strategy::RecordConflict => "record-conflict",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategies by star-path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Strategies {
    /// Used for conflicts no path matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fall_back: Option<Strategy>,
    /// Paths whose changes may be dropped in favour of a deletion on the
    /// other side.
    pub transients: Vec<String>,
    pub paths: BTreeMap<String, Strategy>,
}

impl Strategies {
    /// Strategy configured for exactly this path.
    pub fn get(&self, path: &[Key]) -> Option<Strategy> {
        self.paths.get(&star_path(path)).copied()
    }

    /// True if `path` or one of its ancestors is transient.
    pub fn is_transient(&self, path: &[Key]) -> bool {
        (1..=path.len()).any(|n| self.transients.contains(&star_path(&path[..n])))
    }

    pub fn insert(&mut self, path: &str, strategy: Strategy) -> &mut Self {
        self.paths.insert(star_path_str(path), strategy);
        self
    }

    fn normalize(&mut self) -> Result<(), PathError> {
        let mut paths = BTreeMap::new();
        for (path, strategy) in std::mem::take(&mut self.paths) {
            paths.insert(star_path(&validate_path(&path)?), strategy);
        }
        self.paths = paths;
        for t in &mut self.transients {
            *t = star_path(&validate_path(t)?);
        }
        Ok(())
    }
}

/// Everything the merge pass can be configured with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    /// Action shown on decisions left in conflict.
    pub conflict_default: Action,
    /// Mimetype of code cell sources.
    pub notebook_mimetype: String,
    pub strategies: Strategies,
    /// Derived field star-path mapped to the sibling key whose two-sided
    /// merge clears it.
    pub clear_on_merge: BTreeMap<String, String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self::generic()
    }
}

const DEFAULT_NOTEBOOK_MIMETYPE: &str = "text/x-python";

impl MergeConfig {
    /// No strategies and no derived fields.
    pub fn generic() -> Self {
        MergeConfig {
            strategies: Strategies::default(),
            clear_on_merge: BTreeMap::new(),
            conflict_default: Action::Local,
            notebook_mimetype: DEFAULT_NOTEBOOK_MIMETYPE.to_string(),
        }
    }

    /// Defaults for notebooks.
    pub fn notebook() -> Self {
        let mut strategies = Strategies::default();
        strategies
            .insert("/nbformat", Strategy::Fail)
            .insert("/nbformat_minor", Strategy::TakeMax)
            .insert("/metadata", Strategy::UseBase)
            .insert("/cells/*/cell_type", Strategy::Fail)
            .insert("/cells/*/execution_count", Strategy::Clear)
            .insert("/cells/*/metadata", Strategy::UseBase)
            .insert("/cells/*/source", Strategy::Mergetool)
            .insert("/cells/*/outputs", Strategy::InlineOutputs);
        strategies.transients = [
            "/cells/*/execution_count",
            "/cells/*/outputs",
            "/cells/*/metadata/collapsed",
            "/cells/*/metadata/autoscroll",
            "/cells/*/metadata/scrolled",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let mut clear_on_merge = BTreeMap::new();
        clear_on_merge.insert("/cells/*/execution_count".to_string(), "source".to_string());
        MergeConfig { strategies, clear_on_merge, ..Self::generic() }
    }

    /// Parse a TOML document; missing fields keep the generic defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, MergeError> {
        let mut config: MergeConfig = toml::from_str(s)?;
        config.strategies.normalize()?;
        let mut clear_on_merge = BTreeMap::new();
        for (derived, sibling) in std::mem::take(&mut config.clear_on_merge) {
            clear_on_merge.insert(star_path(&validate_path(&derived)?), sibling);
        }
        config.clear_on_merge = clear_on_merge;
        Ok(config)
    }

    /// Every derived key of the container at `path`, with its sibling.
    pub fn derived_fields(&self, path: &[Key]) -> Vec<(String, String)> {
        let container = star_path(path);
        self.clear_on_merge
            .iter()
            .filter_map(|(derived, source)| {
                let keys = split_path(derived);
                let (last, parent) = keys.split_last()?;
                let name = last.as_name()?;
                (star_path(parent) == container).then(|| (name.to_string(), source.clone()))
            })
            .collect()
    }
}
