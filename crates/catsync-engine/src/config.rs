//! # Engine Configuration
//!
//! Configuration management for the consistency engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CATSYNC_REFERENCE_MAX_DEPTH=2                                      │
//! │     CATSYNC_INITIAL_SYNC_CHECK=executions                              │
//! │     CATSYNC_DISABLE_RESTRICTIONS=false                                 │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/catsync/engine.toml (Linux)                              │
//! │     ~/Library/Application Support/io.catsync.catsync/engine.toml       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     no reference rules, max_depth = -1, timestamp check                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # engine.toml
//! [references]
//! max_depth = -1        # -1: number of entries configured for the type
//!
//! [references.types]
//! Product = ["Media", "Product.supercategories"]
//! Category = ["Category.supercategories"]
//!
//! [initial_sync]
//! check = "timestamps"  # timestamps | executions
//!
//! [access]
//! disable_restrictions = true
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use catsync_core::validation::{parse_reference_entry, validate_type_code};
use catsync_core::{ReferenceEntry, TypeCode};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Initial Sync Check
// =============================================================================

/// How "has this rule ever been executed" is decided.
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  TIMESTAMPS (Default)            │  EXECUTIONS                          │
/// │  ────────────────────            │  ──────────                          │
/// │  The ledger holds at least one   │  The job runtime reports at least   │
/// │  record written by the rule.     │  one completed execution.           │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialSyncCheck {
    #[default]
    Timestamps,
    Executions,
}

impl std::fmt::Display for InitialSyncCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitialSyncCheck::Timestamps => write!(f, "timestamps"),
            InitialSyncCheck::Executions => write!(f, "executions"),
        }
    }
}

impl std::str::FromStr for InitialSyncCheck {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "timestamps" | "ledger" => Ok(InitialSyncCheck::Timestamps),
            "executions" | "history" => Ok(InitialSyncCheck::Executions),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown initial sync check: '{}'. Valid options: timestamps, executions",
                other
            ))),
        }
    }
}

// =============================================================================
// Reference Settings
// =============================================================================

/// Which references are followed when computing an item's closure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSettings {
    /// Maximum closure depth. `-1` uses the number of entries configured for
    /// the item's type; other negative values clamp to zero.
    #[serde(default = "default_max_depth")]
    pub max_depth: i32,

    /// Per type: target type codes (`Media`) or attribute qualifiers
    /// (`Product.supercategories`). Subtypes inherit the entries of their
    /// nearest configured supertype.
    #[serde(default)]
    pub types: BTreeMap<TypeCode, Vec<String>>,
}

fn default_max_depth() -> i32 {
    -1
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        ReferenceSettings {
            max_depth: default_max_depth(),
            types: BTreeMap::new(),
        }
    }
}

impl ReferenceSettings {
    /// Adds entries for a type.
    pub fn with_type<I, S>(mut self, type_code: impl Into<TypeCode>, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types
            .entry(type_code.into())
            .or_default()
            .extend(entries.into_iter().map(Into::into));
        self
    }

    pub fn with_max_depth(mut self, max_depth: i32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Closure depth for a type with `entry_count` configured entries.
    pub fn depth_for(&self, entry_count: usize) -> usize {
        if self.max_depth == -1 {
            entry_count
        } else {
            self.max_depth.max(0) as usize
        }
    }

    /// Parses every configured entry.
    pub fn parsed(&self) -> SyncResult<HashMap<TypeCode, Vec<ReferenceEntry>>> {
        let mut parsed = HashMap::with_capacity(self.types.len());
        for (type_code, entries) in &self.types {
            validate_type_code(type_code.as_str())
                .map_err(|e| SyncError::InvalidConfig(format!("references.types: {e}")))?;
            let entries = entries
                .iter()
                .map(|raw| parse_reference_entry(raw))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| {
                    SyncError::InvalidConfig(format!("references.types.{type_code}: {e}"))
                })?;
            parsed.insert(type_code.clone(), entries);
        }
        Ok(parsed)
    }
}

// =============================================================================
// Initial Sync and Access Settings
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialSyncSettings {
    #[serde(default)]
    pub check: InitialSyncCheck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSettings {
    /// Value placed on the access context for counterpart lookups and
    /// descendant expansion.
    #[serde(default = "default_true")]
    pub disable_restrictions: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AccessSettings {
    fn default() -> Self {
        AccessSettings {
            disable_restrictions: true,
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub references: ReferenceSettings,

    #[serde(default)]
    pub initial_sync: InitialSyncSettings,

    #[serde(default)]
    pub access: AccessSettings,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        self.references.parsed()?;
        if self.references.max_depth < -1 {
            warn!(
                max_depth = self.references.max_depth,
                "Negative reference depth, closures will be empty"
            );
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(depth) = lookup("CATSYNC_REFERENCE_MAX_DEPTH") {
            match depth.parse::<i32>() {
                Ok(d) => {
                    debug!(max_depth = d, "Overriding reference depth from environment");
                    self.references.max_depth = d;
                }
                Err(_) => warn!(value = %depth, "Invalid CATSYNC_REFERENCE_MAX_DEPTH"),
            }
        }

        if let Some(check) = lookup("CATSYNC_INITIAL_SYNC_CHECK") {
            match check.parse() {
                Ok(parsed) => {
                    debug!(check = %parsed, "Overriding initial sync check from environment");
                    self.initial_sync.check = parsed;
                }
                Err(e) => warn!(%e, "Ignoring CATSYNC_INITIAL_SYNC_CHECK"),
            }
        }

        if let Some(flag) = lookup("CATSYNC_DISABLE_RESTRICTIONS") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.access.disable_restrictions = true,
                "0" | "false" | "no" => self.access.disable_restrictions = false,
                _ => warn!(value = %flag, "Invalid CATSYNC_DISABLE_RESTRICTIONS"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "catsync", "catsync")
            .map(|dirs| dirs.config_dir().join("engine.toml"))
    }
}
