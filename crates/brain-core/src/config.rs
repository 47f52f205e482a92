//! User-facing configuration entities
//!
//! `UserConfig` is the authoritative, user-editable configuration owned by
//! the core. The on-disk format is JSON (`<XDG>/brain/config.json`), UTF-8,
//! two-space indentation.
//!
//! Field semantics the rest of the system relies on:
//! - project names are unique, case-sensitive keys
//! - `memories_mode` on a project falls back to `defaults.memories_mode`
//! - `CUSTOM` mode requires `memories_path` to be set

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The only supported schema version. There is no schema evolution beyond
/// this tag; the legacy migrator stamps it onto migrated configs.
pub const CONFIG_VERSION: &str = "2.0.0";

/// Built-in default memory-store location
pub const DEFAULT_MEMORIES_LOCATION: &str = "~/memories";

/// Default upstream sync delay in milliseconds
pub const DEFAULT_SYNC_DELAY_MS: u64 = 500;

/// Default watcher debounce window in milliseconds
pub const DEFAULT_WATCHER_DEBOUNCE_MS: u64 = 2000;

/// Policy for resolving a project's memory-store path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoriesMode {
    /// `<defaults.memories_location>/<project name>`
    Default,
    /// `<code_path>/docs`
    Code,
    /// Explicit `memories_path` on the project entry
    Custom,
}

impl MemoriesMode {
    /// Get the mode name as serialized in config files
    pub fn as_str(self) -> &'static str {
        match self {
            MemoriesMode::Default => "DEFAULT",
            MemoriesMode::Code => "CODE",
            MemoriesMode::Custom => "CUSTOM",
        }
    }

    /// Case-insensitive parse, used by the legacy migrator
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "DEFAULT" => Some(MemoriesMode::Default),
            "CODE" => Some(MemoriesMode::Code),
            "CUSTOM" => Some(MemoriesMode::Custom),
            _ => None,
        }
    }
}

/// Log level forwarded to the upstream service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Case-insensitive parse, used by the legacy migrator
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// A named pairing of a code location and a memory-store location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEntry {
    /// Absolute path to the project's code (after tilde expansion)
    pub code_path: String,
    /// Explicit memory-store path; required when mode is `CUSTOM`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memories_path: Option<String>,
    /// Per-project mode override; falls back to `defaults.memories_mode`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memories_mode: Option<MemoriesMode>,
}

impl ProjectEntry {
    /// Create an entry with just a code path (inherits the default mode)
    pub fn new(code_path: impl Into<String>) -> Self {
        Self {
            code_path: code_path.into(),
            memories_path: None,
            memories_mode: None,
        }
    }

    /// Effective mode after applying the defaults fallback
    pub fn effective_mode(&self, defaults: &DefaultsSection) -> MemoriesMode {
        self.memories_mode.unwrap_or(defaults.memories_mode)
    }
}

/// The `defaults` group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsSection {
    pub memories_location: String,
    #[serde(default = "default_memories_mode")]
    pub memories_mode: MemoriesMode,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            memories_location: DEFAULT_MEMORIES_LOCATION.to_string(),
            memories_mode: MemoriesMode::Default,
        }
    }
}

fn default_memories_mode() -> MemoriesMode {
    MemoriesMode::Default
}

/// The `sync` group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSection {
    pub enabled: bool,
    #[serde(default = "default_sync_delay_ms")]
    pub delay_ms: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: DEFAULT_SYNC_DELAY_MS,
        }
    }
}

fn default_sync_delay_ms() -> u64 {
    DEFAULT_SYNC_DELAY_MS
}

/// The `logging` group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    pub level: LogLevel,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

/// The `watcher` group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherSection {
    pub enabled: bool,
    #[serde(default = "default_watcher_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: DEFAULT_WATCHER_DEBOUNCE_MS,
        }
    }
}

fn default_watcher_debounce_ms() -> u64 {
    DEFAULT_WATCHER_DEBOUNCE_MS
}

/// The authoritative user-editable configuration (singleton per user)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    /// Informational schema URL; not interpreted by the core
    #[serde(
        rename = "$schema",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub schema_url: Option<String>,
    pub version: String,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectEntry>,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub watcher: WatcherSection,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            schema_url: None,
            version: CONFIG_VERSION.to_string(),
            defaults: DefaultsSection::default(),
            projects: BTreeMap::new(),
            sync: SyncSection::default(),
            logging: LoggingSection::default(),
            watcher: WatcherSection::default(),
        }
    }
}
