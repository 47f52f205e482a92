//! Brain Core - Domain entities for the configuration lifecycle
//!
//! This crate contains the domain model and has no infrastructure concerns.
//!
//! # Architecture
//!
//! - `config` - User-facing configuration entities (`UserConfig`, `ProjectEntry`)
//! - `upstream` - The projected upstream configuration (open mapping)
//! - `diff` - Structured config diffing
//! - `checksum` - Canonical-JSON SHA-256 checksums
//! - `snapshot` - Rollback snapshot and history entities
//! - `manifest` - Copy-manifest entities for content migrations
//! - `error` - Domain error types
//!
//! # Related Crates
//!
//! - Config persistence, path safety, locks: `brain-config`
//! - Services (translation, rollback, migration, watcher): `brain-application`

pub mod checksum;
pub mod config;
pub mod diff;
pub mod error;
pub mod manifest;
pub mod snapshot;
pub mod upstream;

pub use checksum::{canonicalize, config_checksum, sha256_hex};
pub use config::{
    DefaultsSection, LogLevel, LoggingSection, MemoriesMode, ProjectEntry, SyncSection,
    UserConfig, WatcherSection, CONFIG_VERSION, DEFAULT_MEMORIES_LOCATION,
    DEFAULT_SYNC_DELAY_MS, DEFAULT_WATCHER_DEBOUNCE_MS,
};
pub use diff::{
    ConfigDiff, DetailedConfigDiff, FieldChange, GlobalField, GlobalFieldChange,
    ProjectFieldChanges,
};
pub use error::{Error, ErrorKind, Result};
pub use manifest::{CopyEntry, CopyManifest, CopyStatus};
pub use snapshot::{ConfigSnapshot, SnapshotHistoryIndex};
pub use upstream::UpstreamConfig;
