//! Brain Application - services over the configuration lifecycle
//!
//! This layer contains all business logic above persistence. It is
//! independent of any transport or server surface; the enclosing process
//! wires the watcher, migrator, and sync services together and supplies the
//! upstream-process controller.
//!
//! # Architecture
//!
//! - `ports` - the upstream-process controller boundary
//! - `services::upstream_sync` - projection of the user config to the
//!   upstream format, and the synced write
//! - `services::rollback_manager` - checksummed snapshots and restore
//! - `services::legacy_migrator` - one-shot migration of pre-2.0 configs
//! - `services::copy_manifest` - per-file tracking of content migrations
//! - `services::config_watcher` - debounced reaction to manual config edits

pub mod ports;
pub mod services;

pub use ports::{NullUpstreamController, UpstreamControlError, UpstreamController, UpstreamControllerRef};
pub use services::config_watcher::{
    ConfigWatcher, MigrationGate, WatcherError, WatcherEvent, WatcherState,
};
pub use services::copy_manifest::{
    CopyManifestEngine, CopyRollbackReport, ManifestError, RecoveryReport,
};
pub use services::legacy_migrator::{
    LegacyMigrator, MigrationError, MigrationOptions, MigrationResult, MigrationStep, StepStatus,
};
pub use services::rollback_manager::{
    RollbackError, RollbackManager, RollbackOutcome, RollbackTarget,
};
pub use services::upstream_sync::{
    SyncError, TranslationIssue, TranslationPreview, UpstreamSyncService,
};
