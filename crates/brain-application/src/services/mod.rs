//! Business logic services for the configuration lifecycle
//!
//! Services depend downward only: the watcher drives rollback and sync,
//! rollback drives the store and sync, sync drives the locks and the
//! upstream controller port. Nothing here touches a transport.

pub mod config_watcher;
pub mod copy_manifest;
pub mod legacy_migrator;
pub mod rollback_manager;
pub mod upstream_sync;

pub use config_watcher::{ConfigWatcher, MigrationGate, WatcherEvent, WatcherState};
pub use copy_manifest::{CopyManifestEngine, CopyRollbackReport, RecoveryReport};
pub use legacy_migrator::{LegacyMigrator, MigrationOptions, MigrationResult, StepStatus};
pub use rollback_manager::{RollbackManager, RollbackOutcome, RollbackTarget};
pub use upstream_sync::{TranslationIssue, TranslationPreview, UpstreamSyncService};
