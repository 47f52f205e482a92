//! Configuration persistence and filesystem infrastructure for brain
//!
//! This crate owns everything between the domain model and the disk:
//!
//! - `paths` - XDG resolution, tilde expansion, secure directory creation
//! - `safety` - path-safety validation (traversal, NUL, system roots)
//! - `schema` - schema validation of a `UserConfig`
//! - `locks` - filesystem-backed hierarchical lock manager
//! - `store` - atomic, validated load/save of the user config
//!
//! # Architecture
//!
//! Persistence is an infrastructure concern and lives outside the domain
//! layer. This crate depends on `brain-core` only for the domain types it
//! persists.
//!
//! # Usage
//!
//! ```rust,ignore
//! use brain_config::{BrainPaths, ConfigStore, LockManager};
//! use std::sync::Arc;
//!
//! let paths = BrainPaths::discover();
//! let locks = Arc::new(LockManager::new(paths.lock_dir()));
//! let store = ConfigStore::new(paths, locks);
//! let config = store.load().await?;
//! ```

pub mod constants;
pub mod locks;
pub mod paths;
pub mod safety;
pub mod schema;
pub mod store;

pub use locks::{LockError, LockKind, LockManager, LockToken};
pub use paths::{expand_tilde, BrainPaths};
pub use safety::{is_path_within, validate_code_path, validate_memories_path, PathSafetyError};
pub use schema::validate_config;
pub use store::{ConfigStore, StoreError};
