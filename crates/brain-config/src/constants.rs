//! Default constants for directories, filenames, and timing

use std::time::Duration;

/// Config directory name under the XDG config base
pub const BRAIN_DIR_NAME: &str = "brain";

/// User config filename
pub const CONFIG_FILENAME: &str = "config.json";

/// Suffix for the atomic-write staging file
pub const TMP_SUFFIX: &str = ".tmp";

/// Lock subdirectory name
pub const LOCK_DIR_NAME: &str = "locks";

/// Rollback subdirectory name
pub const ROLLBACK_DIR_NAME: &str = "rollback";

/// Copy-manifest subdirectory name
pub const MANIFEST_DIR_NAME: &str = "manifests";

/// Global lock filename
pub const GLOBAL_LOCK_FILENAME: &str = "global.lock";

/// Config-file lock filename
pub const CONFIG_LOCK_FILENAME: &str = "config.lock";

/// Environment variable overriding the config dir base
pub const ENV_XDG_CONFIG_HOME: &str = "XDG_CONFIG_HOME";

/// Upstream service dot-directory (relative to home)
pub const UPSTREAM_DIR_NAME: &str = ".memory-bank";

/// Upstream config filename inside its dot-directory
pub const UPSTREAM_CONFIG_FILENAME: &str = "config.json";

/// Legacy (pre-2.0) dot-directory (relative to home)
pub const LEGACY_DIR_NAME: &str = ".brain";

/// Legacy config filename inside its dot-directory
pub const LEGACY_CONFIG_FILENAME: &str = "config.json";

/// Default timeout acquiring the config-file lock
pub const CONFIG_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout acquiring a project lock
pub const PROJECT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout acquiring the global lock
pub const GLOBAL_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay between lock acquisition retries
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Age after which a lock file is considered abandoned
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(120);

/// Maximum snapshots retained in rollback history
pub const SNAPSHOT_HISTORY_CAP: usize = 10;

/// Unix mode for brain-owned directories
pub const DIR_MODE: u32 = 0o700;

/// Unix mode for brain-owned files
pub const FILE_MODE: u32 = 0o600;
