//! Path utilities for brain configuration
//!
//! Provides XDG config-dir discovery, home directory expansion, and secure
//! directory/file creation (0700 dirs, 0600 files on Unix).

use std::path::{Path, PathBuf};

use crate::constants::{
    BRAIN_DIR_NAME, CONFIG_FILENAME, DIR_MODE, ENV_XDG_CONFIG_HOME, FILE_MODE,
    LEGACY_CONFIG_FILENAME, LEGACY_DIR_NAME, LOCK_DIR_NAME, MANIFEST_DIR_NAME,
    ROLLBACK_DIR_NAME, UPSTREAM_CONFIG_FILENAME, UPSTREAM_DIR_NAME,
};

/// Expand a leading tilde (~) to the user's home directory.
///
/// - `~/foo` becomes `/home/user/foo` on Unix
/// - Paths without a tilde are returned unchanged
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(stripped)
    } else {
        path.to_path_buf()
    }
}

/// Resolve the XDG config base (`XDG_CONFIG_HOME` or `~/.config`).
pub fn xdg_config_base() -> PathBuf {
    match std::env::var(ENV_XDG_CONFIG_HOME) {
        Ok(value) if !value.is_empty() => PathBuf::from(value),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config"),
    }
}

/// Create a directory (and parents) with mode 0700.
pub fn ensure_secure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(DIR_MODE))?;
    }
    Ok(())
}

/// Restrict a file to mode 0600.
pub fn restrict_file(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(FILE_MODE))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Ensure the parent directory of a path exists.
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// All on-disk locations the core reads or writes.
///
/// Defaults come from the XDG layout; every location is injectable so tests
/// run against a temporary directory.
#[derive(Debug, Clone)]
pub struct BrainPaths {
    /// Directory holding `config.json` plus the lock/rollback/manifest dirs
    pub config_dir: PathBuf,
    /// The upstream service's own config file
    pub upstream_config_path: PathBuf,
    /// The pre-2.0 config file location
    pub legacy_config_path: PathBuf,
}

impl BrainPaths {
    /// Resolve the default locations from the environment.
    pub fn discover() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            config_dir: xdg_config_base().join(BRAIN_DIR_NAME),
            upstream_config_path: home.join(UPSTREAM_DIR_NAME).join(UPSTREAM_CONFIG_FILENAME),
            legacy_config_path: home.join(LEGACY_DIR_NAME).join(LEGACY_CONFIG_FILENAME),
        }
    }

    /// Build paths rooted at an arbitrary directory (used by tests).
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            config_dir: base.join(BRAIN_DIR_NAME),
            upstream_config_path: base.join(UPSTREAM_DIR_NAME).join(UPSTREAM_CONFIG_FILENAME),
            legacy_config_path: base.join(LEGACY_DIR_NAME).join(LEGACY_CONFIG_FILENAME),
        }
    }

    /// `<config_dir>/config.json`
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILENAME)
    }

    /// `<config_dir>/locks/`
    pub fn lock_dir(&self) -> PathBuf {
        self.config_dir.join(LOCK_DIR_NAME)
    }

    /// `<config_dir>/rollback/`
    pub fn rollback_dir(&self) -> PathBuf {
        self.config_dir.join(ROLLBACK_DIR_NAME)
    }

    /// `<config_dir>/manifests/`
    pub fn manifest_dir(&self) -> PathBuf {
        self.config_dir.join(MANIFEST_DIR_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn expand_tilde_replaces_leading_tilde() {
        let expanded = expand_tilde(Path::new("~/memories"));
        assert!(!expanded.to_string_lossy().contains('~'));
        assert!(expanded.ends_with("memories"));
    }

    #[test]
    fn expand_tilde_leaves_plain_paths_alone() {
        let path = Path::new("/workspace/alpha");
        assert_eq!(expand_tilde(path), path);
    }

    #[test]
    fn rooted_paths_stay_under_base() {
        let temp = TempDir::new().unwrap();
        let paths = BrainPaths::rooted_at(temp.path());
        assert!(paths.config_path().starts_with(temp.path()));
        assert!(paths.lock_dir().starts_with(temp.path()));
        assert!(paths.rollback_dir().starts_with(temp.path()));
        assert!(paths.manifest_dir().starts_with(temp.path()));
        assert!(paths.upstream_config_path.starts_with(temp.path()));
        assert!(paths.legacy_config_path.starts_with(temp.path()));
    }

    #[test]
    fn ensure_secure_dir_creates_with_restricted_mode() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("secure");
        ensure_secure_dir(&dir).unwrap();
        assert!(dir.is_dir());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }
}
