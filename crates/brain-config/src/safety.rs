//! Path-safety validation
//!
//! Every path the core persists or resolves goes through this module before
//! touching the filesystem. Checks run in a fixed order so rejection reasons
//! are deterministic: empty, NUL byte, encoded traversal, `..` segment, then
//! the system-root blocklist on the normalized absolute path.
//!
//! Two entry points exist because the blocklist only applies where the core
//! may create content: memory-store locations get the full check, while
//! `code_path` (the user's own code tree, read-only to us) skips the
//! blocklist.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::paths::expand_tilde;

/// Blocked system roots on Unix
const UNIX_BLOCKED_ROOTS: &[&str] = &[
    "/etc", "/usr", "/var", "/bin", "/sbin", "/lib", "/lib64", "/boot", "/dev", "/proc",
    "/sys", "/run", "/tmp", "/root",
];

/// Blocked system roots on Windows (checked textually on every platform so
/// a config written on one OS is rejected consistently on another)
const WINDOWS_BLOCKED_ROOTS: &[&str] = &[
    "c:\\windows",
    "c:\\program files",
    "c:\\program files (x86)",
    "c:\\programdata",
    "c:\\system volume information",
];

/// Why a path was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathSafetyError {
    #[error("Path is empty")]
    Empty,

    #[error("Path contains a NUL byte")]
    NullByte,

    #[error("Path contains encoded traversal sequence")]
    EncodedTraversal,

    #[error("Path contains a '..' traversal segment")]
    Traversal,

    #[error("Path resolves into blocked system location: {0}")]
    SystemPath(String),
}

/// Validate a memory-store path: full checks including the system-root
/// blocklist. Returns the normalized absolute path.
pub fn validate_memories_path(path: &str) -> Result<PathBuf, PathSafetyError> {
    validate_inner(path, true)
}

/// Validate a code path: emptiness, NUL, and traversal checks only.
/// Returns the normalized absolute path.
pub fn validate_code_path(path: &str) -> Result<PathBuf, PathSafetyError> {
    validate_inner(path, false)
}

fn validate_inner(path: &str, check_system_roots: bool) -> Result<PathBuf, PathSafetyError> {
    if path.trim().is_empty() {
        return Err(PathSafetyError::Empty);
    }
    if path.contains('\0') {
        return Err(PathSafetyError::NullByte);
    }
    if path.to_ascii_lowercase().contains("%2e%2e") {
        return Err(PathSafetyError::EncodedTraversal);
    }
    if path
        .split(['/', '\\'])
        .any(|segment| segment == "..")
    {
        return Err(PathSafetyError::Traversal);
    }

    if check_system_roots {
        // Windows roots are compared against the raw string because
        // backslashes are not separators on Unix.
        let lowered = path.to_ascii_lowercase();
        for root in WINDOWS_BLOCKED_ROOTS {
            if lowered == *root
                || lowered.starts_with(&format!("{root}\\"))
                || lowered.starts_with(&format!("{root}/"))
            {
                return Err(PathSafetyError::SystemPath(path.to_string()));
            }
        }
    }

    let normalized = normalize(Path::new(path));

    if check_system_roots && !is_under_home(&normalized) {
        let lowered = normalized.to_string_lossy().to_ascii_lowercase();
        for root in UNIX_BLOCKED_ROOTS {
            if lowered == *root || lowered.starts_with(&format!("{root}/")) {
                return Err(PathSafetyError::SystemPath(normalized.display().to_string()));
            }
        }
    }

    Ok(normalized)
}

/// The user's own home directory is always writable, even when it sits
/// under a blocked root (the root user's home is `/root`). Without this the
/// built-in `~/memories` default would be invalid for that user.
fn is_under_home(path: &Path) -> bool {
    match dirs::home_dir() {
        Some(home) if home != Path::new("/") => path.starts_with(&home),
        _ => false,
    }
}

/// Lexically normalize a path: expand a leading tilde, make it absolute
/// against the current directory, and drop `.` components. Symlinks are not
/// followed; `..` never survives because validation rejects it earlier.
pub fn normalize(path: &Path) -> PathBuf {
    let expanded = expand_tilde(path);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(expanded)
    };

    let mut result = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// True when `child` equals `base` or sits underneath it. Comparison is on
/// normalized components, so `/a/bb` is not within `/a/b`.
pub fn is_path_within(child: &Path, base: &Path) -> bool {
    let child = normalize(child);
    let base = normalize(base);
    child.starts_with(&base)
}
