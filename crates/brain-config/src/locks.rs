//! Hierarchical filesystem lock manager
//!
//! Inter-process coordination uses create-exclusive lock files under the
//! lock directory (0700). Each lock file is 0600 and carries a JSON record
//! `{pid, timestamp, hostname, lockType, project?}` for debugging.
//!
//! Lock kinds:
//! - **Global** - one per user; blocks project locks held by a *different*
//!   process while active
//! - **Project** - keyed by sanitized project name; project locks do not
//!   block each other
//! - **Config** - serializes operations on the user config file
//!
//! Acquisition retries every 100 ms until the timeout. A lock file whose
//! mtime is older than the stale age is treated as abandoned and removed.
//! Multi-project acquisition is by sorted name to prevent deadlock; on
//! failure the already-acquired locks are released in reverse order.
//! Tokens release on drop, so the `with_*_lock` helpers cannot leak a lock
//! even when the closure panics or its future is cancelled mid-await.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::{
    CONFIG_LOCK_FILENAME, CONFIG_LOCK_TIMEOUT, FILE_MODE, GLOBAL_LOCK_FILENAME,
    GLOBAL_LOCK_TIMEOUT, LOCK_RETRY_INTERVAL, PROJECT_LOCK_TIMEOUT, STALE_LOCK_AGE,
};
use crate::paths::ensure_secure_dir;

/// Kind of lock, recorded in the lock file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockKind {
    Global,
    Project,
    Config,
}

/// Debug record written into every lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub pid: u32,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub hostname: String,
    pub lock_type: LockKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

/// Errors surfaced by lock operations
#[derive(Debug, Clone, Error)]
pub enum LockError {
    #[error("Timed out acquiring {resource} lock after {waited_ms} ms")]
    Timeout { resource: String, waited_ms: u128 },

    #[error("Lock filesystem error on {path}: {message}")]
    Filesystem { path: PathBuf, message: String },
}

/// Proof that this process holds a lock. Dropping the token removes the
/// lock file, so a panic or a cancelled future inside a `with_*_lock`
/// closure never leaves the lock behind.
#[derive(Debug)]
pub struct LockToken {
    path: PathBuf,
    kind: LockKind,
    project: Option<String>,
    registry: Arc<Mutex<HashSet<PathBuf>>>,
    released: bool,
}

impl LockToken {
    pub fn kind(&self) -> LockKind {
        self.kind
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    fn remove(&mut self) -> std::io::Result<()> {
        self.released = true;
        match self.registry.lock() {
            Ok(mut held) => {
                held.remove(&self.path);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&self.path);
            }
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.remove() {
            warn!(path = %self.path.display(), error = %e, "Failed to release lock on drop");
        }
    }
}

/// One per process. Tracks every locally-held lock so exit handlers can
/// release them all.
#[derive(Debug)]
pub struct LockManager {
    lock_dir: PathBuf,
    stale_age: Duration,
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

fn resolve_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Keep project names filesystem-safe; anything outside `[A-Za-z0-9._-]`
/// becomes a dash.
pub fn sanitize_project_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

impl LockManager {
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
            stale_age: STALE_LOCK_AGE,
            held: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Override the stale-lock age (tests use a short one)
    pub fn with_stale_age(mut self, stale_age: Duration) -> Self {
        self.stale_age = stale_age;
        self
    }

    fn lock_path(&self, kind: LockKind, project: Option<&str>) -> PathBuf {
        match kind {
            LockKind::Global => self.lock_dir.join(GLOBAL_LOCK_FILENAME),
            LockKind::Config => self.lock_dir.join(CONFIG_LOCK_FILENAME),
            LockKind::Project => {
                let name = sanitize_project_name(project.unwrap_or_default());
                self.lock_dir.join(format!("project-{name}.lock"))
            }
        }
    }

    /// Acquire the global lock with the default 60 s timeout
    pub async fn acquire_global(&self) -> Result<LockToken, LockError> {
        self.acquire(LockKind::Global, None, GLOBAL_LOCK_TIMEOUT).await
    }

    /// Acquire a project lock with the default 30 s timeout
    pub async fn acquire_project(&self, project: &str) -> Result<LockToken, LockError> {
        self.acquire(LockKind::Project, Some(project), PROJECT_LOCK_TIMEOUT)
            .await
    }

    /// Acquire the config-file lock with the default 5 s timeout
    pub async fn acquire_config(&self) -> Result<LockToken, LockError> {
        self.acquire(LockKind::Config, None, CONFIG_LOCK_TIMEOUT).await
    }

    /// Acquire with a caller-chosen timeout
    pub async fn acquire(
        &self,
        kind: LockKind,
        project: Option<&str>,
        timeout: Duration,
    ) -> Result<LockToken, LockError> {
        ensure_secure_dir(&self.lock_dir).map_err(|e| LockError::Filesystem {
            path: self.lock_dir.clone(),
            message: e.to_string(),
        })?;

        let path = self.lock_path(kind, project);
        let resource = match (kind, project) {
            (LockKind::Project, Some(name)) => format!("project '{name}'"),
            (LockKind::Global, _) => "global".to_string(),
            _ => "config".to_string(),
        };
        let started = Instant::now();

        loop {
            // A global lock held by another process blocks project locks.
            if kind == LockKind::Project && self.foreign_global_lock_active() {
                if started.elapsed() >= timeout {
                    return Err(LockError::Timeout {
                        resource,
                        waited_ms: started.elapsed().as_millis(),
                    });
                }
                tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                continue;
            }

            match self.try_create(&path, kind, project) {
                Ok(()) => {
                    self.register(&path);
                    debug!(path = %path.display(), "Acquired lock");
                    return Ok(LockToken {
                        path,
                        kind,
                        project: project.map(str::to_string),
                        registry: Arc::clone(&self.held),
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.is_stale(&path) {
                        debug!(path = %path.display(), "Removing stale lock file");
                        let _ = std::fs::remove_file(&path);
                        continue;
                    }
                    if started.elapsed() >= timeout {
                        return Err(LockError::Timeout {
                            resource,
                            waited_ms: started.elapsed().as_millis(),
                        });
                    }
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(e) => {
                    return Err(LockError::Filesystem {
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Acquire several project locks in sorted alphabetical order. On any
    /// failure the locks already acquired are released in reverse.
    pub async fn acquire_projects(
        &self,
        projects: &[&str],
        timeout: Duration,
    ) -> Result<Vec<LockToken>, LockError> {
        let mut sorted: Vec<&str> = projects.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut tokens = Vec::with_capacity(sorted.len());
        for name in sorted {
            match self.acquire(LockKind::Project, Some(name), timeout).await {
                Ok(token) => tokens.push(token),
                Err(e) => {
                    for token in tokens.into_iter().rev() {
                        if let Err(release_err) = self.release(token) {
                            warn!(error = %release_err, "Failed to release lock during unwind");
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(tokens)
    }

    /// Release a held lock explicitly, surfacing any filesystem error.
    /// Tokens that are merely dropped release themselves silently.
    pub fn release(&self, mut token: LockToken) -> Result<(), LockError> {
        let path = token.path.clone();
        token.remove().map_err(|e| LockError::Filesystem {
            path: path.clone(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), "Released lock");
        Ok(())
    }

    /// Release every lock this process holds. Called from exit handlers.
    pub fn release_all(&self) {
        let paths: Vec<PathBuf> = {
            let mut held = match self.held.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            held.drain().collect()
        };
        for path in paths {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove lock file on exit");
                }
            }
        }
    }

    /// Spawn a task that calls [`release_all`](Self::release_all) when the
    /// process receives SIGINT or SIGTERM (Ctrl-C elsewhere). The enclosing
    /// server calls this once after constructing the manager.
    pub fn install_exit_handler(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut terminate = match signal(SignalKind::terminate()) {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(error = %e, "Failed to install SIGTERM handler");
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
            debug!("Termination signal received, releasing held locks");
            manager.release_all();
        });
    }

    /// Run `f` while holding the config-file lock; the lock is released on
    /// every exit path.
    pub async fn with_config_lock<T, F, Fut>(&self, f: F) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let token = self.acquire_config().await?;
        let result = f().await;
        if let Err(e) = self.release(token) {
            warn!(error = %e, "Failed to release config lock");
        }
        Ok(result)
    }

    /// Run `f` while holding a project lock
    pub async fn with_project_lock<T, F, Fut>(
        &self,
        project: &str,
        f: F,
    ) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let token = self.acquire_project(project).await?;
        let result = f().await;
        if let Err(e) = self.release(token) {
            warn!(error = %e, "Failed to release project lock");
        }
        Ok(result)
    }

    /// Run `f` while holding the global lock
    pub async fn with_global_lock<T, F, Fut>(&self, f: F) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let token = self.acquire_global().await?;
        let result = f().await;
        if let Err(e) = self.release(token) {
            warn!(error = %e, "Failed to release global lock");
        }
        Ok(result)
    }

    fn try_create(
        &self,
        path: &Path,
        kind: LockKind,
        project: Option<&str>,
    ) -> std::io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(FILE_MODE);
        }
        let mut file = options.open(path)?;

        let record = LockRecord {
            pid: std::process::id(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            hostname: resolve_hostname(),
            lock_type: kind,
            project: project.map(str::to_string),
        };
        let contents = serde_json::to_string_pretty(&record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }

    fn is_stale(&self, path: &Path) -> bool {
        let Ok(metadata) = std::fs::metadata(path) else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        modified
            .elapsed()
            .map(|age| age > self.stale_age)
            .unwrap_or(false)
    }

    /// True when another process's global lock file is present and fresh.
    /// Our own global lock never blocks our own project locks. Stale global
    /// locks are removed here so they cannot wedge every project forever.
    fn foreign_global_lock_active(&self) -> bool {
        let path = self.lock_dir.join(GLOBAL_LOCK_FILENAME);
        if !path.exists() {
            return false;
        }
        if self.is_stale(&path) {
            debug!(path = %path.display(), "Removing stale global lock file");
            let _ = std::fs::remove_file(&path);
            return false;
        }
        match std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<LockRecord>(&raw).ok())
        {
            Some(record) => record.pid != std::process::id(),
            // Unreadable record: assume foreign until it goes stale
            None => true,
        }
    }

    fn register(&self, path: &Path) {
        match self.held.lock() {
            Ok(mut held) => {
                held.insert(path.to_path_buf());
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(path.to_path_buf());
            }
        }
    }

}
