//! Debounced reaction to manual edits of the config file
//!
//! Uses `notify` with a debouncer so a burst of editor writes collapses to
//! one processing pass. Each pass: reload, validate, diff against the
//! in-memory baseline, snapshot the old baseline, push the new config
//! upstream, promote it to baseline and rollback anchor, and publish a
//! `Reconfigure` event. An invalid edit publishes `ValidationError` and,
//! unless auto-rollback is disabled, restores the last-known-good config.
//!
//! While a content migration runs, changes are held as a single pending
//! flag and processed once when the migration ends.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use brain_config::paths::ensure_secure_dir;
use brain_config::store::ConfigStore;
use brain_core::config::UserConfig;
use brain_core::diff::ConfigDiff;
use notify::RecommendedWatcher;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::services::rollback_manager::{RollbackManager, RollbackTarget};
use crate::services::upstream_sync::UpstreamSyncService;

const EVENT_CHANNEL_SIZE: usize = 64;

/// Watcher lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Stopped,
    Starting,
    Running,
    Error,
}

/// Events published to the watcher's consumer
#[derive(Debug, Clone)]
pub enum WatcherEvent {
    /// The config file changed on disk (post-debounce)
    Change { path: PathBuf },
    /// A non-fatal failure inside the pipeline
    Error { message: String },
    /// The edited config failed schema validation
    ValidationError { message: String },
    /// Result of the auto-rollback triggered by an invalid edit
    Rollback {
        success: bool,
        snapshot_id: Option<String>,
        error: Option<String>,
    },
    /// A valid change was accepted; carries what changed
    Reconfigure { diff: ConfigDiff },
}

/// Errors from starting or stopping the watcher
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Watcher is already running")]
    AlreadyRunning,

    #[error("Failed to initialize rollback state: {0}")]
    Init(String),

    #[error("Failed to watch config file: {0}")]
    Watch(String),
}

/// Signals that a content migration is in progress. The watcher holds
/// edits while the gate is closed and processes one pass when it reopens.
#[derive(Debug, Clone)]
pub struct MigrationGate {
    tx: Arc<watch::Sender<bool>>,
}

impl MigrationGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn begin(&self) {
        let _ = self.tx.send(true);
    }

    pub fn end(&self) {
        let _ = self.tx.send(false);
    }
}

impl Default for MigrationGate {
    fn default() -> Self {
        Self::new()
    }
}

/// One per process. Watches the config file and drives the change
/// pipeline; consumers receive [`WatcherEvent`]s from the paired receiver.
pub struct ConfigWatcher {
    store: Arc<ConfigStore>,
    rollback: Arc<RollbackManager>,
    sync: Arc<UpstreamSyncService>,
    auto_rollback: AtomicBool,
    events_tx: mpsc::Sender<WatcherEvent>,
    baseline: Mutex<Option<UserConfig>>,
    state: RwLock<WatcherState>,
    pending_change: AtomicBool,
    migration_active: watch::Receiver<bool>,
    debouncer: RwLock<Option<Debouncer<RecommendedWatcher>>>,
}

impl ConfigWatcher {
    pub fn new(
        store: Arc<ConfigStore>,
        rollback: Arc<RollbackManager>,
        sync: Arc<UpstreamSyncService>,
        gate: &MigrationGate,
    ) -> (Arc<Self>, mpsc::Receiver<WatcherEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let watcher = Arc::new(Self {
            store,
            rollback,
            sync,
            auto_rollback: AtomicBool::new(true),
            events_tx,
            baseline: Mutex::new(None),
            state: RwLock::new(WatcherState::Stopped),
            pending_change: AtomicBool::new(false),
            migration_active: gate.subscribe(),
            debouncer: RwLock::new(None),
        });
        (watcher, events_rx)
    }

    /// Enable or disable the auto-rollback branch; when disabled, invalid
    /// edits only emit `ValidationError`.
    pub fn set_auto_rollback(&self, enabled: bool) {
        self.auto_rollback.store(enabled, Ordering::SeqCst);
    }

    pub async fn state(&self) -> WatcherState {
        *self.state.read().await
    }

    /// Initialize rollback state, load the baseline, and begin watching
    /// the config file.
    pub async fn start(self: Arc<Self>) -> Result<(), WatcherError> {
        {
            let mut state = self.state.write().await;
            if *state == WatcherState::Running {
                return Err(WatcherError::AlreadyRunning);
            }
            *state = WatcherState::Starting;
        }

        match Self::start_inner(&self).await {
            Ok(()) => {
                *self.state.write().await = WatcherState::Running;
                Ok(())
            }
            Err(e) => {
                *self.state.write().await = WatcherState::Error;
                Err(e)
            }
        }
    }

    async fn start_inner(this: &Arc<Self>) -> Result<(), WatcherError> {
        this.rollback
            .initialize()
            .await
            .map_err(|e| WatcherError::Init(e.to_string()))?;

        let baseline = this.store.load_sync();
        let debounce_ms = baseline.watcher.debounce_ms;
        *this.baseline.lock().await = Some(baseline);

        let config_dir = this.store.paths().config_dir.clone();
        let config_path = this.store.paths().config_path();
        ensure_secure_dir(&config_dir)
            .map_err(|e| WatcherError::Watch(e.to_string()))?;

        // The debouncer callback runs on the notify thread; it only flags
        // that the config file changed. All work happens on the task below.
        let (change_tx, mut change_rx) = mpsc::channel::<PathBuf>(EVENT_CHANNEL_SIZE);
        let watched = config_path.clone();
        let mut debouncer = new_debouncer(
            Duration::from_millis(debounce_ms),
            move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    if events.iter().any(|e| e.path == watched) {
                        if let Err(e) = change_tx.try_send(watched.clone()) {
                            warn!(error = %e, "Dropped config change notification");
                        }
                    }
                }
                Err(e) => error!(error = %e, "Config watcher backend error"),
            },
        )
        .map_err(|e| WatcherError::Watch(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&config_dir, notify::RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::Watch(e.to_string()))?;
        *this.debouncer.write().await = Some(debouncer);

        let task = Arc::clone(this);
        let mut migration_rx = this.migration_active.clone();
        let mut gate_alive = true;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = change_rx.recv() => {
                        let Some(path) = changed else { break };
                        task.emit(WatcherEvent::Change { path }).await;
                        task.process_change().await;
                    }
                    result = migration_rx.changed(), if gate_alive => {
                        if result.is_err() {
                            // Gate dropped; no migration will ever finish.
                            gate_alive = false;
                            continue;
                        }
                        let active = *migration_rx.borrow_and_update();
                        if !active && task.pending_change.swap(false, Ordering::SeqCst) {
                            debug!("Processing change held during migration");
                            task.process_change().await;
                        }
                    }
                }
            }
        });

        info!(path = %config_path.display(), debounce_ms, "Config watcher running");
        Ok(())
    }

    /// Stop watching. Held pending changes are discarded.
    pub async fn stop(&self) {
        self.debouncer.write().await.take();
        self.pending_change.store(false, Ordering::SeqCst);
        *self.state.write().await = WatcherState::Stopped;
        info!("Config watcher stopped");
    }

    /// One pass of the change pipeline.
    async fn process_change(&self) {
        if *self.migration_active.borrow() {
            self.pending_change.store(true, Ordering::SeqCst);
            debug!("Migration in progress, holding config change");
            return;
        }

        let new = match self.store.try_load_sync() {
            Ok(config) => config,
            Err(e) => {
                self.handle_invalid(e.to_string()).await;
                return;
            }
        };

        let mut baseline = self.baseline.lock().await;
        let diff = ConfigDiff::detect(baseline.as_ref(), &new);
        if !diff.has_changes {
            debug!("Config file touched but nothing changed");
            return;
        }

        if let Some(previous) = baseline.clone() {
            if let Err(e) = self.rollback.snapshot(&previous, "pre-change baseline").await {
                warn!(error = %e, "Failed to snapshot baseline before applying change");
            }
        }

        if let Err(e) = self.sync.sync(&new).await {
            self.emit(WatcherEvent::Error {
                message: format!("upstream sync failed: {e}"),
            })
            .await;
        }

        *baseline = Some(new.clone());
        drop(baseline);

        if let Err(e) = self.rollback.mark_as_good(&new, "watcher accepted change").await {
            warn!(error = %e, "Failed to anchor accepted config");
        }

        info!(
            added = diff.projects_added.len(),
            removed = diff.projects_removed.len(),
            modified = diff.projects_modified.len(),
            requires_migration = diff.requires_migration,
            "Config change accepted"
        );
        self.emit(WatcherEvent::Reconfigure { diff }).await;
    }

    async fn handle_invalid(&self, message: String) {
        warn!(%message, "Config edit failed validation");
        self.emit(WatcherEvent::ValidationError {
            message: message.clone(),
        })
        .await;

        if !self.auto_rollback.load(Ordering::SeqCst) {
            return;
        }

        match self.rollback.rollback(RollbackTarget::LastKnownGood).await {
            Ok(outcome) => {
                *self.baseline.lock().await = Some(outcome.restored);
                self.emit(WatcherEvent::Rollback {
                    success: true,
                    snapshot_id: Some(outcome.snapshot.id),
                    error: None,
                })
                .await;
            }
            Err(e) => {
                self.emit(WatcherEvent::Rollback {
                    success: false,
                    snapshot_id: None,
                    error: Some(e.to_string()),
                })
                .await;
            }
        }
    }

    async fn emit(&self, event: WatcherEvent) {
        if self.events_tx.send(event).await.is_err() {
            debug!("Watcher event dropped: consumer gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::NullUpstreamController;
    use brain_config::locks::LockManager;
    use brain_config::paths::BrainPaths;
    use brain_core::config::ProjectEntry;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: Arc<ConfigStore>,
        watcher: Arc<ConfigWatcher>,
        events: mpsc::Receiver<WatcherEvent>,
        gate: MigrationGate,
    }

    fn fixture(temp: TempDir) -> Fixture {
        let paths = BrainPaths::rooted_at(temp.path());
        let locks = Arc::new(LockManager::new(paths.lock_dir()));
        let store = Arc::new(ConfigStore::new(paths.clone(), locks.clone()));
        let sync = Arc::new(UpstreamSyncService::new(
            paths,
            locks,
            Arc::new(NullUpstreamController),
        ));
        let rollback = Arc::new(RollbackManager::new(store.clone(), sync.clone()));
        let gate = MigrationGate::new();
        let (watcher, events) = ConfigWatcher::new(store.clone(), rollback, sync, &gate);
        Fixture {
            _temp: temp,
            store,
            watcher,
            events,
            gate,
        }
    }

    /// Seed a saved config, initialize rollback (promoting it to anchor),
    /// and set it as the watcher baseline without starting notify.
    async fn seeded_fixture(config: &UserConfig) -> Fixture {
        let fx = fixture(TempDir::new().unwrap());
        fx.store.save(config).await.unwrap();
        fx.watcher.rollback.initialize().await.unwrap();
        *fx.watcher.baseline.lock().await = Some(config.clone());
        fx
    }

    fn config_with_project(name: &str) -> UserConfig {
        let mut config = UserConfig::default();
        config
            .projects
            .insert(name.into(), ProjectEntry::new(format!("/workspace/{name}")));
        config
    }

    #[tokio::test]
    async fn valid_edit_is_accepted_and_anchored() {
        let baseline = UserConfig::default();
        let mut fx = seeded_fixture(&baseline).await;

        let edited = config_with_project("alpha");
        fx.store.save(&edited).await.unwrap();

        fx.watcher.process_change().await;

        match fx.events.try_recv().unwrap() {
            WatcherEvent::Reconfigure { diff } => {
                assert_eq!(diff.projects_added, vec!["alpha".to_string()]);
                assert!(diff.requires_migration);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert_eq!(
            fx.watcher.baseline.lock().await.as_ref().unwrap(),
            &edited
        );
        let anchor = fx.watcher.rollback.last_known_good().await.unwrap();
        assert_eq!(anchor.config, edited);
        // The old baseline was snapshotted.
        assert_eq!(fx.watcher.rollback.history_len().await, 1);
    }

    #[tokio::test]
    async fn touch_without_change_is_silent() {
        let baseline = config_with_project("alpha");
        let mut fx = seeded_fixture(&baseline).await;

        fx.watcher.process_change().await;
        assert!(fx.events.try_recv().is_err());
        assert_eq!(fx.watcher.rollback.history_len().await, 0);
    }

    #[tokio::test]
    async fn invalid_edit_rolls_back_to_anchor() {
        let baseline = config_with_project("alpha");
        let mut fx = seeded_fixture(&baseline).await;

        // Simulate a bad manual edit.
        std::fs::write(fx.store.paths().config_path(), "{not valid json").unwrap();

        fx.watcher.process_change().await;

        assert!(matches!(
            fx.events.try_recv().unwrap(),
            WatcherEvent::ValidationError { .. }
        ));
        match fx.events.try_recv().unwrap() {
            WatcherEvent::Rollback { success, .. } => assert!(success),
            other => panic!("unexpected event: {other:?}"),
        }

        // The file holds the anchor config again and the baseline matches.
        assert_eq!(fx.store.load().await.unwrap(), baseline);
        assert_eq!(
            fx.watcher.baseline.lock().await.as_ref().unwrap(),
            &baseline
        );
    }

    #[tokio::test]
    async fn schema_violation_also_triggers_rollback() {
        let baseline = config_with_project("alpha");
        let mut fx = seeded_fixture(&baseline).await;

        let mut bad = baseline.clone();
        bad.defaults.memories_location = "/etc/memories".into();
        let contents = serde_json::to_string_pretty(&bad).unwrap();
        std::fs::write(fx.store.paths().config_path(), contents).unwrap();

        fx.watcher.process_change().await;

        assert!(matches!(
            fx.events.try_recv().unwrap(),
            WatcherEvent::ValidationError { .. }
        ));
        assert!(matches!(
            fx.events.try_recv().unwrap(),
            WatcherEvent::Rollback { success: true, .. }
        ));
        assert_eq!(fx.store.load().await.unwrap(), baseline);
    }

    #[tokio::test]
    async fn disabled_auto_rollback_only_reports() {
        let baseline = config_with_project("alpha");
        let mut fx = seeded_fixture(&baseline).await;
        fx.watcher.set_auto_rollback(false);

        std::fs::write(fx.store.paths().config_path(), "{not valid json").unwrap();
        fx.watcher.process_change().await;

        assert!(matches!(
            fx.events.try_recv().unwrap(),
            WatcherEvent::ValidationError { .. }
        ));
        assert!(fx.events.try_recv().is_err());
        // The broken file is left for the user to fix.
        assert!(fx.store.try_load_sync().is_err());
    }

    #[tokio::test]
    async fn changes_are_held_while_migration_is_active() {
        let baseline = UserConfig::default();
        let mut fx = seeded_fixture(&baseline).await;
        fx.gate.begin();

        fx.store.save(&config_with_project("alpha")).await.unwrap();
        fx.watcher.process_change().await;

        assert!(fx.events.try_recv().is_err());
        assert!(fx.watcher.pending_change.load(Ordering::SeqCst));
        assert_eq!(
            fx.watcher.baseline.lock().await.as_ref().unwrap(),
            &baseline
        );

        // After the gate opens a pass goes through.
        fx.gate.end();
        fx.watcher.pending_change.store(false, Ordering::SeqCst);
        fx.watcher.process_change().await;
        assert!(matches!(
            fx.events.try_recv().unwrap(),
            WatcherEvent::Reconfigure { .. }
        ));
    }

    #[tokio::test]
    async fn rapid_edits_collapse_to_one_processing_pass() {
        let mut fx = fixture(TempDir::new().unwrap());
        let mut baseline = UserConfig::default();
        baseline.watcher.debounce_ms = 200;
        fx.store.save(&baseline).await.unwrap();

        fx.watcher.clone().start().await.unwrap();

        // An editor-style burst: the same new content written repeatedly,
        // all inside one debounce window.
        let mut edited = baseline.clone();
        edited
            .projects
            .insert("alpha".into(), ProjectEntry::new("/workspace/alpha"));
        let contents = serde_json::to_string_pretty(&edited).unwrap();
        for _ in 0..5 {
            std::fs::write(fx.store.paths().config_path(), &contents).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let diff = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match fx.events.recv().await {
                    Some(WatcherEvent::Reconfigure { diff }) => break diff,
                    Some(_) => continue,
                    None => panic!("event channel closed before reconfigure"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(diff.projects_added, vec!["alpha".to_string()]);

        // Nothing else fires once the burst has been processed.
        tokio::time::sleep(Duration::from_millis(600)).await;
        while let Ok(event) = fx.events.try_recv() {
            assert!(
                !matches!(event, WatcherEvent::Reconfigure { .. }),
                "burst produced a second reconfigure"
            );
        }

        fx.watcher.stop().await;
    }

    #[tokio::test]
    async fn start_watches_and_reports_running() {
        let fx = fixture(TempDir::new().unwrap());
        fx.store.save(&UserConfig::default()).await.unwrap();

        fx.watcher.clone().start().await.unwrap();
        assert_eq!(fx.watcher.state().await, WatcherState::Running);
        assert!(matches!(
            fx.watcher.clone().start().await,
            Err(WatcherError::AlreadyRunning)
        ));

        fx.watcher.stop().await;
        assert_eq!(fx.watcher.state().await, WatcherState::Stopped);
    }
}
