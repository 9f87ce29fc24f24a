//! Per-directory watch supervision.
//!
//! A [`WatchSupervisor`] owns the watch, stability gate and archive
//! scheduler for one monitored directory and keeps the watch alive across
//! failures:
//!
//! ```text
//! STARTING ──▶ RUNNING ──(watch invalid)──▶ RESTARTING ──▶ RUNNING
//!                 │                              │
//!                 │ shutdown                     │ restart_count == limit
//!                 ▼                              ▼
//!              STOPPED ◀──────────────────── STOPPED
//! ```
//!
//! Every watch failure increments the restart counter; the counter never
//! resets. Once it reaches the limit the supervisor stops for good and
//! listeners receive `on_monitor_failed`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use archwatch_config::{MonitorConfig, MonitorSettings};

use crate::fingerprint::{self, FingerprintError, HashAlgorithm};
use crate::listener::{Listeners, MonitorListener};
use crate::scheduler::{ArchiveReport, ArchiveScheduler, DEFAULT_SHUTDOWN_GRACE, SchedulerConfig};
use crate::stability::{DEFAULT_STABILITY_INTERVAL, StabilityGate};
use crate::watch::{DirectoryWatch, EntryKind, WatchBackend, WatchEvent, WatchOpener};

/// Default number of watch failures tolerated before stopping.
pub const DEFAULT_RESTART_LIMIT: u32 = 2;

/// Errors raised while constructing a supervisor. Any of these means the
/// directory is never watched.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The config entry itself is malformed.
    #[error("invalid monitor config: {0}")]
    InvalidConfig(String),

    /// The source folder is missing or not a directory.
    #[error("monitored path is not a valid directory: {0}")]
    SourceInvalid(PathBuf),

    /// The archive folder could not be created.
    #[error("failed to create archive directory {path}: {source}")]
    ArchiveCreate { path: PathBuf, source: io::Error },

    /// The archive path exists but is a file.
    #[error("archive path exists but is not a directory: {0}")]
    ArchiveNotDirectory(PathBuf),

    /// The configured hash algorithm is unknown.
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
}

/// Lifecycle position of a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorStatus {
    Starting,
    Running,
    Restarting,
    Stopped,
}

/// Why a supervisor reached [`SupervisorStatus::Stopped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was requested by the owner.
    Shutdown,
    /// The watch failed `restart_limit` times.
    RestartsExhausted,
}

/// Snapshot of a supervisor's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorState {
    pub restart_count: u32,
    pub status: SupervisorStatus,
    pub stop_reason: Option<StopReason>,
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self {
            restart_count: 0,
            status: SupervisorStatus::Starting,
            stop_reason: None,
        }
    }
}

/// Runtime knobs shared by supervisors.
#[derive(Clone)]
pub struct SupervisorOptions {
    pub stability_interval: Duration,
    pub restart_limit: u32,
    pub restart_backoff: Duration,
    pub shutdown_grace: Duration,
    pub algorithm: HashAlgorithm,
    pub dedupe_pending: bool,
    pub opener: Arc<dyn WatchOpener>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            stability_interval: DEFAULT_STABILITY_INTERVAL,
            restart_limit: DEFAULT_RESTART_LIMIT,
            restart_backoff: Duration::from_secs(1),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            algorithm: HashAlgorithm::default(),
            dedupe_pending: true,
            opener: Arc::new(WatchBackend::Native),
        }
    }
}

impl SupervisorOptions {
    /// Build options from config file settings.
    pub fn from_settings(settings: &MonitorSettings) -> Result<Self, SupervisorError> {
        Ok(Self {
            stability_interval: settings.stability_interval(),
            restart_limit: settings.restart_limit.max(1),
            restart_backoff: settings.restart_backoff(),
            shutdown_grace: settings.shutdown_grace(),
            algorithm: settings.hash_algorithm.parse()?,
            dedupe_pending: settings.dedupe_pending,
            opener: Arc::new(WatchBackend::from_settings(settings)),
        })
    }

    /// Replace the watch backend.
    pub fn with_opener(mut self, opener: Arc<dyn WatchOpener>) -> Self {
        self.opener = opener;
        self
    }
}

impl std::fmt::Debug for SupervisorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorOptions")
            .field("stability_interval", &self.stability_interval)
            .field("restart_limit", &self.restart_limit)
            .field("restart_backoff", &self.restart_backoff)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("algorithm", &self.algorithm)
            .field("dedupe_pending", &self.dedupe_pending)
            .finish_non_exhaustive()
    }
}

enum PumpExit {
    Shutdown,
    Invalid,
}

/// Watches one directory and archives what appears in it.
pub struct WatchSupervisor {
    config: MonitorConfig,
    options: SupervisorOptions,
    gate: StabilityGate,
    scheduler: ArchiveScheduler,
    listeners: Listeners,
    state: Arc<RwLock<SupervisorState>>,
}

impl WatchSupervisor {
    /// Validate the directories and start the archive scheduler.
    ///
    /// Creates the archive directory when it is missing. Must be called from
    /// within a tokio runtime.
    pub fn new(config: MonitorConfig, options: SupervisorOptions) -> Result<Self, SupervisorError> {
        config.validate().map_err(SupervisorError::InvalidConfig)?;

        let source = &config.source_folder;
        if !source.is_dir() {
            error!(source = %source.display(), "Monitored path is not a valid directory");
            return Err(SupervisorError::SourceInvalid(source.clone()));
        }

        let archive = &config.archive_folder;
        if !archive.exists() {
            std::fs::create_dir_all(archive).map_err(|e| {
                error!(archive = %archive.display(), error = %e, "Failed to create archive directory");
                SupervisorError::ArchiveCreate {
                    path: archive.clone(),
                    source: e,
                }
            })?;
            info!(archive = %archive.display(), "Created archive directory");
        } else if !archive.is_dir() {
            error!(archive = %archive.display(), "Archive path exists but is not a directory");
            return Err(SupervisorError::ArchiveNotDirectory(archive.clone()));
        }

        let scheduler = ArchiveScheduler::new(SchedulerConfig {
            archive_dir: archive.clone(),
            algorithm: options.algorithm,
            dedupe_pending: options.dedupe_pending,
        });

        Ok(Self {
            gate: StabilityGate::new(options.stability_interval),
            config,
            options,
            scheduler,
            listeners: Listeners::new(),
            state: Arc::new(RwLock::new(SupervisorState::default())),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Register a listener. Listeners are invoked in registration order.
    pub fn add_listener(&self, listener: Arc<dyn MonitorListener>) {
        self.listeners.add(listener);
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Current state snapshot.
    pub fn state(&self) -> SupervisorState {
        self.state.read().clone()
    }

    /// Reports for every archival task this supervisor's scheduler fires.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<ArchiveReport> {
        self.scheduler.subscribe()
    }

    /// Run on a dedicated task.
    pub fn spawn(self, shutdown: CancellationToken) -> SupervisorHandle {
        let source = self.config.source_folder.clone();
        let state = self.state.clone();
        let token = shutdown.clone();
        let join = tokio::spawn(self.run(shutdown));
        SupervisorHandle {
            source,
            state,
            shutdown: token,
            join,
        }
    }

    /// Watch until `shutdown` is cancelled or the restart budget is spent.
    ///
    /// On exit the scheduler is given the shutdown grace period to fire
    /// tasks that are already due; the rest are dropped.
    pub async fn run(self, shutdown: CancellationToken) -> SupervisorState {
        let source = self.config.source_folder.clone();
        info!(
            source = %source.display(),
            archive = %self.config.archive_folder.display(),
            action = %self.config.action,
            "Files will be archived from '{}' to '{}' after {} {}",
            source.display(),
            self.config.archive_folder.display(),
            self.config.delay,
            self.config.unit
        );

        let reason = self.supervise(&shutdown).await;

        if reason == StopReason::RestartsExhausted {
            error!(
                source = %source.display(),
                restart_count = self.state.read().restart_count,
                "Watch failed permanently, directory is no longer monitored"
            );
            self.listeners.notify_failed(&source);
        }

        let abandoned = self.scheduler.shutdown(self.options.shutdown_grace).await;

        let final_state = {
            let mut state = self.state.write();
            state.status = SupervisorStatus::Stopped;
            state.stop_reason = Some(reason);
            state.clone()
        };

        info!(
            source = %source.display(),
            ?reason,
            abandoned,
            "Monitoring stopped"
        );
        final_state
    }

    async fn supervise(&self, shutdown: &CancellationToken) -> StopReason {
        let source = self.config.source_folder.as_path();
        let mut opened = self.options.opener.open(source);

        loop {
            match opened {
                Ok(mut watch) => {
                    self.set_status(SupervisorStatus::Running);
                    info!(source = %source.display(), "Monitoring for new entries");

                    let exit = self.pump(watch.as_mut(), shutdown).await;
                    watch.invalidate();
                    if let PumpExit::Shutdown = exit {
                        return StopReason::Shutdown;
                    }
                }
                Err(e) => {
                    warn!(source = %source.display(), error = %e, "Failed to open directory watch");
                }
            }

            let restart_count = {
                let mut state = self.state.write();
                state.restart_count += 1;
                state.restart_count
            };
            if restart_count >= self.options.restart_limit {
                return StopReason::RestartsExhausted;
            }

            self.set_status(SupervisorStatus::Restarting);
            info!(source = %source.display(), restart_count, "Restarting monitoring");

            tokio::select! {
                _ = shutdown.cancelled() => return StopReason::Shutdown,
                _ = tokio::time::sleep(self.options.restart_backoff) => {}
            }

            opened = self.options.opener.open(source);
        }
    }

    async fn pump(&self, watch: &mut dyn DirectoryWatch, shutdown: &CancellationToken) -> PumpExit {
        loop {
            let batch = tokio::select! {
                _ = shutdown.cancelled() => return PumpExit::Shutdown,
                batch = watch.next_batch() => batch,
            };

            let events = match batch {
                Ok(events) => events,
                Err(e) => {
                    warn!(source = %watch.directory().display(), error = %e, "Directory watch failed");
                    return PumpExit::Invalid;
                }
            };

            for event in events {
                if shutdown.is_cancelled() {
                    return PumpExit::Shutdown;
                }
                self.handle(event, shutdown).await;
            }
        }
    }

    async fn handle(&self, event: WatchEvent, shutdown: &CancellationToken) {
        match event.kind {
            EntryKind::Folder => {
                info!(
                    path = %event.path.display(),
                    "[CREATED] Detected new directory (will not {})",
                    self.config.action
                );
                self.listeners.notify_detected(&event.path, EntryKind::Folder);
            }
            EntryKind::File => {
                info!(path = %event.path.display(), "[CREATED] Detected new file");

                let settled = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    settled = self.gate.wait(&event.path) => settled,
                };
                if let Err(e) = settled {
                    warn!(path = %event.path.display(), error = %e, "Skipping file");
                    return;
                }

                self.listeners.notify_detected(&event.path, EntryKind::File);
                self.arm(event.path).await;
            }
        }
    }

    async fn arm(&self, path: PathBuf) {
        let algorithm = self.options.algorithm;
        let hash_path = path.clone();
        let fingerprint =
            match tokio::task::spawn_blocking(move || fingerprint::compute(&hash_path, algorithm)).await {
                Ok(Ok(fp)) => fp,
                Ok(Err(e)) => {
                    warn!(path = %path.display(), error = %e, "No hash for file, skipping");
                    return;
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Fingerprint task panicked");
                    return;
                }
            };

        match self.scheduler.arm(
            path.clone(),
            fingerprint,
            self.config.delay_duration(),
            self.config.action,
        ) {
            Ok(handle) => debug!(path = %path.display(), task = %handle.id, "Archival armed"),
            Err(e) => warn!(path = %path.display(), error = %e, "Could not arm archival"),
        }
    }

    fn set_status(&self, status: SupervisorStatus) {
        self.state.write().status = status;
    }
}

/// Handle to a supervisor running on its own task.
pub struct SupervisorHandle {
    source: PathBuf,
    state: Arc<RwLock<SupervisorState>>,
    shutdown: CancellationToken,
    join: JoinHandle<SupervisorState>,
}

impl SupervisorHandle {
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Current state snapshot.
    pub fn state(&self) -> SupervisorState {
        self.state.read().clone()
    }

    /// Ask this supervisor to stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether the supervisor task has finished.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the supervisor to stop and return its final state.
    pub async fn join(self) -> SupervisorState {
        match self.join.await {
            Ok(state) => state,
            Err(e) => {
                error!(source = %self.source.display(), error = %e, "Supervisor task failed");
                let mut state = self.state.read().clone();
                state.status = SupervisorStatus::Stopped;
                state
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use archwatch_config::{ArchiveAction, TimeUnit};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::{TempDir, tempdir};

    use crate::scheduler::ArchiveOutcome;
    use crate::watch::{WatchError, WatchResult};

    /// Replays scripted batches, then blocks forever.
    struct ScriptedWatch {
        directory: PathBuf,
        batches: VecDeque<WatchResult<Vec<WatchEvent>>>,
    }

    #[async_trait]
    impl DirectoryWatch for ScriptedWatch {
        fn directory(&self) -> &Path {
            &self.directory
        }

        async fn next_batch(&mut self) -> WatchResult<Vec<WatchEvent>> {
            match self.batches.pop_front() {
                Some(batch) => batch,
                None => std::future::pending().await,
            }
        }

        fn invalidate(&mut self) {
            self.batches.clear();
        }
    }

    /// Hands out one script per open; fails opens once scripts run out.
    #[derive(Default)]
    struct ScriptedOpener {
        scripts: Mutex<VecDeque<Vec<WatchResult<Vec<WatchEvent>>>>>,
        opens: AtomicUsize,
        fail_opens: bool,
    }

    impl ScriptedOpener {
        fn always_invalid() -> Self {
            let opener = Self::default();
            for _ in 0..10 {
                opener.push(vec![Err(WatchError::WatchInvalid(PathBuf::from("scripted")))]);
            }
            opener
        }

        fn push(&self, script: Vec<WatchResult<Vec<WatchEvent>>>) {
            self.scripts.lock().push_back(script);
        }

        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    impl WatchOpener for ScriptedOpener {
        fn open(&self, directory: &Path) -> WatchResult<Box<dyn DirectoryWatch>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_opens {
                return Err(WatchError::NotADirectory(directory.to_path_buf()));
            }
            let script = self
                .scripts
                .lock()
                .pop_front()
                .ok_or_else(|| WatchError::NotADirectory(directory.to_path_buf()))?;
            Ok(Box::new(ScriptedWatch {
                directory: directory.to_path_buf(),
                batches: script.into(),
            }))
        }
    }

    struct Fixture {
        _root: TempDir,
        source: PathBuf,
        archive: PathBuf,
    }

    fn fixture() -> Fixture {
        let root = tempdir().unwrap();
        let source = root.path().join("src");
        let archive = root.path().join("arch");
        fs::create_dir(&source).unwrap();
        Fixture {
            _root: root,
            source,
            archive,
        }
    }

    fn config(fx: &Fixture, action: ArchiveAction) -> MonitorConfig {
        MonitorConfig::new(&fx.source, &fx.archive, action, 50, TimeUnit::Milliseconds)
    }

    fn options(opener: Arc<ScriptedOpener>) -> SupervisorOptions {
        SupervisorOptions {
            stability_interval: Duration::from_millis(10),
            restart_backoff: Duration::ZERO,
            shutdown_grace: Duration::from_millis(500),
            ..SupervisorOptions::default()
        }
        .with_opener(opener)
    }

    #[derive(Default)]
    struct Recorder {
        detected: Mutex<Vec<(PathBuf, EntryKind)>>,
        failed: Mutex<Vec<PathBuf>>,
    }

    impl MonitorListener for Recorder {
        fn on_detected(&self, path: &Path, kind: EntryKind) {
            self.detected.lock().push((path.to_path_buf(), kind));
        }

        fn on_monitor_failed(&self, directory: &Path) {
            self.failed.lock().push(directory.to_path_buf());
        }
    }

    #[tokio::test]
    async fn test_new_creates_archive_directory() {
        let fx = fixture();
        let sup = WatchSupervisor::new(
            config(&fx, ArchiveAction::Copy),
            options(Arc::new(ScriptedOpener::default())),
        )
        .unwrap();

        assert!(fx.archive.is_dir());
        assert_eq!(sup.state(), SupervisorState::default());
    }

    #[tokio::test]
    async fn test_new_rejects_missing_source() {
        let fx = fixture();
        let mut cfg = config(&fx, ArchiveAction::Copy);
        cfg.source_folder = fx.source.join("missing");

        let err = WatchSupervisor::new(cfg, SupervisorOptions::default()).err().unwrap();
        assert!(matches!(err, SupervisorError::SourceInvalid(_)));
        assert!(!fx.archive.exists());
    }

    #[tokio::test]
    async fn test_new_rejects_file_as_archive() {
        let fx = fixture();
        fs::write(&fx.archive, "not a dir").unwrap();

        let err = WatchSupervisor::new(config(&fx, ArchiveAction::Move), SupervisorOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, SupervisorError::ArchiveNotDirectory(_)));
    }

    #[tokio::test]
    async fn test_new_rejects_zero_delay() {
        let fx = fixture();
        let mut cfg = config(&fx, ArchiveAction::Move);
        cfg.delay = 0;
        let err = WatchSupervisor::new(cfg, SupervisorOptions::default()).err().unwrap();
        assert!(matches!(err, SupervisorError::InvalidConfig(_)));
    }

    #[test]
    fn test_options_from_settings() {
        let settings = MonitorSettings {
            hash_algorithm: "sha256".to_string(),
            restart_limit: 4,
            ..MonitorSettings::default()
        };
        let opts = SupervisorOptions::from_settings(&settings).unwrap();
        assert_eq!(opts.algorithm, HashAlgorithm::Sha256);
        assert_eq!(opts.restart_limit, 4);

        let settings = MonitorSettings {
            hash_algorithm: "crc32".to_string(),
            ..MonitorSettings::default()
        };
        assert!(matches!(
            SupervisorOptions::from_settings(&settings),
            Err(SupervisorError::Fingerprint(FingerprintError::HashUnavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_stops_after_two_failures() {
        let fx = fixture();
        let opener = Arc::new(ScriptedOpener::always_invalid());
        let sup = WatchSupervisor::new(config(&fx, ArchiveAction::Copy), options(opener.clone())).unwrap();
        let recorder = Arc::new(Recorder::default());
        sup.add_listener(recorder.clone());

        let state = tokio::time::timeout(Duration::from_secs(5), sup.run(CancellationToken::new()))
            .await
            .unwrap();

        assert_eq!(state.restart_count, 2);
        assert_eq!(state.status, SupervisorStatus::Stopped);
        assert_eq!(state.stop_reason, Some(StopReason::RestartsExhausted));
        // Initial open plus one restart; no third attempt.
        assert_eq!(opener.opens(), 2);
        assert_eq!(*recorder.failed.lock(), vec![fx.source.clone()]);
    }

    #[tokio::test]
    async fn test_restart_limit_is_configurable() {
        let fx = fixture();
        let opener = Arc::new(ScriptedOpener::always_invalid());
        let opts = SupervisorOptions {
            restart_limit: 3,
            ..options(opener.clone())
        };
        let sup = WatchSupervisor::new(config(&fx, ArchiveAction::Copy), opts).unwrap();

        let state = sup.run(CancellationToken::new()).await;
        assert_eq!(state.restart_count, 3);
        assert_eq!(opener.opens(), 3);
    }

    #[tokio::test]
    async fn test_failed_reopen_counts_as_failure() {
        let fx = fixture();
        let opener = Arc::new(ScriptedOpener {
            fail_opens: true,
            ..ScriptedOpener::default()
        });
        let sup = WatchSupervisor::new(config(&fx, ArchiveAction::Copy), options(opener.clone())).unwrap();

        let state = sup.run(CancellationToken::new()).await;
        assert_eq!(state.stop_reason, Some(StopReason::RestartsExhausted));
        assert_eq!(opener.opens(), 2);
    }

    #[tokio::test]
    async fn test_recovers_after_single_failure() {
        let fx = fixture();
        let file = fx.source.join("after-restart.txt");
        fs::write(&file, "payload").unwrap();

        let opener = Arc::new(ScriptedOpener::default());
        opener.push(vec![Err(WatchError::WatchInvalid(fx.source.clone()))]);
        opener.push(vec![Ok(vec![WatchEvent::new(&file, EntryKind::File)])]);

        let sup = WatchSupervisor::new(config(&fx, ArchiveAction::Copy), options(opener.clone())).unwrap();
        let mut reports = sup.subscribe_reports();
        let token = CancellationToken::new();
        let handle = sup.spawn(token.clone());

        let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(report.outcome, ArchiveOutcome::Archived { .. }));
        assert_eq!(handle.state().status, SupervisorStatus::Running);
        assert_eq!(handle.state().restart_count, 1);

        handle.shutdown();
        let state = handle.join().await;
        assert_eq!(state.stop_reason, Some(StopReason::Shutdown));
        assert_eq!(opener.opens(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_watch() {
        let fx = fixture();
        let opener = Arc::new(ScriptedOpener::default());
        opener.push(Vec::new());
        let sup = WatchSupervisor::new(config(&fx, ArchiveAction::Copy), options(opener)).unwrap();

        let token = CancellationToken::new();
        let handle = sup.spawn(token.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.state().status, SupervisorStatus::Running);

        token.cancel();
        let state = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap();
        assert_eq!(state.status, SupervisorStatus::Stopped);
        assert_eq!(state.stop_reason, Some(StopReason::Shutdown));
        assert_eq!(state.restart_count, 0);
    }

    #[tokio::test]
    async fn test_file_event_is_archived_and_listeners_notified() {
        let fx = fixture();
        let file = fx.source.join("test.txt");
        fs::write(&file, "hello").unwrap();

        let opener = Arc::new(ScriptedOpener::default());
        opener.push(vec![Ok(vec![WatchEvent::new(&file, EntryKind::File)])]);
        let sup = WatchSupervisor::new(config(&fx, ArchiveAction::Copy), options(opener)).unwrap();
        let recorder = Arc::new(Recorder::default());
        sup.add_listener(recorder.clone());
        let mut reports = sup.subscribe_reports();

        let handle = sup.spawn(CancellationToken::new());
        let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.path, file);
        assert_eq!(fs::read_to_string(fx.archive.join("test.txt")).unwrap(), "hello");
        assert_eq!(fs::read_to_string(&file).unwrap(), "hello");
        assert_eq!(*recorder.detected.lock(), vec![(file.clone(), EntryKind::File)]);

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_folder_event_is_never_archived() {
        let fx = fixture();
        let folder = fx.source.join("nested");
        fs::create_dir(&folder).unwrap();

        let opener = Arc::new(ScriptedOpener::default());
        opener.push(vec![Ok(vec![WatchEvent::new(&folder, EntryKind::Folder)])]);
        let sup = WatchSupervisor::new(config(&fx, ArchiveAction::Move), options(opener)).unwrap();
        let recorder = Arc::new(Recorder::default());
        sup.add_listener(recorder.clone());
        let mut reports = sup.subscribe_reports();

        let handle = sup.spawn(CancellationToken::new());
        let report = tokio::time::timeout(Duration::from_millis(300), reports.recv()).await;
        assert!(report.is_err());
        assert!(folder.is_dir());
        assert_eq!(fs::read_dir(&fx.archive).unwrap().count(), 0);
        assert_eq!(*recorder.detected.lock(), vec![(folder.clone(), EntryKind::Folder)]);

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_vanished_file_is_skipped_silently() {
        let fx = fixture();
        let ghost = fx.source.join("ghost.txt");
        let real = fx.source.join("real.txt");
        fs::write(&real, "real").unwrap();

        let opener = Arc::new(ScriptedOpener::default());
        opener.push(vec![Ok(vec![
            WatchEvent::new(&ghost, EntryKind::File),
            WatchEvent::new(&real, EntryKind::File),
        ])]);
        let sup = WatchSupervisor::new(config(&fx, ArchiveAction::Delete), options(opener)).unwrap();
        let recorder = Arc::new(Recorder::default());
        sup.add_listener(recorder.clone());
        let mut reports = sup.subscribe_reports();

        let handle = sup.spawn(CancellationToken::new());
        let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.path, real);
        assert_eq!(report.outcome, ArchiveOutcome::Deleted);
        assert_eq!(*recorder.detected.lock(), vec![(real.clone(), EntryKind::File)]);
        assert_eq!(handle.state().restart_count, 0);

        handle.shutdown();
        handle.join().await;
    }
}
