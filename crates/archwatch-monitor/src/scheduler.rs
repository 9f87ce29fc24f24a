//! Delayed, fingerprint-guarded archival.
//!
//! Each [`ArchiveScheduler`] owns one worker task holding a timer queue
//! ordered by fire time. When a task fires the file is re-fingerprinted and
//! the configured action runs only if the content is unchanged:
//!
//! ```text
//! arm(path, fp, delay) ──▶ DelayQueue ──(delay)──▶ exists? ──▶ fp == fp'? ──▶ MOVE | COPY | DELETE
//!                                                      │no          │no
//!                                                      ▼            ▼
//!                                               SkippedMissing  SkippedChanged
//! ```
//!
//! Archival is at-most-once: failures are reported and logged, never retried.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::{debug, error, info, warn};

use archwatch_config::ArchiveAction;

use crate::fingerprint::{self, Fingerprint, FingerprintError, HashAlgorithm};

/// Longest delay the timer queue accepts; longer delays are clamped.
pub const MAX_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default grace period given to pending tasks on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Buffer of the report broadcast channel.
const REPORT_CAPACITY: usize = 256;

/// Errors returned by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler is shutting down and no longer accepts work.
    #[error("archive scheduler is shut down")]
    ShutDown,
}

/// Identifier of an armed task, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A file waiting for its delay to elapse.
#[derive(Debug, Clone)]
pub struct PendingArchival {
    pub id: TaskId,
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    pub action: ArchiveAction,
    pub armed_at: DateTime<Utc>,
}

/// Returned from [`ArchiveScheduler::arm`]; identifies the armed task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: TaskId,
    pub path: PathBuf,
    pub armed_at: DateTime<Utc>,
    pub delay: Duration,
}

/// What happened when a task fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// The file was moved or copied to `destination`.
    Archived { destination: PathBuf },
    /// The file was deleted.
    Deleted,
    /// The file no longer existed.
    SkippedMissing,
    /// The file could not be re-fingerprinted.
    SkippedUnreadable { error: String },
    /// The content changed since detection.
    SkippedChanged,
    /// The action itself failed.
    Failed { error: String },
    /// Shutdown grace expired before the task fired.
    Abandoned,
}

/// Emitted once for every task that fires or is abandoned.
#[derive(Debug, Clone)]
pub struct ArchiveReport {
    pub task: TaskId,
    pub path: PathBuf,
    pub action: ArchiveAction,
    pub outcome: ArchiveOutcome,
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Destination directory for MOVE and COPY.
    pub archive_dir: PathBuf,
    /// Digest used for the fire-time fingerprint.
    pub algorithm: HashAlgorithm,
    /// Replace a pending task when the same path is armed again.
    pub dedupe_pending: bool,
}

impl SchedulerConfig {
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
            algorithm: HashAlgorithm::default(),
            dedupe_pending: true,
        }
    }
}

enum Command {
    Arm(PendingArchival, Duration),
    Cancel(TaskId),
    Shutdown {
        grace: Duration,
        done: oneshot::Sender<usize>,
    },
}

/// Delayed-task queue serviced by a single worker.
pub struct ArchiveScheduler {
    commands: mpsc::UnboundedSender<Command>,
    reports: broadcast::Sender<ArchiveReport>,
    next_id: AtomicU64,
    accepting: AtomicBool,
    pending: Arc<AtomicUsize>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ArchiveScheduler {
    /// Start the worker. Must be called from within a tokio runtime.
    pub fn new(config: SchedulerConfig) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = Worker {
            config,
            queue: DelayQueue::new(),
            keys: HashMap::new(),
            by_path: HashMap::new(),
            reports: reports.clone(),
            pending: pending.clone(),
        };
        let handle = tokio::spawn(worker.run(rx));

        Self {
            commands,
            reports,
            next_id: AtomicU64::new(1),
            accepting: AtomicBool::new(true),
            pending,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Schedule `action` on `path` once `delay` has elapsed, guarded by
    /// `fingerprint`.
    pub fn arm(
        &self,
        path: PathBuf,
        fingerprint: Fingerprint,
        delay: Duration,
        action: ArchiveAction,
    ) -> Result<TaskHandle, SchedulerError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(SchedulerError::ShutDown);
        }

        let delay = if delay > MAX_DELAY {
            warn!(path = %path.display(), ?delay, "Delay exceeds one year, clamping");
            MAX_DELAY
        } else {
            delay
        };

        let task = PendingArchival {
            id: TaskId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            path,
            fingerprint,
            action,
            armed_at: Utc::now(),
        };
        let handle = TaskHandle {
            id: task.id,
            path: task.path.clone(),
            armed_at: task.armed_at,
            delay,
        };

        self.commands
            .send(Command::Arm(task, delay))
            .map_err(|_| SchedulerError::ShutDown)?;

        Ok(handle)
    }

    /// Drop a pending task without running it. Unknown or already fired
    /// tasks are ignored.
    pub fn cancel(&self, handle: &TaskHandle) {
        let _ = self.commands.send(Command::Cancel(handle.id));
    }

    /// Number of tasks waiting to fire.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether [`arm`](Self::arm) still accepts work.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Receive a report for every task that fires from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ArchiveReport> {
        self.reports.subscribe()
    }

    /// Stop accepting work, let tasks due within `grace` fire, then abandon
    /// the rest. Returns the number of abandoned tasks.
    ///
    /// Idempotent: later calls return 0.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        self.accepting.store(false, Ordering::Release);

        let Some(worker) = self.worker.lock().take() else {
            return 0;
        };

        let (done, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { grace, done }).is_err() {
            return 0;
        }

        let abandoned = rx.await.unwrap_or(0);
        if let Err(e) = worker.await {
            error!(error = %e, "Archive scheduler worker panicked");
        }
        abandoned
    }
}

impl Drop for ArchiveScheduler {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.abort();
        }
    }
}

struct Worker {
    config: SchedulerConfig,
    queue: DelayQueue<PendingArchival>,
    keys: HashMap<TaskId, delay_queue::Key>,
    by_path: HashMap<PathBuf, TaskId>,
    reports: broadcast::Sender<ArchiveReport>,
    pending: Arc<AtomicUsize>,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let shutdown = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Arm(task, delay)) => self.insert(task, delay),
                    Some(Command::Cancel(id)) => self.cancel(id),
                    Some(Command::Shutdown { grace, done }) => break Some((grace, done)),
                    None => break None,
                },
                Some(expired) = std::future::poll_fn(|cx| self.queue.poll_expired(cx)),
                    if !self.queue.is_empty() =>
                {
                    self.fire(expired.into_inner()).await;
                }
            }
        };

        let (grace, done) = match shutdown {
            Some((grace, done)) => (grace, Some(done)),
            None => (Duration::ZERO, None),
        };
        let abandoned = self.drain(grace).await;
        if let Some(done) = done {
            let _ = done.send(abandoned);
        }
    }

    fn insert(&mut self, task: PendingArchival, delay: Duration) {
        if self.config.dedupe_pending
            && let Some(previous) = self.by_path.get(&task.path).copied()
        {
            debug!(path = %task.path.display(), task = %previous, "Replacing pending archival");
            self.cancel(previous);
        }

        info!(
            path = %task.path.display(),
            action = %task.action,
            task = %task.id,
            ?delay,
            "Scheduling {} for '{}'",
            task.action,
            file_label(&task.path)
        );

        let id = task.id;
        self.by_path.insert(task.path.clone(), id);
        let key = self.queue.insert(task, delay);
        self.keys.insert(id, key);
        self.pending.store(self.keys.len(), Ordering::Release);
    }

    fn cancel(&mut self, id: TaskId) {
        if let Some(key) = self.keys.remove(&id) {
            let task = self.queue.remove(&key).into_inner();
            self.forget_path(&task);
            self.pending.store(self.keys.len(), Ordering::Release);
            debug!(path = %task.path.display(), task = %id, "Pending archival cancelled");
        }
    }

    fn forget_path(&mut self, task: &PendingArchival) {
        if self.by_path.get(&task.path) == Some(&task.id) {
            self.by_path.remove(&task.path);
        }
    }

    async fn fire(&mut self, task: PendingArchival) {
        self.keys.remove(&task.id);
        self.forget_path(&task);
        self.pending.store(self.keys.len(), Ordering::Release);

        let archive_dir = self.config.archive_dir.clone();
        let algorithm = self.config.algorithm;
        let job = task.clone();
        let outcome = tokio::task::spawn_blocking(move || execute(&job, &archive_dir, algorithm))
            .await
            .unwrap_or_else(|e| ArchiveOutcome::Failed {
                error: format!("archive task panicked: {e}"),
            });

        self.report(task, outcome);
    }

    /// Fire whatever comes due within `grace`, then abandon the rest.
    ///
    /// A task still executing at the deadline is no longer awaited. Its
    /// blocking action cannot be interrupted and may still complete; it is
    /// reported as abandoned.
    async fn drain(&mut self, grace: Duration) -> usize {
        let mut overrun = 0;
        if !self.queue.is_empty() && !grace.is_zero() {
            info!(pending = self.queue.len(), ?grace, "Draining pending archivals");
            let deadline = tokio::time::Instant::now() + grace;
            while !self.queue.is_empty() {
                tokio::select! {
                    Some(expired) = std::future::poll_fn(|cx| self.queue.poll_expired(cx)) => {
                        let task = expired.into_inner();
                        let unfinished = task.clone();
                        if tokio::time::timeout_at(deadline, self.fire(task)).await.is_err() {
                            warn!(
                                path = %unfinished.path.display(),
                                task = %unfinished.id,
                                "Archival still running at shutdown deadline, no longer awaited"
                            );
                            self.report(unfinished, ArchiveOutcome::Abandoned);
                            overrun += 1;
                            break;
                        }
                    }
                    _ = tokio::time::sleep_until(deadline) => break,
                }
            }
        }

        let remaining: Vec<TaskId> = self.keys.keys().copied().collect();
        for id in &remaining {
            if let Some(key) = self.keys.remove(id) {
                let task = self.queue.remove(&key).into_inner();
                warn!(path = %task.path.display(), task = %id, "Abandoning pending archival");
                self.report(task, ArchiveOutcome::Abandoned);
            }
        }
        self.by_path.clear();
        self.pending.store(0, Ordering::Release);

        let abandoned = remaining.len() + overrun;
        if abandoned > 0 {
            error!(abandoned, "Scheduler did not drain in time, forced shutdown");
        }
        abandoned
    }

    fn report(&self, task: PendingArchival, outcome: ArchiveOutcome) {
        // No subscribers is fine.
        let _ = self.reports.send(ArchiveReport {
            task: task.id,
            path: task.path,
            action: task.action,
            outcome,
        });
    }
}

/// Re-validate a fired task and perform its action.
///
/// Blocking; run it off the async executor.
pub fn execute(task: &PendingArchival, archive_dir: &Path, algorithm: HashAlgorithm) -> ArchiveOutcome {
    let name = file_label(&task.path);

    if !task.path.exists() {
        info!(path = %task.path.display(), "[SKIPPED] File '{}' no longer exists in source, skipping {}", name, task.action);
        return ArchiveOutcome::SkippedMissing;
    }

    let current = match fingerprint::compute(&task.path, algorithm) {
        Ok(fp) => fp,
        Err(FingerprintError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            info!(path = %task.path.display(), "[SKIPPED] File '{}' no longer exists in source, skipping {}", name, task.action);
            return ArchiveOutcome::SkippedMissing;
        }
        Err(e) => {
            warn!(path = %task.path.display(), error = %e, "[SKIPPED] Could not fingerprint '{}'", name);
            return ArchiveOutcome::SkippedUnreadable {
                error: e.to_string(),
            };
        }
    };

    if current != task.fingerprint {
        info!(path = %task.path.display(), "File hash for '{}' doesn't match original, skipping", name);
        return ArchiveOutcome::SkippedChanged;
    }

    let result = match task.action {
        ArchiveAction::Move => destination(task, archive_dir)
            .and_then(|dest| move_file(&task.path, &dest).map(|()| ArchiveOutcome::Archived { destination: dest })),
        ArchiveAction::Copy => destination(task, archive_dir).and_then(|dest| {
            std::fs::copy(&task.path, &dest).map(|_| ArchiveOutcome::Archived { destination: dest })
        }),
        ArchiveAction::Delete => match std::fs::remove_file(&task.path) {
            Ok(()) => Ok(ArchiveOutcome::Deleted),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ArchiveOutcome::Deleted),
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(outcome) => {
            match &outcome {
                ArchiveOutcome::Archived { destination } => info!(
                    path = %task.path.display(),
                    destination = %destination.display(),
                    "[{}] Successfully archived '{}'",
                    task.action,
                    name
                ),
                _ => info!(path = %task.path.display(), "[DELETE] Successfully deleted '{}'", name),
            }
            outcome
        }
        Err(e) => {
            error!(path = %task.path.display(), error = %e, "[ERROR] Failed to {} '{}'", task.action, name);
            ArchiveOutcome::Failed {
                error: e.to_string(),
            }
        }
    }
}

fn destination(task: &PendingArchival, archive_dir: &Path) -> io::Result<PathBuf> {
    task.path
        .file_name()
        .map(|name| archive_dir.join(name))
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))
}

/// Rename, falling back to copy + remove across filesystems. Replaces an
/// existing destination.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(from = %from.display(), to = %to.display(), "Rename crosses devices, copying");
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
