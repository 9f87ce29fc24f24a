//! Directory watch capability.
//!
//! A [`DirectoryWatch`] yields batches of newly created entries in one
//! directory. Two backends share the notify-based implementation: OS-native
//! notifications and a polling scanner for filesystems (network mounts,
//! containers) where native events are unreliable. Tests substitute their
//! own [`WatchOpener`] to drive the supervisor deterministically.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use notify::{EventKind, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use archwatch_config::{MonitorSettings, WatchBackendKind};

/// How often a quiet watch re-checks that its directory still exists.
const LIVENESS_CHECK: Duration = Duration::from_secs(5);

/// Errors that can occur while watching a directory.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The path is missing or not a directory.
    #[error("{0} does not exist or is not a directory")]
    NotADirectory(PathBuf),

    /// The notification backend could not be started.
    #[error("failed to watch {path}: {source}")]
    InitFailed {
        path: PathBuf,
        source: notify::Error,
    },

    /// The watch is dead (directory removed or unreachable) and must be reopened.
    #[error("watch on {0} is no longer valid")]
    WatchInvalid(PathBuf),
}

/// Result type for watch operations.
pub type WatchResult<T> = std::result::Result<T, WatchError>;

/// Kind of a newly created directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Folder,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Folder => write!(f, "folder"),
        }
    }
}

/// A newly created entry in a watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, kind: EntryKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// A live watch on one directory.
#[async_trait]
pub trait DirectoryWatch: Send {
    /// The watched directory.
    fn directory(&self) -> &Path;

    /// Wait until at least one creation is observed and return everything
    /// delivered with it, in delivery order.
    ///
    /// Returns [`WatchError::WatchInvalid`] once the watch is dead; a dead
    /// watch never recovers and must be reopened.
    async fn next_batch(&mut self) -> WatchResult<Vec<WatchEvent>>;

    /// Release the underlying handle. Subsequent calls to
    /// [`next_batch`](Self::next_batch) fail with `WatchInvalid`.
    fn invalidate(&mut self);
}

/// Opens directory watches.
pub trait WatchOpener: Send + Sync {
    fn open(&self, directory: &Path) -> WatchResult<Box<dyn DirectoryWatch>>;
}

/// Notification backend for [`NotifyWatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchBackend {
    /// OS-native notifications.
    Native,
    /// Periodic scans at `interval`.
    Poll { interval: Duration },
}

impl WatchBackend {
    /// Pick the backend described by the runtime settings.
    pub fn from_settings(settings: &MonitorSettings) -> Self {
        match settings.backend {
            WatchBackendKind::Native => WatchBackend::Native,
            WatchBackendKind::Poll => WatchBackend::Poll {
                interval: settings.poll_interval(),
            },
        }
    }
}

impl WatchOpener for WatchBackend {
    fn open(&self, directory: &Path) -> WatchResult<Box<dyn DirectoryWatch>> {
        Ok(Box::new(NotifyWatch::open(directory, *self)?))
    }
}

/// [`DirectoryWatch`] backed by the `notify` crate.
pub struct NotifyWatch {
    directory: PathBuf,
    watcher: Option<Box<dyn Watcher + Send>>,
    rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
}

impl NotifyWatch {
    /// Start watching `directory` for entry creation (non-recursive).
    pub fn open(directory: &Path, backend: WatchBackend) -> WatchResult<Self> {
        if !directory.is_dir() {
            return Err(WatchError::NotADirectory(directory.to_path_buf()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let handler = move |res: notify::Result<notify::Event>| {
            // Receiver gone means the watch is being torn down.
            let _ = tx.send(res);
        };

        let init_err = |source| WatchError::InitFailed {
            path: directory.to_path_buf(),
            source,
        };

        let mut watcher: Box<dyn Watcher + Send> = match backend {
            WatchBackend::Native => Box::new(notify::recommended_watcher(handler).map_err(init_err)?),
            WatchBackend::Poll { interval } => Box::new(
                notify::PollWatcher::new(handler, notify::Config::default().with_poll_interval(interval))
                    .map_err(init_err)?,
            ),
        };

        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(init_err)?;

        debug!(directory = %directory.display(), ?backend, "Directory watch opened");

        Ok(Self {
            directory: directory.to_path_buf(),
            watcher: Some(watcher),
            rx,
        })
    }

    fn invalid(&self) -> WatchError {
        WatchError::WatchInvalid(self.directory.clone())
    }

    /// Translate one delivery from notify into creation events.
    ///
    /// Returns `true` when the watched directory itself was removed.
    fn absorb(&self, result: notify::Result<notify::Event>, events: &mut Vec<WatchEvent>) -> bool {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!(directory = %self.directory.display(), error = %e, "Watch backend error");
                return false;
            }
        };

        if event.need_rescan() {
            error!(
                directory = %self.directory.display(),
                "Event overflow occurred, some creations may have been lost"
            );
            return false;
        }

        match event.kind {
            EventKind::Create(_) => {
                for path in event.paths {
                    if path == self.directory {
                        continue;
                    }
                    if let Some(kind) = classify(&path) {
                        events.push(WatchEvent { path, kind });
                    }
                }
                false
            }
            EventKind::Remove(_) => event.paths.iter().any(|p| p == &self.directory),
            _ => false,
        }
    }
}

#[async_trait]
impl DirectoryWatch for NotifyWatch {
    fn directory(&self) -> &Path {
        &self.directory
    }

    async fn next_batch(&mut self) -> WatchResult<Vec<WatchEvent>> {
        loop {
            if self.watcher.is_none() {
                return Err(self.invalid());
            }

            let first = tokio::select! {
                received = self.rx.recv() => match received {
                    Some(result) => result,
                    None => {
                        self.invalidate();
                        return Err(self.invalid());
                    }
                },
                _ = tokio::time::sleep(LIVENESS_CHECK) => {
                    if self.directory.is_dir() {
                        continue;
                    }
                    info!(
                        directory = %self.directory.display(),
                        "Watched directory disappeared"
                    );
                    self.invalidate();
                    return Err(self.invalid());
                }
            };

            let mut events = Vec::new();
            let mut root_removed = self.absorb(first, &mut events);
            while let Ok(result) = self.rx.try_recv() {
                root_removed |= self.absorb(result, &mut events);
            }

            // Reset: the batch is consumed, the watch must still be usable.
            if root_removed || !self.directory.is_dir() {
                info!(
                    directory = %self.directory.display(),
                    "Watch no longer valid, directory removed or unreachable"
                );
                self.invalidate();
                return Err(self.invalid());
            }

            if !events.is_empty() {
                return Ok(events);
            }
        }
    }

    fn invalidate(&mut self) {
        if self.watcher.take().is_some() {
            debug!(directory = %self.directory.display(), "Directory watch closed");
        }
        self.rx.close();
    }
}

/// Stat a created path. Entries that vanished before the stat yield nothing.
fn classify(path: &Path) -> Option<EntryKind> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Some(EntryKind::File),
        Ok(meta) if meta.is_dir() => Some(EntryKind::Folder),
        Ok(_) => {
            debug!(path = %path.display(), "Ignoring special file");
            None
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Created entry vanished before stat");
            None
        }
    }
}
