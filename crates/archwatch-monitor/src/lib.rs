//! Directory monitoring and content-guarded delayed archival.
//!
//! Each monitored directory gets a [`WatchSupervisor`]. The supervisor pulls
//! creation events from a [`DirectoryWatch`], waits for new files to stop
//! growing, fingerprints them and arms an [`ArchiveScheduler`] task. When the
//! delay elapses the file is fingerprinted again and the configured action
//! (move, copy or delete) runs only if the content is unchanged.
//!
//! ```text
//! DirectoryWatch ──▶ StabilityGate ──▶ fingerprint ──▶ ArchiveScheduler
//!       ▲                                                   │
//!       └──── WatchSupervisor (restart on failure) ─────────┘
//! ```
//!
//! An [`Orchestrator`] runs one supervisor per configured directory and fans
//! shutdown out to all of them.

pub mod fingerprint;
pub mod listener;
pub mod orchestrator;
pub mod scheduler;
pub mod stability;
pub mod supervisor;
pub mod watch;

pub use fingerprint::{Fingerprint, FingerprintError, HashAlgorithm};
pub use listener::{Listeners, MonitorListener};
pub use orchestrator::{Orchestrator, OrchestratorReport, RejectedMonitor};
pub use scheduler::{
    ArchiveOutcome, ArchiveReport, ArchiveScheduler, MAX_DELAY, PendingArchival, SchedulerConfig,
    SchedulerError, TaskHandle, TaskId,
};
pub use stability::{DEFAULT_STABILITY_INTERVAL, StabilityError, StabilityGate};
pub use supervisor::{
    DEFAULT_RESTART_LIMIT, StopReason, SupervisorError, SupervisorHandle, SupervisorOptions,
    SupervisorState, SupervisorStatus, WatchSupervisor,
};
pub use watch::{
    DirectoryWatch, EntryKind, NotifyWatch, WatchBackend, WatchError, WatchEvent, WatchOpener,
    WatchResult,
};
