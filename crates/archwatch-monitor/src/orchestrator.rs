//! Runs one supervisor per configured directory.
//!
//! Construction errors are isolated per directory: a bad entry is logged
//! and reported, the remaining directories are still watched.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use archwatch_config::{ConfigCollection, MonitorConfig};

use crate::listener::MonitorListener;
use crate::supervisor::{SupervisorError, SupervisorOptions, SupervisorState, WatchSupervisor};

/// A configured directory that could not be watched.
#[derive(Debug, Clone)]
pub struct RejectedMonitor {
    pub source: PathBuf,
    pub error: String,
}

/// Outcome of [`Orchestrator::run`].
#[derive(Debug, Clone, Default)]
pub struct OrchestratorReport {
    /// Number of supervisors that were started.
    pub started: usize,
    /// Directories rejected at construction.
    pub rejected: Vec<RejectedMonitor>,
    /// Final state of every started supervisor, in config order.
    pub finished: Vec<(PathBuf, SupervisorState)>,
}

/// Owns every supervisor for the process.
pub struct Orchestrator {
    supervisors: Vec<WatchSupervisor>,
    rejected: Vec<RejectedMonitor>,
}

impl Orchestrator {
    /// Build supervisors for every entry in `collection`, using its settings.
    pub fn from_collection(collection: &ConfigCollection) -> Result<Self, SupervisorError> {
        let options = SupervisorOptions::from_settings(&collection.settings)?;
        Ok(Self::with_options(collection.configs.iter().cloned(), options))
    }

    /// Build supervisors for `configs` sharing one set of options.
    pub fn with_options(
        configs: impl IntoIterator<Item = MonitorConfig>,
        options: SupervisorOptions,
    ) -> Self {
        let mut supervisors = Vec::new();
        let mut rejected = Vec::new();

        for config in configs {
            let source = config.source_folder.clone();
            match WatchSupervisor::new(config, options.clone()) {
                Ok(supervisor) => supervisors.push(supervisor),
                Err(e) => {
                    error!(source = %source.display(), error = %e, "Directory will not be monitored");
                    rejected.push(RejectedMonitor {
                        source,
                        error: e.to_string(),
                    });
                }
            }
        }

        Self {
            supervisors,
            rejected,
        }
    }

    /// Attach `listener` to every supervisor.
    pub fn add_listener(&self, listener: Arc<dyn MonitorListener>) {
        for supervisor in &self.supervisors {
            supervisor.add_listener(listener.clone());
        }
    }

    pub fn supervisors(&self) -> &[WatchSupervisor] {
        &self.supervisors
    }

    pub fn rejected(&self) -> &[RejectedMonitor] {
        &self.rejected
    }

    /// Run every supervisor until `shutdown` is cancelled or all of them
    /// have stopped on their own.
    pub async fn run(self, shutdown: CancellationToken) -> OrchestratorReport {
        let started = self.supervisors.len();
        info!(
            started,
            rejected = self.rejected.len(),
            "Starting directory monitors"
        );

        let handles: Vec<_> = self
            .supervisors
            .into_iter()
            .map(|supervisor| supervisor.spawn(shutdown.child_token()))
            .collect();

        let mut finished = Vec::with_capacity(handles.len());
        for handle in handles {
            let source = handle.source().to_path_buf();
            let state = handle.join().await;
            finished.push((source, state));
        }

        info!("All directory monitors stopped");
        OrchestratorReport {
            started,
            rejected: self.rejected,
            finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    use archwatch_config::{ArchiveAction, MonitorSettings, TimeUnit, WatchBackendKind};
    use tempfile::tempdir;

    use crate::supervisor::{StopReason, SupervisorStatus};

    fn settings() -> MonitorSettings {
        MonitorSettings {
            stability_interval_ms: 20,
            restart_backoff_ms: 10,
            shutdown_grace_secs: 1,
            backend: WatchBackendKind::Poll,
            poll_interval_ms: 50,
            ..MonitorSettings::default()
        }
    }

    #[tokio::test]
    async fn test_bad_entry_does_not_block_others() {
        let root = tempdir().unwrap();
        let good = root.path().join("good");
        fs::create_dir(&good).unwrap();
        let missing = root.path().join("missing");

        let collection = ConfigCollection {
            configs: vec![
                MonitorConfig::new(&missing, root.path().join("a1"), ArchiveAction::Move, 5, TimeUnit::Seconds),
                MonitorConfig::new(&good, root.path().join("a2"), ArchiveAction::Copy, 5, TimeUnit::Seconds),
            ],
            settings: settings(),
        };

        let orchestrator = Orchestrator::from_collection(&collection).unwrap();
        assert_eq!(orchestrator.supervisors().len(), 1);
        assert_eq!(orchestrator.rejected().len(), 1);
        assert_eq!(orchestrator.rejected()[0].source, missing);
        assert!(root.path().join("a2").is_dir());
        assert!(!root.path().join("a1").exists());
    }

    #[tokio::test]
    async fn test_invalid_entry_rejected_alone() {
        let root = tempdir().unwrap();
        let first = root.path().join("first");
        let second = root.path().join("second");
        fs::create_dir(&first).unwrap();
        fs::create_dir(&second).unwrap();

        let collection = ConfigCollection {
            configs: vec![
                MonitorConfig::new(&first, root.path().join("a1"), ArchiveAction::Move, 0, TimeUnit::Seconds),
                MonitorConfig::new(&second, root.path().join("a2"), ArchiveAction::Copy, 5, TimeUnit::Seconds),
            ],
            settings: settings(),
        };

        let orchestrator = Orchestrator::from_collection(&collection).unwrap();
        assert_eq!(orchestrator.supervisors().len(), 1);
        assert_eq!(orchestrator.supervisors()[0].config().source_folder, second);
        assert_eq!(orchestrator.rejected()[0].source, first);
        assert!(orchestrator.rejected()[0].error.contains("delay"));
    }

    #[test]
    fn test_unknown_hash_rejects_collection() {
        let collection = ConfigCollection {
            configs: Vec::new(),
            settings: MonitorSettings {
                hash_algorithm: "crc32".to_string(),
                ..MonitorSettings::default()
            },
        };
        assert!(matches!(
            Orchestrator::from_collection(&collection),
            Err(SupervisorError::Fingerprint(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_fans_out_to_all_supervisors() {
        let root = tempdir().unwrap();
        let mut configs = Vec::new();
        for name in ["one", "two"] {
            let source = root.path().join(name);
            fs::create_dir(&source).unwrap();
            configs.push(MonitorConfig::new(
                &source,
                root.path().join(format!("{name}-archive")),
                ArchiveAction::Copy,
                5,
                TimeUnit::Seconds,
            ));
        }
        let collection = ConfigCollection {
            configs,
            settings: settings(),
        };

        let orchestrator = Orchestrator::from_collection(&collection).unwrap();
        let token = CancellationToken::new();
        let run = tokio::spawn(orchestrator.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();

        let report = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.started, 2);
        assert!(report.rejected.is_empty());
        assert_eq!(report.finished.len(), 2);
        for (_, state) in &report.finished {
            assert_eq!(state.status, SupervisorStatus::Stopped);
            assert_eq!(state.stop_reason, Some(StopReason::Shutdown));
        }
    }

    #[tokio::test]
    async fn test_listener_reaches_every_supervisor() {
        let root = tempdir().unwrap();
        let mut configs = Vec::new();
        for name in ["left", "right"] {
            let source = root.path().join(name);
            fs::create_dir(&source).unwrap();
            configs.push(MonitorConfig::new(
                &source,
                root.path().join(format!("{name}-archive")),
                ArchiveAction::Copy,
                5,
                TimeUnit::Seconds,
            ));
        }
        let orchestrator = Orchestrator::with_options(configs, SupervisorOptions::default());
        orchestrator.add_listener(Arc::new(|_: &std::path::Path, _: crate::watch::EntryKind| {}));

        for supervisor in orchestrator.supervisors() {
            assert_eq!(supervisor.listeners().len(), 1);
        }
    }
}
