//! Configuration types mapping to the config file schema.
//!
//! Top-level config:
//! ```text
//! configs[]     # one entry per monitored directory
//! settings      # optional runtime tuning shared by all monitors
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Actions & Units
// ─────────────────────────────────────────────────────────────────────────────

/// What to do with a file once its delay has elapsed unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArchiveAction {
    /// Rename the file into the archive directory.
    Move,
    /// Copy the file into the archive directory, leaving the source intact.
    Copy,
    /// Remove the file from the source directory.
    Delete,
}

impl fmt::Display for ArchiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveAction::Move => write!(f, "MOVE"),
            ArchiveAction::Copy => write!(f, "COPY"),
            ArchiveAction::Delete => write!(f, "DELETE"),
        }
    }
}

/// Unit applied to a monitor's `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Convert `amount` of this unit into a [`Duration`], saturating on overflow.
    pub fn duration(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(amount),
            TimeUnit::Microseconds => Duration::from_micros(amount),
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(amount.saturating_mul(3_600)),
            TimeUnit::Days => Duration::from_secs(amount.saturating_mul(86_400)),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeUnit::Nanoseconds => "nanoseconds",
            TimeUnit::Microseconds => "microseconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        };
        f.write_str(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Monitor Config
// ─────────────────────────────────────────────────────────────────────────────

/// One monitored directory.
///
/// Immutable once loaded; the watcher runtime only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Directory watched for newly created entries.
    pub source_folder: PathBuf,
    /// Directory files are moved or copied into.
    pub archive_folder: PathBuf,
    /// Action performed once the delay elapses.
    pub action: ArchiveAction,
    /// Delay amount, interpreted in `unit`.
    pub delay: u64,
    /// Unit of `delay`. Older templates spell this key `timeUnit`.
    #[serde(alias = "timeUnit")]
    pub unit: TimeUnit,
}

impl MonitorConfig {
    /// Create a monitor config.
    pub fn new(
        source_folder: impl Into<PathBuf>,
        archive_folder: impl Into<PathBuf>,
        action: ArchiveAction,
        delay: u64,
        unit: TimeUnit,
    ) -> Self {
        Self {
            source_folder: source_folder.into(),
            archive_folder: archive_folder.into(),
            action,
            delay,
            unit,
        }
    }

    /// The configured delay as a [`Duration`].
    pub fn delay_duration(&self) -> Duration {
        self.unit.duration(self.delay)
    }

    /// Check the fields that can be validated without touching the filesystem.
    ///
    /// Directory existence is checked when a watcher is constructed, since
    /// that failure must only affect this one monitor.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.source_folder.as_os_str().is_empty() {
            return Err("sourceFolder must not be empty".to_string());
        }
        if self.archive_folder.as_os_str().is_empty() {
            return Err("archiveFolder must not be empty".to_string());
        }
        if self.delay == 0 {
            return Err("delay must be a positive integer".to_string());
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Which filesystem notification facility backs a directory watch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchBackendKind {
    /// OS-native notifications (inotify, FSEvents, ReadDirectoryChangesW).
    #[default]
    Native,
    /// Periodic directory scans, for filesystems without native support.
    Poll,
}

/// Runtime tuning shared by every monitor in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorSettings {
    /// Interval between size checks while waiting for a write to finish.
    pub stability_interval_ms: u64,
    /// Number of watch failures after which a monitor stops for good.
    pub restart_limit: u32,
    /// Pause before reopening a failed watch.
    pub restart_backoff_ms: u64,
    /// Time pending archivals get to fire during shutdown.
    pub shutdown_grace_secs: u64,
    /// Digest used to fingerprint file content.
    pub hash_algorithm: String,
    /// Notification backend.
    pub backend: WatchBackendKind,
    /// Scan interval for the poll backend.
    pub poll_interval_ms: u64,
    /// Replace, rather than duplicate, a pending archival for the same path.
    pub dedupe_pending: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            stability_interval_ms: 500,
            restart_limit: 2,
            restart_backoff_ms: 1_000,
            shutdown_grace_secs: 5,
            hash_algorithm: "MD5".to_string(),
            backend: WatchBackendKind::Native,
            poll_interval_ms: 1_000,
            dedupe_pending: true,
        }
    }
}

impl MonitorSettings {
    pub fn stability_interval(&self) -> Duration {
        Duration::from_millis(self.stability_interval_ms)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigCollection {
    /// Monitored directories.
    #[serde(default)]
    pub configs: Vec<MonitorConfig>,

    /// Runtime tuning.
    #[serde(default)]
    pub settings: MonitorSettings,
}

impl ConfigCollection {
    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate every entry, reporting the first failure by index.
    pub fn validate(&self) -> Result<()> {
        self.validate_shared()?;
        for (index, config) in self.configs.iter().enumerate() {
            config
                .validate()
                .map_err(|reason| ConfigError::Invalid { index, reason })?;
        }
        Ok(())
    }

    /// Validate what all monitors share: a non-empty entry list and usable
    /// settings. Individual entries are checked by the monitor that owns them.
    pub fn validate_shared(&self) -> Result<()> {
        if self.configs.is_empty() {
            return Err(ConfigError::Empty);
        }
        if self.settings.restart_limit == 0 {
            return Err(ConfigError::Invalid {
                index: 0,
                reason: "settings.restartLimit must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The two-entry template written when no config file exists.
    pub fn template() -> Self {
        let (first, second, archive) = if cfg!(windows) {
            (
                r"C:\archwatch\source-1",
                r"C:\archwatch\source-2",
                r"C:\archwatch\archive",
            )
        } else {
            (
                "/tmp/archwatch/source-1",
                "/tmp/archwatch/source-2",
                "/tmp/archwatch/archive",
            )
        };

        Self {
            configs: vec![
                MonitorConfig::new(first, archive, ArchiveAction::Move, 5, TimeUnit::Seconds),
                MonitorConfig::new(second, archive, ArchiveAction::Move, 5, TimeUnit::Seconds),
            ],
            settings: MonitorSettings::default(),
        }
    }
}
