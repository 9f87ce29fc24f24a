//! Write-completion detection.
//!
//! A freshly created file may still be receiving data. The gate polls its
//! size until two consecutive reads agree. There is no upper bound: a file
//! that grows forever holds the caller forever.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::trace;

/// Default interval between size checks.
pub const DEFAULT_STABILITY_INTERVAL: Duration = Duration::from_millis(500);

/// Errors raised while waiting for a file to settle.
#[derive(Debug, Error)]
pub enum StabilityError {
    /// The file could no longer be stat'd.
    #[error("{path} vanished while waiting for writes to finish: {source}")]
    FileVanished { path: PathBuf, source: io::Error },
}

/// Polls a file's size until it stops changing.
#[derive(Debug, Clone, Copy)]
pub struct StabilityGate {
    interval: Duration,
}

impl Default for StabilityGate {
    fn default() -> Self {
        Self::new(DEFAULT_STABILITY_INTERVAL)
    }
}

impl StabilityGate {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until `path` reports the same size on two consecutive polls.
    ///
    /// Returns the settled size.
    pub async fn wait(&self, path: &Path) -> Result<u64, StabilityError> {
        let mut previous = None;
        let mut current = size_of(path).await?;

        while previous != Some(current) {
            previous = Some(current);
            tokio::time::sleep(self.interval).await;
            current = size_of(path).await?;
            trace!(path = %path.display(), size = current, "Polled file size");
        }

        Ok(current)
    }
}

async fn size_of(path: &Path) -> Result<u64, StabilityError> {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len())
        .map_err(|source| StabilityError::FileVanished {
            path: path.to_path_buf(),
            source,
        })
}
