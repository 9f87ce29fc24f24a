//! Run command - watches every configured directory until interrupted.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use archwatch_config::{DEFAULT_CONFIG_FILE, load_config_file, write_default_config};
use archwatch_monitor::{EntryKind, MonitorListener, Orchestrator, StopReason};

use super::Context;

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Exit with an error if any configured directory cannot be watched
    #[arg(long)]
    pub strict: bool,
}

/// Logs detections and permanent watch failures.
struct LogListener;

impl MonitorListener for LogListener {
    fn on_detected(&self, path: &Path, kind: EntryKind) {
        debug!(path = %path.display(), %kind, "Entry ready");
    }

    fn on_monitor_failed(&self, directory: &Path) {
        error!(
            source = %directory.display(),
            "Monitoring stopped permanently; restart archwatch to resume this directory"
        );
    }
}

/// Run the run command.
pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let path = &ctx.config_path;
    info!(config = %path.display(), "archwatch started");

    if !path.exists() {
        write_default_config(path)?;
        error!(
            config = %path.display(),
            "{} not found. A default config file has been created; \
             change the paths and other values accordingly, then run again",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string())
        );
        return Ok(());
    }

    let collection = load_config_file(path)?;
    collection.validate_shared()?;

    let orchestrator = Orchestrator::from_collection(&collection)?;
    if args.strict && !orchestrator.rejected().is_empty() {
        bail!(
            "{} configured director{} cannot be watched",
            orchestrator.rejected().len(),
            if orchestrator.rejected().len() == 1 { "y" } else { "ies" }
        );
    }
    if orchestrator.supervisors().is_empty() {
        bail!("none of the configured directories can be watched");
    }
    orchestrator.add_listener(Arc::new(LogListener));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!(error = %e, "Failed to listen for ctrl-c, shutting down"),
        }
        signal.cancel();
    });

    let report = orchestrator.run(shutdown).await;

    let failed = report
        .finished
        .iter()
        .filter(|(_, state)| state.stop_reason == Some(StopReason::RestartsExhausted))
        .count();
    if failed > 0 {
        warn!(failed, "Some directories stopped after exhausting restarts");
    }

    info!("archwatch closing");
    Ok(())
}
