//! Check command - validates the config and lists monitored directories.

use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;
use serde::Serialize;

use archwatch_config::{ConfigCollection, MonitorConfig, load_config_file};

use super::Context;

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Also verify that every source folder exists
    #[arg(long)]
    pub strict: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckedMonitor<'a> {
    #[serde(flatten)]
    config: &'a MonitorConfig,
    source_exists: bool,
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    config: String,
    monitors: &'a [CheckedMonitor<'a>],
    settings: &'a archwatch_config::MonitorSettings,
}

/// Run the check command.
pub async fn run(args: CheckArgs, ctx: &Context) -> Result<()> {
    let path = &ctx.config_path;
    let collection = load_config_file(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    collection.validate()?;

    let monitors: Vec<_> = collection
        .configs
        .iter()
        .map(|config| CheckedMonitor {
            config,
            source_exists: config.source_folder.is_dir(),
        })
        .collect();

    if ctx.json_output {
        let output = CheckOutput {
            config: path.display().to_string(),
            monitors: &monitors,
            settings: &collection.settings,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_table(path, &collection, &monitors, ctx.verbose);
    }

    if args.strict {
        let missing = monitors.iter().filter(|m| !m.source_exists).count();
        if missing > 0 {
            anyhow::bail!("{missing} source folder(s) do not exist");
        }
    }

    Ok(())
}

fn print_table(
    path: &std::path::Path,
    collection: &ConfigCollection,
    monitors: &[CheckedMonitor<'_>],
    verbose: bool,
) {
    let bold = Style::new().bold();
    let dim = Style::new().dim();
    let yellow = Style::new().yellow();

    println!("{} {}", bold.apply_to("Config:"), path.display());
    println!();
    for monitor in monitors {
        let config = monitor.config;
        println!(
            "  {} {} -> {}",
            bold.apply_to(config.action),
            config.source_folder.display(),
            config.archive_folder.display()
        );
        println!(
            "    {} {} {}",
            dim.apply_to("after"),
            config.delay,
            config.unit
        );
        if !monitor.source_exists {
            println!("    {}", yellow.apply_to("source folder does not exist"));
        }
    }

    if verbose {
        let settings = &collection.settings;
        println!();
        println!("{}", bold.apply_to("Settings:"));
        println!("  stability interval  {} ms", settings.stability_interval_ms);
        println!("  restart limit       {}", settings.restart_limit);
        println!("  restart backoff     {} ms", settings.restart_backoff_ms);
        println!("  shutdown grace      {} s", settings.shutdown_grace_secs);
        println!("  hash algorithm      {}", settings.hash_algorithm);
        println!("  backend             {:?}", settings.backend);
        println!("  dedupe pending      {}", settings.dedupe_pending);
    }

    println!();
    println!(
        "{}",
        dim.apply_to(format!("{} monitored directories", monitors.len()))
    );
}
