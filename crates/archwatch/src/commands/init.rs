//! Init command - writes a template config file.

use anyhow::{Result, bail};
use clap::Args;
use console::Style;

use archwatch_config::{ConfigCollection, save_config, write_default_config};

use super::Context;

/// Arguments for the init command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(short, long)]
    pub force: bool,
}

/// Run the init command.
pub async fn run(args: InitArgs, ctx: &Context) -> Result<()> {
    let path = &ctx.config_path;

    if path.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    if args.force {
        save_config(&ConfigCollection::template(), path)?;
    } else {
        write_default_config(path)?;
    }

    if ctx.json_output {
        println!("{}", serde_json::json!({ "written": path.display().to_string() }));
    } else {
        let green = Style::new().green();
        let dim = Style::new().dim();
        println!("{} {}", green.apply_to("Wrote"), path.display());
        println!(
            "{}",
            dim.apply_to("Edit the source and archive folders, then start with `archwatch run`.")
        );
    }

    Ok(())
}
