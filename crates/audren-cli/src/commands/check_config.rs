//! Engine configuration validation.

use std::path::PathBuf;

use anyhow::{Context, bail};
use audren_config::{EngineConfig, ValidationError};
use clap::Args;

#[derive(Args)]
pub struct CheckConfigArgs {
    /// Configuration file (defaults to the user config location)
    path: Option<PathBuf>,

    /// Print the effective configuration, defaults included
    #[arg(long)]
    show: bool,

    /// Write a default configuration if the file does not exist
    #[arg(long)]
    init: bool,
}

pub fn run(args: CheckConfigArgs) -> anyhow::Result<()> {
    let path = args
        .path
        .unwrap_or_else(audren_config::paths::default_config_path);

    if args.init && !path.exists() {
        EngineConfig::default().save(&path)?;
        println!("Wrote default configuration to {}", path.display());
    }

    let config =
        EngineConfig::load(&path).with_context(|| format!("loading {}", path.display()))?;

    if args.show {
        print!("{}", config.to_toml()?);
    }

    match config.validate() {
        Ok(()) => {
            println!("{}: OK", path.display());
            Ok(())
        }
        Err(ValidationError::Multiple(errors)) => {
            for error in &errors {
                println!("  {error}");
            }
            bail!("{}: {} problems", path.display(), errors.len())
        }
        Err(error) => {
            println!("  {error}");
            bail!("{}: 1 problem", path.display())
        }
    }
}
