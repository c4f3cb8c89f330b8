//! Audren CLI - dry runs and hardware playback for the audren renderer.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "audren")]
#[command(author, version, about = "Audren renderer CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario through the renderer and print each frame's plan
    Simulate(commands::simulate::SimulateArgs),

    /// Play a test tone through a hardware session
    Play(commands::play::PlayArgs),

    /// Validate an engine configuration file
    CheckConfig(commands::check_config::CheckConfigArgs),
}

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Play(args) => commands::play::run(args),
        Commands::CheckConfig(args) => commands::check_config::run(args),
    }
}
