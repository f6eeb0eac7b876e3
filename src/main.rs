//! Graft CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "graft")]
#[command(about = "Incremental linker for multi-package module graphs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Linker config file
    #[arg(short, long, default_value = graft_linker::CONFIG_FILE)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Link every entry into a fresh output directory
    Link {
        /// Directory to create build outputs under (overrides the config)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List packages whose graph changed since the last build
    Status,
    /// Clear the build cache
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "graft={log_level},graft_linker={log_level},graft_resolver={log_level},graft_core={log_level}"
        )))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Graft v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Config: {}", cli.config.display());

    match cli.command {
        Commands::Link { out, json } => commands::link(&cli.config, out, json).await,
        Commands::Status => commands::status(&cli.config).await,
        Commands::Clear => commands::clear(&cli.config),
        Commands::Version => {
            println!("Graft v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
