// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use depthview::errors::AppError;

mod cli;

#[derive(Parser)]
#[command(name = "depthview")]
#[command(about = "Live color, aligned depth and point-cloud viewer for depth cameras")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    args: cli::RunArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture from the selected devices and show their views (default)
    Run,

    /// List available devices
    List,
}

fn main() -> Result<(), AppError> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=depthview=trace, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.args.resolve_config()?;
    let backend = cli::default_backend(&config);

    match cli.command {
        Some(Commands::List) => cli::list_devices(backend.as_ref()),
        Some(Commands::Run) | None => cli::run(backend, &config, cli.args.headless),
    }
}
