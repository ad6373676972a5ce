//! modelport CLI
//!
//! Packs raw tensors into archives, inspects them, and verifies that a model
//! rebuilt from an archive behaves the same across its exported forms.

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use modelport_cli::commands::{InspectCommand, PackCommand, VerifyCommand};
use modelport_cli::exit::exit_code_for;
use modelport_cli::logging::setup_logging;
use modelport_common::ConfigLoader;
use std::path::PathBuf;
use tracing::error;

/// modelport - portable model archives with cross-representation verification
#[derive(Parser)]
#[command(name = "modelport")]
#[command(about = "Rebuild models from tensor archives and verify their exported representations")]
#[command(long_about = r#"
modelport reads a keyed tensor archive, rebuilds a model from a declared
skeleton, exports it as a trace, an interchange graph and an engine pair in
parallel, and checks every representation against the rebuilt model.

Examples:
  # Pack raw little-endian buffers into an archive
  modelport pack model.bin --tensor linear.weight=w.raw:float32:10x10 \
                           --tensor linear.bias=b.raw:float32:10

  # List archive entries
  modelport inspect model.bin

  # Verify all representations and keep a receipt
  modelport verify --archive model.bin --skeleton model.toml --receipt parity.json

Exit codes: 0 ok, 1 failure, 2 bad configuration, 3 reconstruction failed,
5 a representation diverged.
"#)]
#[command(version)]
struct Cli {
    /// Configuration file path (TOML or JSON)
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long, value_name = "FORMAT", global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the entries of an archive
    Inspect(InspectCommand),
    /// Write an archive from raw tensor files
    Pack(PackCommand),
    /// Reconstruct a model, export it and compare every representation
    Verify(VerifyCommand),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("{} {e}", style("error:").red().bold());
            for cause in e.chain().skip(1) {
                eprintln!("  caused by: {cause}");
            }
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = ConfigLoader::load_with_precedence(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    config.validate()?;
    setup_logging(&config.logging)?;

    match cli.command {
        Commands::Inspect(cmd) => cmd.execute(&config),
        Commands::Pack(cmd) => cmd.execute(),
        Commands::Verify(cmd) => cmd.execute(config).await,
    }
}
