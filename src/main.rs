//! # obsanki CLI
//!
//! One command, one run: scan the vault, reconcile against Anki, push
//! changes, write assigned ids back into the vault.
//!
//! ```bash
//! obsanki --config ./obsanki.toml            # incremental sync
//! obsanki --config ./obsanki.toml --full     # ignore the hash cache
//! obsanki --config ./obsanki.toml --dry-run  # report, change nothing
//! ```

use clap::Parser;
use std::path::PathBuf;

use obsanki::config;
use obsanki::progress::StderrProgress;
use obsanki::sync;

/// Sync flashcard notes from an Obsidian-style markdown vault to Anki over
/// AnkiConnect.
#[derive(Parser)]
#[command(
    name = "obsanki",
    about = "Sync flashcard notes from a markdown vault to Anki over AnkiConnect",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, default_value = "./obsanki.toml")]
    config: PathBuf,

    /// Ignore the hash cache and re-scan every file.
    #[arg(long)]
    full: bool,

    /// Parse and classify, report what would change, touch nothing.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    sync::run_sync(&cfg, cli.full, cli.dry_run, &StderrProgress).await?;
    Ok(())
}
