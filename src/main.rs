//! # Paper Digest CLI (`pdigest`)
//!
//! Runs one fetch-and-summarize pass, or the one-time interactive login.
//!
//! ## Usage
//!
//! ```bash
//! pdigest [--config ./config/digest.toml] [--init-auth]
//! ```
//!
//! | Invocation | Description |
//! |------------|-------------|
//! | `pdigest --init-auth` | Open a visible browser, log in by hand, save the session file |
//! | `pdigest` | Fetch new papers and summarize each one |
//!
//! Logs go to stderr (`RUST_LOG` overrides the `info` default); the run
//! report goes to stdout.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use paper_digest::{config, pipeline, session};

/// Paper Digest: fetch fresh arXiv papers and collect assistant-written
/// summaries through a scripted browser session.
///
/// All settings are read from a TOML file. See
/// `config/digest.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pdigest",
    about = "Fetch fresh arXiv papers and summarize them with a web AI assistant",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/digest.toml`. A missing file means built-in
    /// defaults.
    #[arg(long, default_value = "./config/digest.toml")]
    config: PathBuf,

    /// Log in interactively and save the session file, then exit.
    ///
    /// Opens a visible browser at the assistant. Finish the login by hand
    /// and press Enter in the terminal.
    #[arg(long)]
    init_auth: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config(&cli.config)?;

    if cli.init_auth {
        session::init_auth(&cfg).await?;
        println!("session saved: {}", cfg.paths.session_file.display());
        return Ok(());
    }

    let report = pipeline::run_pipeline(&cfg).await?;
    println!("run {}", cfg.search.query);
    println!("  fetched: {} papers", report.fetched);
    println!("  summarized: {}", report.summarized);
    println!("  failed: {}", report.failed);
    println!("ok");

    Ok(())
}
