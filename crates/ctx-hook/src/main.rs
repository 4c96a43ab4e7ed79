//! ctx-hook: one-shot ingestor invoked directly by editor/agent hook
//! configuration (e.g. Claude Code's `hooks` stanza in settings.json).
//! Also reachable as `ctx hook ingest`, which calls the same library
//! in-process.
//!
//! Exits 0 whether or not a session was active: a hook script should
//! never fail the tool call that triggered it.

use std::io;

use clap::Parser;
use tracing::warn;

#[derive(Parser)]
#[command(name = "ctx-hook")]
#[command(about = "Ingest a single hook event into context memory")]
struct Cli {
    /// Absolute path to the project working tree.
    #[arg(long)]
    project_path: std::path::PathBuf,

    /// Hook event name as reported by the calling tool, e.g. `PostToolUse`.
    #[arg(long)]
    event: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match ctx_hook::ingest(&cli.project_path, &cli.event, io::stdin()) {
        Ok(message) => println!("{message}"),
        Err(err) => {
            warn!(error = %err, "ctx-hook failed to ingest event");
            println!("Hook event ignored due to an internal error.");
        }
    }
    std::process::exit(0);
}
