//! ctx-rpc: stdio JSON-RPC server exposing context memory to editor
//! and chat-client integrations (Cursor, Claude). Also reachable as
//! `ctx mcp serve`, which calls the same library in-process.

use std::io;
use std::path::PathBuf;

use clap::Parser;
use tracing::error;

#[derive(Parser)]
#[command(name = "ctx-rpc")]
#[command(about = "Stdio JSON-RPC server for context memory")]
struct Cli {
    /// Absolute path to the project working tree this server serves.
    #[arg(long)]
    project_path: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let stdin = io::stdin();
    let stdout = io::stdout();
    if let Err(err) = ctx_rpc::serve(&cli.project_path, stdin.lock(), stdout.lock()) {
        error!(error = %err, "ctx-rpc terminated with error");
        std::process::exit(1);
    }
}
