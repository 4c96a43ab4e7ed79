//! ctx: operator CLI for local project context memory.
//!
//! Thin orchestrator over the Registry, the Store, the Recorder
//! process and the Integration Surface; holds no state of its own.

mod commands;

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ctx")]
#[command(about = "Local project context memory CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize project-local MCP + hook configuration
    Init {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        force: bool,
    },
    /// Start recording context for a project
    Start {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "auto", value_parser = ["cursor", "claude", "auto"])]
        agent: String,
    },
    /// Stop active recording for a project
    Stop {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Show project recording status
    Status {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Check MCP/hook integration health
    Doctor {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Print local memory storage paths
    Where {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Soft delete project context
    Delete {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Permanently delete project context
    Purge {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        force: bool,
    },
    /// List active projects
    List {
        #[arg(long)]
        include_deleted: bool,
    },
    /// Adapter management
    Adapter {
        #[command(subcommand)]
        command: AdapterCommands,
    },
    /// Vector feature toggles
    Vector {
        #[command(subcommand)]
        command: VectorCommands,
    },
    /// MCP server operations
    Mcp {
        #[command(subcommand)]
        command: McpCommands,
    },
    /// Hook ingestion operations
    Hook {
        #[command(subcommand)]
        command: HookCommands,
    },
}

#[derive(Subcommand)]
enum AdapterCommands {
    /// Configure adapter source
    Configure {
        #[arg(value_parser = ["cursor", "claude"])]
        adapter: String,
        #[arg(long = "log-path")]
        log_path: PathBuf,
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum VectorCommands {
    /// Enable vector feature flag
    Enable {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Disable vector feature flag
    Disable {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum McpCommands {
    /// Run stdio MCP server
    Serve {
        #[arg(long)]
        project_path: PathBuf,
    },
}

#[derive(Subcommand)]
enum HookCommands {
    /// Ingest Claude hook payload from stdin
    Ingest {
        #[arg(long)]
        project_path: PathBuf,
        #[arg(long)]
        event: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Init { path, name, force } => commands::init::run(path, name, force),
        Commands::Start { path, name, agent } => commands::start::run(path, name, agent),
        Commands::Stop { path, name } => commands::stop::run(path, name),
        Commands::Status { path, name } => commands::status::run(path, name),
        Commands::Doctor { path, name, json } => commands::doctor::run(path, name, json),
        Commands::Where { path, name } => commands::where_cmd::run(path, name),
        Commands::Delete { path, name } => commands::delete::run(path, name),
        Commands::Purge { path, name, force } => commands::purge::run(path, name, force),
        Commands::List { include_deleted } => commands::list::run(include_deleted),
        Commands::Adapter {
            command: AdapterCommands::Configure { adapter, log_path, path, name },
        } => commands::adapter::configure(adapter, log_path, path, name),
        Commands::Vector { command } => match command {
            VectorCommands::Enable { path, name } => commands::vector::run(path, name, true),
            VectorCommands::Disable { path, name } => commands::vector::run(path, name, false),
        },
        Commands::Mcp { command: McpCommands::Serve { project_path } } => commands::mcp::serve(project_path),
        Commands::Hook { command: HookCommands::Ingest { project_path, event } } => {
            commands::hook::ingest(project_path, event)
        }
    };
    std::process::exit(exit_code);
}
