//! ctx-recorder: long-lived background poll loop for one session.
//!
//! Spawned detached by `ctx start`; exits on its own once the session
//! state advances past `running`, or on SIGTERM/SIGINT.

mod logging;
mod shutdown;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ctx_core::recorder::{poll_once, GitSnapshot, RecorderConfig};
use ctx_core::{ProjectStore, Registry};
use tracing::{info, warn};

const DEFAULT_POLL_INTERVAL_SECS: f64 = 2.0;
const ENV_POLL_INTERVAL: &str = "CTX_RECORDER_INTERVAL";

#[derive(Parser)]
#[command(name = "ctx-recorder")]
#[command(about = "Background recorder for a single context memory session")]
struct Cli {
    /// Absolute path to the project working tree.
    #[arg(long)]
    project_path: PathBuf,

    /// Id of the session this recorder is driving.
    #[arg(long)]
    session_id: i64,
}

fn main() {
    let cli = Cli::parse();
    let log_dir = cli.project_path.join(".context-memory").join("logs");
    let _guard = logging::init(&log_dir);
    shutdown::install();

    if let Err(err) = run(cli) {
        tracing::error!(error = %err, "ctx-recorder exited with error");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> ctx_core::Result<()> {
    let store = ProjectStore::open(&cli.project_path)?;
    let registry = Registry::open_default()?;
    let adapters = registry
        .adapter_map(&cli.project_path)?
        .into_iter()
        .map(|(name, path)| (name, PathBuf::from(path)))
        .collect();

    let poll_interval = poll_interval_from_env();
    let config = RecorderConfig {
        session_id: cli.session_id,
        project_root: cli.project_path.clone(),
        adapters,
        poll_interval,
    };

    for source in ["git", "filesystem"] {
        store.update_source_status(cli.session_id, source, "unknown", "not yet polled")?;
    }
    for adapter in config.adapters.keys() {
        store.update_source_status(
            cli.session_id,
            &format!("adapter:{adapter}"),
            "unknown",
            "not yet polled",
        )?;
    }

    info!(session_id = cli.session_id, project = %cli.project_path.display(), "recorder started");

    let mut git_baseline: Option<GitSnapshot> = None;
    let mut fs_baseline = None;

    loop {
        if shutdown::requested() {
            info!("shutdown signal received");
            break;
        }
        let session = store.get_session(cli.session_id)?;
        let still_running = session.as_ref().map(|s| s.state == "running").unwrap_or(false);
        if !still_running {
            info!("session no longer running, stopping poll loop");
            break;
        }

        poll_once(&store, &config, &mut git_baseline, &mut fs_baseline);
        std::thread::sleep(config.poll_interval);
    }

    if let Err(err) = store.insert_event(
        cli.session_id,
        ctx_protocol::EventType::Handoff,
        "Recorder stopped cleanly.",
        &[],
        "recorder",
        None,
        None,
        None,
        None,
        None,
        None,
    ) {
        warn!(error = %err, "failed to record handoff event on exit");
    }
    store.set_session_state(cli.session_id, "stopped")?;
    registry.set_recording_state(&cli.project_path, "stopped", None, None)?;

    Ok(())
}

fn poll_interval_from_env() -> Duration {
    let secs = std::env::var(ENV_POLL_INTERVAL)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| *v > 0.0)
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
    Duration::from_secs_f64(secs)
}
