use std::path::PathBuf;

use chrono::{DateTime, Utc};
use ctx_core::process::human_bytes;
use ctx_core::{ProjectStore, Registry};

use super::resolve::{resolve_project_path, Resolved};

const RECENT_EVENTS_DEFAULT: i64 = 20;
const HEARTBEAT_WINDOW_SECS: i64 = 600;

pub fn run(path: Option<PathBuf>, name: Option<String>) -> i32 {
    let registry = match Registry::open_default() {
        Ok(registry) => registry,
        Err(err) => return fail(&format!("Failed to open registry: {err}")),
    };

    let project_path = match resolve_project_path(&registry, &path, &name) {
        Resolved::Path(path) => path,
        Resolved::Failed { message, exit_code } => {
            println!("{message}");
            return exit_code;
        }
    };

    let project_row = match registry.get_project(&project_path) {
        Ok(Some(row)) => row,
        Ok(None) => {
            println!("Project not found: {}", project_path.display());
            return 1;
        }
        Err(err) => return fail(&format!("Failed to read project row: {err}")),
    };

    let store = match ProjectStore::open(&project_path) {
        Ok(store) => store,
        Err(err) => return fail(&format!("Failed to open project store: {err}")),
    };

    let snapshot = match store.status_snapshot(RECENT_EVENTS_DEFAULT) {
        Ok(snapshot) => snapshot,
        Err(err) => return fail(&format!("Failed to read status snapshot: {err}")),
    };

    let cap = snapshot
        .project
        .as_ref()
        .map(|p| p.storage_cap_bytes)
        .unwrap_or(0);

    println!("Project: {}", project_path.display());
    println!("Name: {}", project_row.display_name);
    println!("Recording: {}", project_row.recording_state);
    println!(
        "Last updated: {}",
        snapshot
            .project
            .as_ref()
            .and_then(|p| p.last_updated_at.clone())
            .unwrap_or_else(|| "never".to_string())
    );
    println!(
        "Storage: {} / {}",
        human_bytes(snapshot.storage_used_bytes),
        human_bytes(cap)
    );
    println!("Effective changed files: {}", snapshot.effective_changed_files);

    match &snapshot.session {
        Some(session) => println!("Active session: {} ({})", session.id, session.agent),
        None => println!("Active session: none"),
    }

    if !snapshot.sources.is_empty() {
        println!("Sources:");
        for row in &snapshot.sources {
            let detail = row.detail.as_deref().unwrap_or("");
            println!("- {}: {} {}", row.source, row.status, detail);
        }

        println!("Integration:");
        for row in &snapshot.sources {
            if !(row.source.starts_with("mcp:") || row.source.starts_with("hook:") || row.source == "fallback_logs")
            {
                continue;
            }
            let freshness = if is_recent_heartbeat(&row.updated_at) { "fresh" } else { "stale" };
            println!("- {} heartbeat: {} ({freshness})", row.source, row.updated_at);
        }
    }

    if !snapshot.events.is_empty() {
        println!("Recent events:");
        for row in &snapshot.events {
            let effective = if row.is_effective { "effective" } else { "reverted" };
            println!(
                "- [{}] {} ({}, {effective}): {}",
                row.created_at, row.event_type, row.source, row.summary
            );
        }
    }

    if let Some(last_revert) = &snapshot.last_revert {
        println!("Last revert: {} - {}", last_revert.created_at, last_revert.summary);
    }

    0
}

fn is_recent_heartbeat(timestamp: &str) -> bool {
    let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) else {
        return false;
    };
    let age = Utc::now().signed_duration_since(parsed.with_timezone(&Utc));
    age.num_seconds() <= HEARTBEAT_WINDOW_SECS
}

fn fail(message: &str) -> i32 {
    eprintln!("{message}");
    1
}
