use std::path::PathBuf;

use ctx_core::integration::{self, IntegrationReport, IntegrationStatus};
use ctx_core::types::SourceStatusRow;
use ctx_core::{ProjectStore, Registry};
use serde_json::json;

use super::resolve::{resolve_project_path, Resolved};

const HEARTBEAT_WINDOW_SECS: i64 = 600;

pub fn run(path: Option<PathBuf>, name: Option<String>, as_json: bool) -> i32 {
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

    let store = match ProjectStore::open(&project_path) {
        Ok(store) => store,
        Err(err) => return fail(&format!("Failed to open project store: {err}")),
    };

    let snapshot = match store.status_snapshot(1) {
        Ok(snapshot) => snapshot,
        Err(err) => return fail(&format!("Failed to read status snapshot: {err}")),
    };

    let cursor_mcp = merge(
        integration::inspect_cursor_mcp_config(&project_path),
        find_source(&snapshot.sources, "mcp:cursor"),
    );
    let claude_hooks = merge(
        integration::inspect_claude_hooks(&project_path),
        find_source(&snapshot.sources, "hook:claude"),
    );
    let fallback_logs = fallback_logs_check(&registry, &project_path);
    let executable = integration::executable_health();

    if as_json {
        let payload = json!({
            "project": project_path.to_string_lossy(),
            "checks": {
                "cursor_mcp": {"status": cursor_mcp.0, "detail": cursor_mcp.1},
                "claude_hooks": {"status": claude_hooks.0, "detail": claude_hooks.1},
                "fallback_logs": {"status": fallback_logs.0, "detail": fallback_logs.1},
                "ctx_executable": {"status": format!("{:?}", executable.status).to_lowercase(), "detail": executable.detail},
            },
        });
        println!("{}", serde_json::to_string_pretty(&payload).unwrap());
    } else {
        println!("Project: {}", project_path.display());
        println!("- cursor_mcp: {} - {}", cursor_mcp.0, cursor_mcp.1);
        println!("- claude_hooks: {} - {}", claude_hooks.0, claude_hooks.1);
        println!("- fallback_logs: {} - {}", fallback_logs.0, fallback_logs.1);
        println!("- ctx_executable: {:?} - {}", executable.status, executable.detail);
    }
    0
}

fn find_source<'a>(sources: &'a [SourceStatusRow], name: &str) -> Option<&'a SourceStatusRow> {
    sources.iter().find(|row| row.source == name)
}

/// Combines a config-file inspection with the most recent heartbeat
/// recorded for that source into one ("state", "detail") pair.
fn merge(config: IntegrationReport, heartbeat: Option<&SourceStatusRow>) -> (String, String) {
    match config.status {
        IntegrationStatus::Missing => return ("unavailable".to_string(), config.detail),
        IntegrationStatus::Stale => return ("degraded".to_string(), config.detail),
        IntegrationStatus::Ok => {}
    }
    match heartbeat {
        None => ("degraded".to_string(), format!("{} configured but no heartbeat yet", config.surface)),
        Some(row) if row.status == "available" && is_recent(&row.updated_at) => {
            ("connected".to_string(), format!("{} (last={})", row.detail.clone().unwrap_or_default(), row.updated_at))
        }
        Some(row) if row.status == "available" => {
            ("degraded".to_string(), format!("stale heartbeat (last={})", row.updated_at))
        }
        Some(row) => (
            "degraded".to_string(),
            row.detail.clone().unwrap_or_else(|| format!("{} {}", config.surface, row.status)),
        ),
    }
}

fn fallback_logs_check(registry: &Registry, project_path: &std::path::Path) -> (String, String) {
    let adapters = match registry.adapter_map(project_path) {
        Ok(map) => map,
        Err(err) => return ("unavailable".to_string(), format!("failed to read adapter config: {err}")),
    };
    if adapters.is_empty() {
        return ("unavailable".to_string(), "no fallback adapter logs configured".to_string());
    }
    let mut existing = Vec::new();
    let mut missing = Vec::new();
    for (adapter, log_path) in &adapters {
        if std::path::Path::new(log_path).exists() {
            existing.push(format!("{adapter}:{log_path}"));
        } else {
            missing.push(format!("{adapter}:{log_path}"));
        }
    }
    if !existing.is_empty() {
        let mut detail = format!("configured logs: {}", existing.join("; "));
        if !missing.is_empty() {
            detail.push_str(&format!("; missing: {}", missing.join("; ")));
        }
        ("connected".to_string(), detail)
    } else {
        ("degraded".to_string(), format!("configured logs missing: {}", missing.join(", ")))
    }
}

fn is_recent(timestamp: &str) -> bool {
    let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(timestamp) else {
        return false;
    };
    let age = chrono::Utc::now().signed_duration_since(parsed.with_timezone(&chrono::Utc));
    age.num_seconds() <= HEARTBEAT_WINDOW_SECS
}

fn fail(message: &str) -> i32 {
    eprintln!("{message}");
    1
}
