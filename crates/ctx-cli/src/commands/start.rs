use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use ctx_core::{process, ProjectStore, Registry};
use fs_err as fs;

use super::resolve::{resolve_project_path, Resolved};

pub fn run(path: Option<PathBuf>, name: Option<String>, agent: String) -> i32 {
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

    if let Err(err) = fs::create_dir_all(&project_path) {
        return fail(&format!("Failed to create project directory: {err}"));
    }

    let store = match ProjectStore::open(&project_path) {
        Ok(store) => store,
        Err(err) => return fail(&format!("Failed to open project store: {err}")),
    };

    if let Err(err) = registry.upsert_project(&project_path, name.as_deref()) {
        return fail(&format!("Failed to register project: {err}"));
    }

    let project_row = match registry.get_project(&project_path) {
        Ok(row) => row,
        Err(err) => return fail(&format!("Failed to read project row: {err}")),
    };

    if let Some(row) = &project_row {
        if row.deleted_at.is_some() {
            println!("Project '{}' is soft-deleted. Purge or restore before start.", project_path.display());
            return 1;
        }
        if row.recording_state == "recording" {
            if let Some(pid) = row.recorder_pid {
                if process::is_pid_alive(pid) {
                    println!(
                        "Already recording. Session: {}, PID: {pid}",
                        row.active_session_id.unwrap_or_default()
                    );
                    println!("DB: {}", store.db_path().display());
                    println!("Logs: {}", store.logs_dir().display());
                    return 0;
                }
            }
            if let Some(stale_session) = row.active_session_id {
                let _ = store.set_session_state(stale_session, "stopped");
            }
            let _ = registry.set_recording_state(&project_path, "stopped", None, None);
        }
    }

    let session_id = match store.create_session(&agent, None) {
        Ok(id) => id,
        Err(err) => return fail(&format!("Failed to create session: {err}")),
    };

    if let Err(err) = seed_source_expectations(&store, &registry, &project_path, session_id) {
        return fail(&format!("Failed to seed source expectations: {err}"));
    }

    let pid = match spawn_recorder(&project_path, session_id) {
        Ok(pid) => pid,
        Err(err) => return fail(&format!("Failed to spawn recorder: {err}")),
    };

    if let Err(err) = registry.set_recording_state(&project_path, "recording", Some(session_id), Some(pid)) {
        return fail(&format!("Failed to record recording state: {err}"));
    }

    println!("Recording started. Session: {session_id}, PID: {pid}");
    println!("DB: {}", store.db_path().display());
    println!("Logs: {}", store.logs_dir().display());
    0
}

fn seed_source_expectations(
    store: &ProjectStore,
    registry: &Registry,
    project_path: &Path,
    session_id: i64,
) -> ctx_core::Result<()> {
    store.update_source_status(session_id, "mcp:cursor", "unknown", "awaiting MCP heartbeat")?;
    store.update_source_status(session_id, "mcp:claude", "unknown", "awaiting MCP heartbeat")?;
    store.update_source_status(session_id, "hook:claude", "unknown", "awaiting Claude hook event")?;

    let adapters = registry.adapter_map(project_path)?;
    if adapters.is_empty() {
        store.update_source_status(session_id, "fallback_logs", "unavailable", "no adapter logs configured")?;
        return Ok(());
    }

    let mut existing = Vec::new();
    let mut missing = Vec::new();
    for (adapter, log_path) in &adapters {
        if Path::new(log_path).exists() {
            existing.push(format!("{adapter}:{log_path}"));
        } else {
            missing.push(format!("{adapter}:{log_path}"));
        }
    }
    if !existing.is_empty() {
        let mut detail = format!("configured logs={}", existing.join("; "));
        if !missing.is_empty() {
            detail.push_str(&format!("; missing={}", missing.join("; ")));
        }
        store.update_source_status(session_id, "fallback_logs", "available", &detail)?;
    } else {
        store.update_source_status(
            session_id,
            "fallback_logs",
            "degraded",
            &format!("configured but missing: {}", missing.join(", ")),
        )?;
    }
    Ok(())
}

/// Locates `ctx-recorder` next to the running `ctx` binary, falling back
/// to `$PATH`, and spawns it detached (own session, no inherited stdio).
fn spawn_recorder(project_path: &Path, session_id: i64) -> std::io::Result<u32> {
    let binary = recorder_binary_path();
    let mut command = Command::new(binary);
    command
        .arg("--project-path")
        .arg(project_path)
        .arg("--session-id")
        .arg(session_id.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let child = command.spawn()?;
    Ok(child.id())
}

fn recorder_binary_path() -> PathBuf {
    let name = if cfg!(windows) { "ctx-recorder.exe" } else { "ctx-recorder" };
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(name)))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from(name))
}

fn fail(message: &str) -> i32 {
    eprintln!("{message}");
    1
}
