use std::path::PathBuf;
use std::time::Duration;

use ctx_core::{process, ProjectStore, Registry};

use super::resolve::{resolve_project_path, Resolved};

const WAIT_FOR_EXIT: Duration = Duration::from_secs(10);
const WAIT_AFTER_TERMINATE: Duration = Duration::from_secs(2);

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

    if project_row.recording_state != "recording" {
        println!("Recorder already stopped.");
        return 0;
    }

    let store = match ProjectStore::open(&project_path) {
        Ok(store) => store,
        Err(err) => return fail(&format!("Failed to open project store: {err}")),
    };

    if let Some(session_id) = project_row.active_session_id {
        let _ = store.set_session_state(session_id, "stopping");
    }

    if let Some(pid) = project_row.recorder_pid {
        if process::is_pid_alive(pid) {
            if !process::wait_for_process_exit(pid, WAIT_FOR_EXIT) {
                process::terminate_pid(pid);
                process::wait_for_process_exit(pid, WAIT_AFTER_TERMINATE);
            }
        }
    }

    if let Some(session_id) = project_row.active_session_id {
        let _ = store.set_session_state(session_id, "stopped");
    }
    if let Err(err) = registry.set_recording_state(&project_path, "stopped", None, None) {
        return fail(&format!("Failed to clear recording state: {err}"));
    }

    println!("Recording stopped.");
    0
}

fn fail(message: &str) -> i32 {
    eprintln!("{message}");
    1
}
