use std::path::PathBuf;

use ctx_core::Registry;

use super::resolve::{resolve_project_path, Resolved};

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

    let row = match registry.get_project(&project_path) {
        Ok(Some(row)) => row,
        Ok(None) => {
            println!("Project not found: {}", project_path.display());
            return 1;
        }
        Err(err) => return fail(&format!("Failed to read project row: {err}")),
    };

    if row.recording_state == "recording" {
        println!("Stop recording before delete.");
        return 1;
    }

    if let Err(err) = registry.set_deleted(&project_path, true) {
        return fail(&format!("Failed to soft-delete project: {err}"));
    }

    println!("Soft deleted project context: {}", project_path.display());
    0
}

fn fail(message: &str) -> i32 {
    eprintln!("{message}");
    1
}
