use std::path::PathBuf;

use ctx_core::Registry;
use fs_err as fs;

use super::resolve::{resolve_project_path, Resolved};

pub fn run(path: Option<PathBuf>, name: Option<String>, force: bool) -> i32 {
    if !force {
        println!("Refusing purge without --force.");
        return 1;
    }

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

    if let Ok(Some(row)) = registry.get_project(&project_path) {
        if row.recording_state == "recording" {
            println!("Stop recording before purge.");
            return 1;
        }
    }

    let memory_root = project_path.join(".context-memory");
    if memory_root.exists() {
        if let Err(err) = fs::remove_dir_all(&memory_root) {
            return fail(&format!("Failed to remove {}: {err}", memory_root.display()));
        }
    }
    if let Err(err) = registry.remove_project(&project_path) {
        return fail(&format!("Failed to remove project from registry: {err}"));
    }

    println!("Purged project context: {}", project_path.display());
    0
}

fn fail(message: &str) -> i32 {
    eprintln!("{message}");
    1
}
