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

    let memory_root = project_path.join(".context-memory");
    println!("DB: {}", memory_root.join("context.db").display());
    println!("Logs: {}", memory_root.join("logs").display());
    0
}

fn fail(message: &str) -> i32 {
    eprintln!("{message}");
    1
}
