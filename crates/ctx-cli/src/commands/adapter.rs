use std::path::PathBuf;

use ctx_core::Registry;

use super::resolve::{resolve_project_path, Resolved};

pub fn configure(adapter: String, log_path: PathBuf, path: Option<PathBuf>, name: Option<String>) -> i32 {
    let adapter = adapter.to_lowercase();
    if adapter != "cursor" && adapter != "claude" {
        println!("Adapter must be 'cursor' or 'claude'.");
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

    let log_path = log_path.canonicalize().unwrap_or(log_path);
    if let Err(err) =
        registry.set_adapter_log_path(&project_path, &adapter, log_path.to_string_lossy().as_ref())
    {
        return fail(&format!("Failed to configure adapter: {err}"));
    }

    println!("Configured {adapter} log path: {}", log_path.display());
    println!("Config file: {}", registry.config_path().display());
    0
}

fn fail(message: &str) -> i32 {
    eprintln!("{message}");
    1
}
