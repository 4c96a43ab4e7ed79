use std::path::PathBuf;

use ctx_core::{integration, ProjectStore, Registry};
use fs_err as fs;

use super::resolve::{resolve_project_path, Resolved};

pub fn run(path: Option<PathBuf>, name: Option<String>, force: bool) -> i32 {
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

    let _store = match ProjectStore::open(&project_path) {
        Ok(store) => store,
        Err(err) => return fail(&format!("Failed to open project store: {err}")),
    };

    if let Err(err) = registry.upsert_project(&project_path, name.as_deref()) {
        return fail(&format!("Failed to register project: {err}"));
    }

    if let Err(err) = integration::ensure_cursor_mcp_config(&project_path, force) {
        return fail(&format!("Failed to write Cursor MCP config: {err}"));
    }
    if let Err(err) = integration::ensure_claude_hooks(&project_path, force) {
        return fail(&format!("Failed to write Claude hooks config: {err}"));
    }
    if let Err(err) = integration::ensure_rules_document(&project_path, &integration::default_rules_path()) {
        return fail(&format!("Failed to write rules document: {err}"));
    }
    if let Err(err) = integration::ensure_gitignore_entry(&project_path) {
        return fail(&format!("Failed to update .gitignore: {err}"));
    }

    if let Err(err) = _store.set_feature("integration_initialized", "true") {
        return fail(&format!("Failed to record feature flag: {err}"));
    }

    println!("Initialized project integration at: {}", project_path.display());
    println!("Cursor MCP config: {}", project_path.join(".cursor").join("mcp.json").display());
    println!("Claude settings: {}", project_path.join(".claude").join("settings.json").display());
    println!("Next steps:");
    println!("1. ctx start --path {}", project_path.display());
    println!("2. Open Cursor/Claude in {}", project_path.display());
    println!("3. ctx status --path {}", project_path.display());
    0
}

fn fail(message: &str) -> i32 {
    eprintln!("{message}");
    1
}
