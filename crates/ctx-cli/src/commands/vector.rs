use std::path::PathBuf;

use ctx_core::{ProjectStore, Registry};

use super::resolve::{resolve_project_path, Resolved};

pub fn run(path: Option<PathBuf>, name: Option<String>, enabled: bool) -> i32 {
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

    if registry.get_project(&project_path).ok().flatten().is_none() {
        if let Err(err) = registry.upsert_project(&project_path, name.as_deref()) {
            return fail(&format!("Failed to register project: {err}"));
        }
    }

    let store = match ProjectStore::open(&project_path) {
        Ok(store) => store,
        Err(err) => return fail(&format!("Failed to open project store: {err}")),
    };

    let value = if enabled { "true" } else { "false" };
    if let Err(err) = store.set_feature("vector_enabled", value) {
        return fail(&format!("Failed to set feature flag: {err}"));
    }

    let verb = if enabled { "enabled" } else { "disabled" };
    println!("Vector search feature flag {verb} for project: {}", project_path.display());
    0
}

fn fail(message: &str) -> i32 {
    eprintln!("{message}");
    1
}
