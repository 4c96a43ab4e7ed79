use ctx_core::Registry;

pub fn run(include_deleted: bool) -> i32 {
    let registry = match Registry::open_default() {
        Ok(registry) => registry,
        Err(err) => return fail(&format!("Failed to open registry: {err}")),
    };

    let rows = match registry.list_projects(include_deleted) {
        Ok(rows) => rows,
        Err(err) => return fail(&format!("Failed to list projects: {err}")),
    };

    if rows.is_empty() {
        println!("No projects registered.");
        return 0;
    }
    for row in rows {
        println!("{} | name={} | state={}", row.path, row.display_name, row.recording_state);
    }
    0
}

fn fail(message: &str) -> i32 {
    eprintln!("{message}");
    1
}
