use std::io;
use std::path::PathBuf;

pub fn ingest(project_path: PathBuf, event: String) -> i32 {
    match ctx_hook::ingest(&project_path, &event, io::stdin()) {
        Ok(message) => println!("{message}"),
        Err(err) => {
            tracing::warn!(error = %err, "ctx hook ingest failed");
            println!("Hook event ignored due to an internal error.");
        }
    }
    0
}
