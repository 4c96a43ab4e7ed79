use std::io;
use std::path::PathBuf;

pub fn serve(project_path: PathBuf) -> i32 {
    let stdin = io::stdin();
    let stdout = io::stdout();
    match ctx_rpc::serve(&project_path, stdin.lock(), stdout.lock()) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("ctx mcp serve failed: {err}");
            1
        }
    }
}
