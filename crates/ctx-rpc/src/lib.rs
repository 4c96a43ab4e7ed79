//! Library half of the stdio JSON-RPC server: transport framing and
//! method/tool dispatch, reusable by both the standalone `ctx-rpc`
//! binary and the `ctx mcp serve` subcommand.

pub mod handlers;
pub mod transport;

use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use ctx_core::ProjectStore;
use serde_json::Value;
use tracing::{info, warn};
use transport::Framing;

/// Opens the project store at `project_path` and serves JSON-RPC over
/// the given reader/writer until the reader hits a clean EOF.
pub fn serve(project_path: &Path, reader: impl io::Read, writer: impl Write) -> io::Result<()> {
    let store = ProjectStore::open(project_path)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    let project_path_str = project_path.to_string_lossy().into_owned();
    serve_with_store(&store, &project_path_str, reader, writer)
}

pub fn serve_with_store(
    store: &ProjectStore,
    project_path: &str,
    reader: impl io::Read,
    mut writer: impl Write,
) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut framing = Framing::Auto;

    loop {
        let value = match transport::read_message(&mut reader, &mut framing) {
            Ok(value) => value,
            Err(transport::ReadError::Eof) => {
                info!("stdin closed, shutting down");
                return Ok(());
            }
            Err(err) => {
                warn!(error = %err, "failed to read message, skipping");
                continue;
            }
        };

        let Some(response) = handle_value(store, project_path, value) else {
            continue;
        };
        let encoded = serde_json::to_value(&response).expect("response always serializes");
        transport::write_message(&mut writer, framing, &encoded)?;
    }
}

fn handle_value(
    store: &ProjectStore,
    project_path: &str,
    value: Value,
) -> Option<ctx_protocol::Response> {
    let request: ctx_protocol::Request = match serde_json::from_value(value) {
        Ok(req) => req,
        Err(err) => {
            warn!(error = %err, "malformed request");
            return Some(ctx_protocol::Response::error(
                Value::Null,
                ctx_protocol::error_codes::PARSE_ERROR,
                format!("malformed request: {err}"),
            ));
        }
    };

    let id = request.id.clone().unwrap_or(Value::Null);
    let params = request.params.clone().unwrap_or_else(|| Value::Object(Default::default()));
    handlers::handle_request(store, project_path, &request.method, id, params)
}
