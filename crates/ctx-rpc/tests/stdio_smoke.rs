//! End-to-end smoke test: spawn the real binary, drive it over stdio
//! with newline-delimited JSON, and check the responses it writes back.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};

use serde_json::{json, Value};
use tempfile::TempDir;

struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn(project_path: &std::path::Path) -> ChildGuard {
    let child = Command::new(env!("CARGO_BIN_EXE_ctx-rpc"))
        .arg("--project-path")
        .arg(project_path)
        .env("RUST_LOG", "error")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn ctx-rpc");
    ChildGuard(child)
}

fn send(stdin: &mut impl Write, request: Value) {
    let mut line = serde_json::to_vec(&request).unwrap();
    line.push(b'\n');
    stdin.write_all(&line).unwrap();
    stdin.flush().unwrap();
}

fn recv(reader: &mut impl BufRead) -> Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("expected a response line");
    serde_json::from_str(line.trim_end()).expect("response was not valid JSON")
}

#[test]
fn ping_tool_call_round_trips_over_newline_framing() {
    let project = TempDir::new().unwrap();
    let mut guard = spawn(project.path());
    let mut stdin = guard.0.stdin.take().unwrap();
    let mut stdout = BufReader::new(guard.0.stdout.take().unwrap());

    send(
        &mut stdin,
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
    );
    let init_response = recv(&mut stdout);
    assert_eq!(init_response["id"], 1);
    assert!(init_response["result"]["serverInfo"]["name"].is_string());

    send(
        &mut stdin,
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "ping", "arguments": {"client": "claude"}},
        }),
    );
    let ping_response = recv(&mut stdout);
    assert_eq!(ping_response["id"], 2);
    assert_eq!(
        ping_response["result"]["structuredContent"]["pong"],
        Value::Bool(true)
    );
}

#[test]
fn append_event_without_session_reports_no_active_session_error() {
    let project = TempDir::new().unwrap();
    let mut guard = spawn(project.path());
    let mut stdin = guard.0.stdin.take().unwrap();
    let mut stdout = BufReader::new(guard.0.stdout.take().unwrap());

    send(
        &mut stdin,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "append_event", "arguments": {"summary": "no session yet"}},
        }),
    );
    let response = recv(&mut stdout);
    assert_eq!(response["error"]["code"], -32010);
}

#[test]
fn unknown_method_returns_method_not_found() {
    let project = TempDir::new().unwrap();
    let mut guard = spawn(project.path());
    let mut stdin = guard.0.stdin.take().unwrap();
    let mut stdout = BufReader::new(guard.0.stdout.take().unwrap());

    send(
        &mut stdin,
        json!({"jsonrpc": "2.0", "id": 1, "method": "not/a/real/method", "params": {}}),
    );
    let response = recv(&mut stdout);
    assert_eq!(response["error"]["code"], -32601);
}
