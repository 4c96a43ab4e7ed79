//! One-shot hook event classifier and ingestor, reusable by both the
//! standalone `ctx-hook` binary and the `ctx hook ingest` subcommand.

use std::io::Read;
use std::path::Path;

use ctx_core::{ProjectStore, Registry};
use ctx_protocol::EventType;
use serde_json::Value;

/// Reads one payload from `input`, classifies it against `event_name`,
/// and appends a single event if a session is currently running.
/// Returns the line to print; never returns an error that should fail
/// the caller's tool invocation — callers should treat any `Err` the
/// same way as a printed notice (log it, still exit 0).
pub fn ingest(project_path: &Path, event_name: &str, mut input: impl Read) -> ctx_core::Result<String> {
    let _registry = Registry::open_default()?;
    let store = ProjectStore::open(project_path)?;

    let session = store.get_active_session()?;
    let Some(session) = session.filter(|s| s.state == "running") else {
        return Ok("No active ctx session; hook event ignored.".to_string());
    };

    let mut raw = String::new();
    input.read_to_string(&mut raw).ok();
    let payload = parse_payload(&raw);

    let (event_type, files_touched, summary) = classify(&payload, event_name);

    let mut tool_name = None;
    let mut tool_result = None;
    if event_name == "PreToolUse" || event_name == "PostToolUse" {
        tool_name = payload.get("tool_name").and_then(Value::as_str);
        tool_result = payload.get("result").and_then(Value::as_str);
    }

    store.insert_event(
        session.id,
        event_type,
        &summary,
        &files_touched,
        "hook:claude",
        None,
        None,
        None,
        tool_name,
        tool_result,
        None,
    )?;
    store.update_source_status(
        session.id,
        "hook:claude",
        "available",
        &format!("{event_name} heartbeat"),
    )?;

    Ok(format!("Hook event ingested: {event_name}"))
}

fn parse_payload(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Object(Default::default());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ Value::Object(_)) => value,
        _ => serde_json::json!({ "text": trimmed }),
    }
}

fn event_type_for_hook(event_name: &str) -> EventType {
    match event_name {
        "UserPromptSubmit" => EventType::UserIntent,
        "PreToolUse" | "PostToolUse" => EventType::ToolUse,
        "Stop" => EventType::Handoff,
        _ => EventType::TaskStatus,
    }
}

fn classify(payload: &Value, event_name: &str) -> (EventType, Vec<String>, String) {
    let event_type = event_type_for_hook(event_name);

    let summary = ["summary", "message", "text", "prompt", "input", "content"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Claude hook event received: {event_name}."));

    let files_touched = ["files_touched", "files", "changed_files"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_array))
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    (event_type, files_touched, summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_known_hook_names() {
        let payload = serde_json::json!({"prompt": "add tests"});
        let (event_type, _, summary) = classify(&payload, "UserPromptSubmit");
        assert_eq!(event_type, EventType::UserIntent);
        assert_eq!(summary, "add tests");
    }

    #[test]
    fn classify_falls_back_to_task_status_for_unknown_event() {
        let (event_type, _, summary) = classify(&Value::Null, "SomeFutureEvent");
        assert_eq!(event_type, EventType::TaskStatus);
        assert!(summary.contains("SomeFutureEvent"));
    }

    #[test]
    fn classify_extracts_files_touched_variants() {
        let payload = serde_json::json!({"message": "edited", "changed_files": ["a.rs", "b.rs"]});
        let (_, files, _) = classify(&payload, "PostToolUse");
        assert_eq!(files, vec!["a.rs".to_string(), "b.rs".to_string()]);
    }

    #[test]
    fn parse_payload_wraps_plain_text() {
        let payload = parse_payload("just some text\n");
        assert_eq!(payload["text"], "just some text");
    }

    #[test]
    fn parse_payload_handles_empty_stdin() {
        let payload = parse_payload("   \n");
        assert!(payload.is_object());
        assert!(payload.as_object().unwrap().is_empty());
    }

    #[test]
    fn ingest_without_active_session_returns_notice_and_does_not_error() {
        let dir = tempfile::TempDir::new().unwrap();
        std::env::set_var("CTX_HOME", dir.path().join("home"));
        let project = dir.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        let message = ingest(&project, "Stop", std::io::empty()).unwrap();
        assert!(message.contains("No active ctx session"));
    }
}
