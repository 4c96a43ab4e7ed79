//! Method and tool dispatch for the stdio JSON-RPC server.

use ctx_core::ProjectStore;
use ctx_protocol::{error_codes, EventType, Response};
use serde_json::{json, Value};

pub struct McpError {
    pub code: i64,
    pub message: String,
}

impl McpError {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: error_codes::INVALID_PARAMS,
            message: message.into(),
        }
    }
}

pub fn handle_request(
    store: &ProjectStore,
    project_path: &str,
    method: &str,
    id: Value,
    params: Value,
) -> Option<Response> {
    if method == "notifications/initialized" {
        return None;
    }

    let result = dispatch(store, project_path, method, &params);
    Some(match result {
        Ok(value) => Response::ok(id, value),
        Err(err) => Response::error(id, err.code, err.message),
    })
}

fn dispatch(
    store: &ProjectStore,
    project_path: &str,
    method: &str,
    params: &Value,
) -> Result<Value, McpError> {
    match method {
        "initialize" => Ok(json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {"name": "ctx-memory", "version": env!("CARGO_PKG_VERSION")},
            "capabilities": {"tools": {}},
        })),
        "ping" => Ok(json!({"ok": true})),
        "tools/list" => Ok(json!({"tools": tools_spec()})),
        "tools/call" => {
            let name = params
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| McpError::invalid_params("tools/call requires tool name"))?;
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            call_tool(store, project_path, name, &arguments)
        }
        other => Err(McpError {
            code: error_codes::METHOD_NOT_FOUND,
            message: format!("Method not found: {other}"),
        }),
    }
}

fn tool_result(payload: Value) -> Value {
    json!({
        "content": [{"type": "text", "text": payload.to_string()}],
        "isError": false,
        "structuredContent": payload,
    })
}

fn call_tool(
    store: &ProjectStore,
    project_path: &str,
    name: &str,
    args: &Value,
) -> Result<Value, McpError> {
    match name {
        "get_context" => get_context(store, project_path, args),
        "append_event" => append_event(store, args),
        "start_chat_session" => start_chat_session(store, args),
        "stop_chat_session" => stop_chat_session(store, args),
        "ping" => ping(store, args),
        other => Err(McpError {
            code: error_codes::METHOD_NOT_FOUND,
            message: format!("Unknown tool: {other}"),
        }),
    }
}

fn active_session_id(store: &ProjectStore) -> Result<Option<i64>, McpError> {
    store
        .get_active_session()
        .map(|opt| opt.map(|s| s.id))
        .map_err(|e| internal(e))
}

fn internal(err: ctx_core::CoreError) -> McpError {
    McpError {
        code: error_codes::INTERNAL_ERROR,
        message: format!("Internal error: {err}"),
    }
}

fn get_context(store: &ProjectStore, project_path: &str, args: &Value) -> Result<Value, McpError> {
    let max_events = args
        .get("max_events")
        .and_then(Value::as_i64)
        .unwrap_or(20)
        .clamp(1, 100);
    let include_effective_state = args
        .get("include_effective_state")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let snapshot = store.status_snapshot(max_events).map_err(internal)?;
    let events: Vec<Value> = snapshot
        .events
        .iter()
        .map(|e| {
            json!({
                "event_type": e.event_type,
                "summary": e.summary,
                "source": e.source,
                "created_at": e.created_at,
                "is_effective": e.is_effective as i64,
            })
        })
        .collect();

    let mut payload = json!({
        "project": project_path,
        "last_updated_at": snapshot.project.and_then(|p| p.last_updated_at),
        "recent_events": events,
        "open_items": [],
        "style_signals": [],
    });
    if include_effective_state {
        payload["effective_changed_files"] = json!(snapshot.effective_changed_files);
    }
    Ok(tool_result(payload))
}

fn append_event(store: &ProjectStore, args: &Value) -> Result<Value, McpError> {
    let session_id = match args.get("session_id").and_then(Value::as_i64) {
        Some(id) => id,
        None => active_session_id(store)?.ok_or_else(|| McpError {
            code: error_codes::NO_ACTIVE_SESSION,
            message: "No active session. Run `ctx start` first.".to_string(),
        })?,
    };

    let event_type = args
        .get("event_type")
        .and_then(Value::as_str)
        .map(EventType::parse)
        .unwrap_or(EventType::TaskStatus);

    let summary = args
        .get("summary")
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::invalid_params("summary is required"))?;

    let files_touched: Vec<String> = args
        .get("files_touched")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let decision = args.get("decision").and_then(Value::as_bool).unwrap_or(false);
    let tool_name = args.get("tool_name").and_then(Value::as_str);
    let tool_result_text = args.get("tool_result").and_then(Value::as_str);
    let client = args
        .get("client")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_lowercase();
    let mut source = if client == "cursor" || client == "claude" {
        format!("mcp:{client}")
    } else {
        "mcp:unknown".to_string()
    };
    if let Some(detail) = args.get("source_detail").and_then(Value::as_str) {
        let truncated: String = detail.chars().take(40).collect();
        source = format!("{source}:{truncated}");
    }

    let event_id = store
        .insert_event(
            session_id,
            event_type,
            summary,
            &files_touched,
            &source,
            None,
            None,
            None,
            tool_name,
            tool_result_text,
            if decision { Some(summary) } else { None },
        )
        .map_err(internal)?;

    if client == "cursor" || client == "claude" {
        store
            .update_source_status(session_id, &format!("mcp:{client}"), "available", "heartbeat")
            .map_err(internal)?;
    }

    Ok(tool_result(json!({"ok": true, "event_id": event_id, "session_id": session_id})))
}

fn start_chat_session(store: &ProjectStore, args: &Value) -> Result<Value, McpError> {
    let client = args
        .get("client")
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .filter(|c| c == "cursor" || c == "claude")
        .ok_or_else(|| McpError::invalid_params("client must be 'cursor' or 'claude'"))?;
    let external_ref = args.get("external_session_ref").and_then(Value::as_str);

    let session_id = match store.get_active_session().map_err(internal)? {
        Some(session) => {
            if let Some(external_ref) = external_ref {
                store
                    .set_session_external_ref(session.id, external_ref)
                    .map_err(internal)?;
            }
            session.id
        }
        None => store.create_session(&client, external_ref).map_err(internal)?,
    };

    store
        .update_source_status(session_id, &format!("mcp:{client}"), "available", "started")
        .map_err(internal)?;

    Ok(tool_result(json!({"session_id": session_id})))
}

fn stop_chat_session(store: &ProjectStore, args: &Value) -> Result<Value, McpError> {
    let session_id = args
        .get("session_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| McpError::invalid_params("session_id is required"))?;
    store.set_session_state(session_id, "stopped").map_err(internal)?;
    Ok(tool_result(json!({"stopped": true, "session_id": session_id})))
}

fn ping(store: &ProjectStore, args: &Value) -> Result<Value, McpError> {
    let client = args
        .get("client")
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .filter(|c| c == "cursor" || c == "claude")
        .ok_or_else(|| McpError::invalid_params("client must be 'cursor' or 'claude'"))?;

    let session_id = active_session_id(store)?;
    if let Some(session_id) = session_id {
        store
            .update_source_status(session_id, &format!("mcp:{client}"), "available", "heartbeat")
            .map_err(internal)?;
    }
    Ok(tool_result(json!({"pong": true, "client": client, "session_id": session_id})))
}

fn tools_spec() -> Value {
    json!([
        {
            "name": "get_context",
            "description": "Fetch project context summary from local memory.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "max_events": {"type": "integer", "minimum": 1, "maximum": 100, "default": 20},
                    "include_effective_state": {"type": "boolean", "default": true},
                },
            },
        },
        {
            "name": "append_event",
            "description": "Append a summarized event into project memory.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "event_type": {"type": "string"},
                    "summary": {"type": "string"},
                    "files_touched": {"type": "array", "items": {"type": "string"}},
                    "decision": {"type": "boolean", "default": false},
                    "tool_name": {"type": ["string", "null"]},
                    "tool_result": {"type": ["string", "null"]},
                    "source_detail": {"type": ["string", "null"]},
                    "client": {"type": ["string", "null"]},
                    "session_id": {"type": ["integer", "null"]},
                },
                "required": ["summary"],
            },
        },
        {
            "name": "start_chat_session",
            "description": "Start or attach to a chat session for a client.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "client": {"type": "string", "enum": ["cursor", "claude"]},
                    "external_session_ref": {"type": ["string", "null"]},
                },
                "required": ["client"],
            },
        },
        {
            "name": "stop_chat_session",
            "description": "Stop a session by id.",
            "inputSchema": {
                "type": "object",
                "properties": {"session_id": {"type": "integer"}},
                "required": ["session_id"],
            },
        },
        {
            "name": "ping",
            "description": "Heartbeat for MCP diagnostics.",
            "inputSchema": {
                "type": "object",
                "properties": {"client": {"type": "string", "enum": ["cursor", "claude"]}},
                "required": ["client"],
            },
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ProjectStore) {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn append_event_without_session_returns_no_active_session_error() {
        let (_dir, store) = store();
        let result = append_event(&store, &json!({"summary": "did a thing"}));
        assert_eq!(result.unwrap_err().code, error_codes::NO_ACTIVE_SESSION);
    }

    #[test]
    fn append_event_requires_summary() {
        let (_dir, store) = store();
        store.create_session("claude", None).unwrap();
        let result = append_event(&store, &json!({}));
        assert_eq!(result.unwrap_err().code, error_codes::INVALID_PARAMS);
    }

    #[test]
    fn start_chat_session_reuses_existing_active_session() {
        let (_dir, store) = store();
        let first = start_chat_session(&store, &json!({"client": "claude"})).unwrap();
        let second = start_chat_session(&store, &json!({"client": "claude"})).unwrap();
        assert_eq!(
            first["structuredContent"]["session_id"],
            second["structuredContent"]["session_id"]
        );
    }

    #[test]
    fn get_context_clamps_max_events() {
        let (_dir, store) = store();
        store.create_session("claude", None).unwrap();
        let result = get_context(&store, "/tmp/project", &json!({"max_events": 0})).unwrap();
        assert!(result["structuredContent"]["recent_events"].is_array());
    }
}
