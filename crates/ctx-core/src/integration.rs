//! Idempotent writers that keep editor configuration in sync with a
//! project's recording setup. Each writer has a paired inspector so
//! `ctx doctor` can report health without re-running the write.

use std::path::{Path, PathBuf};

use fs_err as fs;
use serde_json::{json, Value};

use crate::error::{CoreError, Result};

const MCP_SERVER_NAME: &str = "ctx-memory";
const RULES_MARKER_START: &str = "<!-- ctx-memory:start -->";
const RULES_MARKER_END: &str = "<!-- ctx-memory:end -->";
const GITIGNORE_ENTRY: &str = ".context-memory/";

const HOOK_EVENTS: &[&str] = &["UserPromptSubmit", "PreToolUse", "PostToolUse", "Stop"];

#[derive(Debug, Clone, PartialEq)]
pub enum IntegrationStatus {
    Ok,
    Missing,
    Stale,
}

pub struct IntegrationReport {
    pub surface: &'static str,
    pub status: IntegrationStatus,
    pub detail: String,
}

fn ctx_executable() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_else(|| "ctx".to_string())
}

// ───── Cursor MCP config ─────

pub fn ensure_cursor_mcp_config(project_root: &Path, force: bool) -> Result<()> {
    let path = project_root.join(".cursor").join("mcp.json");
    let mut doc = read_json_object(&path)?;
    let servers = doc
        .entry("mcpServers".to_string())
        .or_insert_with(|| json!({}));
    let servers_obj = servers
        .as_object_mut()
        .ok_or_else(|| CoreError::InvalidArgument("mcpServers must be an object".into()))?;

    let needs_write = force || !servers_obj.contains_key(MCP_SERVER_NAME);
    if needs_write {
        servers_obj.insert(
            MCP_SERVER_NAME.to_string(),
            json!({
                "command": ctx_executable(),
                "args": ["mcp", "serve", "--project-path", project_root.to_string_lossy()],
            }),
        );
        write_json(&path, &Value::Object(doc))?;
    }
    Ok(())
}

pub fn inspect_cursor_mcp_config(project_root: &Path) -> IntegrationReport {
    let path = project_root.join(".cursor").join("mcp.json");
    match read_json_object(&path) {
        Ok(doc) => {
            let present = doc
                .get("mcpServers")
                .and_then(|v| v.as_object())
                .map(|servers| servers.contains_key(MCP_SERVER_NAME))
                .unwrap_or(false);
            IntegrationReport {
                surface: "cursor-mcp",
                status: if present {
                    IntegrationStatus::Ok
                } else {
                    IntegrationStatus::Stale
                },
                detail: path.to_string_lossy().to_string(),
            }
        }
        Err(_) => IntegrationReport {
            surface: "cursor-mcp",
            status: IntegrationStatus::Missing,
            detail: path.to_string_lossy().to_string(),
        },
    }
}

// ───── Claude settings hooks ─────

pub fn ensure_claude_hooks(project_root: &Path, force: bool) -> Result<()> {
    let path = project_root.join(".claude").join("settings.json");
    let mut doc = read_json_object(&path)?;
    let hooks = doc
        .entry("hooks".to_string())
        .or_insert_with(|| json!({}));
    let hooks_obj = hooks
        .as_object_mut()
        .ok_or_else(|| CoreError::InvalidArgument("hooks must be an object".into()))?;

    for event in HOOK_EVENTS {
        let command = format!(
            "{} hook ingest --project-path {} --event {}",
            ctx_executable(),
            project_root.to_string_lossy(),
            event
        );
        let entries = hooks_obj
            .entry(event.to_string())
            .or_insert_with(|| json!([]));
        let array = entries
            .as_array_mut()
            .ok_or_else(|| CoreError::InvalidArgument(format!("hooks.{event} must be an array")))?;

        let already_present = array.iter().any(|entry| {
            entry
                .get("command")
                .and_then(Value::as_str)
                .map(|c| c == command)
                .unwrap_or(false)
        });
        if force || !already_present {
            if force {
                array.retain(|entry| {
                    entry
                        .get("command")
                        .and_then(Value::as_str)
                        .map(|c| !c.contains(MCP_SERVER_NAME) && c != command)
                        .unwrap_or(true)
                });
            }
            if !already_present || force {
                array.push(json!({"command": command}));
            }
        }
    }

    write_json(&path, &Value::Object(doc))
}

pub fn inspect_claude_hooks(project_root: &Path) -> IntegrationReport {
    let path = project_root.join(".claude").join("settings.json");
    match read_json_object(&path) {
        Ok(doc) => {
            let all_present = HOOK_EVENTS.iter().all(|event| {
                doc.get("hooks")
                    .and_then(|h| h.get(event))
                    .and_then(Value::as_array)
                    .map(|arr| !arr.is_empty())
                    .unwrap_or(false)
            });
            IntegrationReport {
                surface: "claude-hooks",
                status: if all_present {
                    IntegrationStatus::Ok
                } else {
                    IntegrationStatus::Stale
                },
                detail: path.to_string_lossy().to_string(),
            }
        }
        Err(_) => IntegrationReport {
            surface: "claude-hooks",
            status: IntegrationStatus::Missing,
            detail: path.to_string_lossy().to_string(),
        },
    }
}

// ───── Rules document ─────

pub fn ensure_rules_document(project_root: &Path, rules_path: &Path) -> Result<()> {
    let full_path = project_root.join(rules_path);
    let existing = fs::read_to_string(&full_path).unwrap_or_default();

    let block = format!(
        "{RULES_MARKER_START}\n\
         This project records a factual activity log via hooks. Do not\n\
         paste raw transcripts; let the hook ingestor summarize tool use,\n\
         decisions and file changes automatically.\n\
         {RULES_MARKER_END}\n"
    );

    let updated = if let (Some(start), Some(end)) = (
        existing.find(RULES_MARKER_START),
        existing.find(RULES_MARKER_END),
    ) {
        let end = end + RULES_MARKER_END.len();
        format!("{}{}{}", &existing[..start], block, &existing[end..])
    } else if existing.is_empty() {
        block
    } else {
        format!("{existing}\n{block}")
    };

    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
    }
    fs::write(&full_path, updated).map_err(|e| CoreError::io(&full_path, e))
}

// ───── .gitignore ─────

pub fn ensure_gitignore_entry(project_root: &Path) -> Result<()> {
    let path = project_root.join(".gitignore");
    let existing = fs::read_to_string(&path).unwrap_or_default();
    if existing.lines().any(|line| line.trim() == GITIGNORE_ENTRY) {
        return Ok(());
    }
    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(GITIGNORE_ENTRY);
    updated.push('\n');
    fs::write(&path, updated).map_err(|e| CoreError::io(&path, e))
}

// ───── Helpers ─────

fn read_json_object(path: &Path) -> Result<serde_json::Map<String, Value>> {
    match fs::read_to_string(path) {
        Ok(text) => {
            let value: Value = serde_json::from_str(&text)?;
            Ok(value.as_object().cloned().unwrap_or_default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(serde_json::Map::new()),
        Err(e) => Err(CoreError::io(path, e)),
    }
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
    }
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).map_err(|e| CoreError::io(path, e))
}

pub fn default_rules_path() -> PathBuf {
    PathBuf::from("CLAUDE.md")
}

pub fn executable_health() -> IntegrationReport {
    let path = ctx_executable();
    let status = if Path::new(&path).is_absolute() {
        IntegrationStatus::Ok
    } else {
        IntegrationStatus::Stale
    };
    IntegrationReport {
        surface: "ctx-executable",
        status,
        detail: path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_cursor_mcp_config_creates_entry_once() {
        let dir = TempDir::new().unwrap();
        ensure_cursor_mcp_config(dir.path(), false).unwrap();
        let report = inspect_cursor_mcp_config(dir.path());
        assert_eq!(report.status, IntegrationStatus::Ok);
    }

    #[test]
    fn ensure_cursor_mcp_config_preserves_unrelated_servers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".cursor").join("mcp.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            serde_json::to_string(&json!({"mcpServers": {"other": {"command": "x"}}})).unwrap(),
        )
        .unwrap();

        ensure_cursor_mcp_config(dir.path(), false).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert!(doc["mcpServers"]["other"].is_object());
        assert!(doc["mcpServers"][MCP_SERVER_NAME].is_object());
    }

    #[test]
    fn ensure_claude_hooks_adds_all_events_without_duplicating() {
        let dir = TempDir::new().unwrap();
        ensure_claude_hooks(dir.path(), false).unwrap();
        ensure_claude_hooks(dir.path(), false).unwrap();

        let path = dir.path().join(".claude").join("settings.json");
        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let stop_hooks = doc["hooks"]["Stop"].as_array().unwrap();
        assert_eq!(stop_hooks.len(), 1);
    }

    #[test]
    fn ensure_gitignore_entry_is_idempotent() {
        let dir = TempDir::new().unwrap();
        ensure_gitignore_entry(dir.path()).unwrap();
        ensure_gitignore_entry(dir.path()).unwrap();
        let text = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(text.matches(GITIGNORE_ENTRY).count(), 1);
    }

    #[test]
    fn ensure_rules_document_replaces_only_marked_block() {
        let dir = TempDir::new().unwrap();
        let rules_path = default_rules_path();
        fs::write(dir.path().join(&rules_path), "# My Project\n\nHand-written notes.\n").unwrap();

        ensure_rules_document(dir.path(), &rules_path).unwrap();
        ensure_rules_document(dir.path(), &rules_path).unwrap();

        let text = fs::read_to_string(dir.path().join(&rules_path)).unwrap();
        assert!(text.contains("Hand-written notes."));
        assert_eq!(text.matches(RULES_MARKER_START).count(), 1);
    }
}
