//! The recorder poll loop: adapter log tailing, version-control
//! polling and filesystem scanning, each translated into store events.

use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use ctx_protocol::{EventType, DELETED_SENTINEL};
use fs_err as fs;
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::hashing::{diff_scans, scan_tree};
use crate::store::ProjectStore;

const MAX_GIT_FILES_IN_SUMMARY: usize = 5;

pub struct RecorderConfig {
    pub session_id: i64,
    pub project_root: PathBuf,
    pub adapters: BTreeMap<String, PathBuf>,
    pub poll_interval: Duration,
}

#[derive(Default)]
pub struct GitSnapshot {
    head: String,
    porcelain: String,
}

/// Runs one full poll iteration: adapters, then git, then filesystem.
/// `fs_baseline` is the previous filesystem scan (empty on the first
/// call) and is updated in place.
pub fn poll_once(
    store: &ProjectStore,
    config: &RecorderConfig,
    git_baseline: &mut Option<GitSnapshot>,
    fs_baseline: &mut Option<BTreeMap<String, String>>,
) {
    for (adapter, log_path) in &config.adapters {
        if let Err(err) = poll_adapter(store, config.session_id, adapter, log_path) {
            warn!(adapter = %adapter, error = %err, "adapter poll failed");
        }
    }

    if let Err(err) = poll_git(store, config, git_baseline) {
        warn!(error = %err, "git poll failed");
        let _ = store.update_source_status(config.session_id, "git", "degraded", &err.to_string());
    }

    if let Err(err) = poll_filesystem(store, config, fs_baseline) {
        warn!(error = %err, "filesystem poll failed");
        let _ =
            store.update_source_status(config.session_id, "filesystem", "degraded", &err.to_string());
    }
}

// ───── Adapter log tailing ─────

fn poll_adapter(store: &ProjectStore, session_id: i64, adapter: &str, log_path: &Path) -> Result<()> {
    if !log_path.exists() {
        return Ok(());
    }
    let source = format!("adapter:{adapter}");
    let offset = store.get_adapter_offset(session_id, adapter, &log_path.to_string_lossy())?;

    let mut file = fs::File::open(log_path).map_err(|e| CoreError::io(log_path, e))?;
    let len = file
        .metadata()
        .map_err(|e| CoreError::io(log_path, e))?
        .len();
    if len <= offset {
        return Ok(());
    }

    file.seek(SeekFrom::Start(offset))
        .map_err(|e| CoreError::io(log_path, e))?;
    let mut chunk = String::new();
    file.read_to_string(&mut chunk)
        .map_err(|e| CoreError::io(log_path, e))?;

    let mut advanced = offset;
    for line in chunk.lines() {
        let consumed = line.len() as u64 + 1;
        if line.trim().is_empty() {
            advanced += consumed;
            continue;
        }
        match insert_adapter_line(store, session_id, &source, line) {
            Ok(()) => advanced += consumed,
            Err(CoreError::StorageCapExceeded { .. }) => {
                store.update_source_status(
                    session_id,
                    &source,
                    "degraded",
                    "storage cap reached; event dropped",
                )?;
                break;
            }
            Err(other) => return Err(other),
        }
    }

    store.set_adapter_offset(session_id, adapter, &log_path.to_string_lossy(), advanced)?;
    store.update_source_status(session_id, &source, "available", "tailing log")?;
    Ok(())
}

fn insert_adapter_line(store: &ProjectStore, session_id: i64, source: &str, line: &str) -> Result<()> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
        if let Some(obj) = value.as_object() {
            let summary = ["summary", "message", "content", "text"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(|v| v.as_str()))
                .map(str::to_string);
            if let Some(summary) = summary {
                let tool_name = obj.get("tool_name").and_then(|v| v.as_str());
                let tool_result = obj.get("result").and_then(|v| v.as_str());
                let decision = obj.get("decision").and_then(|v| v.as_bool()).unwrap_or(false);
                let event_type = obj
                    .get("event_type")
                    .and_then(|v| v.as_str())
                    .map(EventType::parse)
                    .unwrap_or_else(|| {
                        if tool_name.is_some() {
                            EventType::ToolUse
                        } else if decision {
                            EventType::DecisionMade
                        } else {
                            EventType::TaskStatus
                        }
                    });
                let is_decision = decision || event_type == EventType::DecisionMade;
                let files: Vec<String> = obj
                    .get("files_touched")
                    .and_then(|v| v.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();

                store.insert_event(
                    session_id,
                    event_type,
                    &summary,
                    &files,
                    source,
                    None,
                    None,
                    None,
                    tool_name,
                    tool_result,
                    if is_decision { Some(summary.as_str()) } else { None },
                )?;
                return Ok(());
            }
        }
    }

    let (event_type, summary) = classify_plain_text(line);
    store.insert_event(
        session_id, event_type, &summary, &[], source, None, None, None, None, None, None,
    )?;
    Ok(())
}

fn classify_plain_text(line: &str) -> (EventType, String) {
    const AGENT_PREFIXES: &[&str] = &["assistant:", "claude:", "cursor:", "codex:", "agent:"];

    if let Some(rest) = strip_prefix_ignore_ascii_case(line, "user:") {
        return (EventType::UserIntent, rest.trim().to_string());
    }
    for prefix in AGENT_PREFIXES {
        if let Some(rest) = strip_prefix_ignore_ascii_case(line, prefix) {
            return (EventType::AgentPlan, rest.trim().to_string());
        }
    }
    (EventType::TaskStatus, line.trim().to_string())
}

fn strip_prefix_ignore_ascii_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes()) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

// ───── Version control polling ─────

fn poll_git(
    store: &ProjectStore,
    config: &RecorderConfig,
    baseline: &mut Option<GitSnapshot>,
) -> Result<()> {
    let Some(snapshot) = read_git_snapshot(&config.project_root) else {
        return Ok(());
    };

    let previous = baseline.take();
    *baseline = Some(GitSnapshot {
        head: snapshot.head.clone(),
        porcelain: snapshot.porcelain.clone(),
    });

    let Some(previous) = previous else {
        store.update_source_status(config.session_id, "git", "available", "baseline captured")?;
        return Ok(());
    };

    if previous.head == snapshot.head && previous.porcelain == snapshot.porcelain {
        store.update_source_status(config.session_id, "git", "available", "no change")?;
        return Ok(());
    }

    if !snapshot.porcelain.trim().is_empty() {
        let files: Vec<&str> = snapshot
            .porcelain
            .lines()
            .map(|l| l.trim())
            .take(MAX_GIT_FILES_IN_SUMMARY)
            .collect();
        let total = snapshot.porcelain.lines().count();
        let mut summary = format!("Working tree changed: {}", files.join(", "));
        if total > MAX_GIT_FILES_IN_SUMMARY {
            summary.push_str(", ...");
        }
        store.insert_event(
            config.session_id,
            EventType::CodeChange,
            &summary,
            &[],
            "git",
            None,
            None,
            None,
            None,
            None,
            None,
        )?;
    } else if !previous.porcelain.trim().is_empty() {
        store.insert_event(
            config.session_id,
            EventType::Revert,
            "Git working tree reverted to clean state.",
            &[],
            "git",
            None,
            None,
            None,
            None,
            None,
            None,
        )?;
    }

    store.update_source_status(config.session_id, "git", "available", "observed change")?;
    Ok(())
}

fn read_git_snapshot(root: &Path) -> Option<GitSnapshot> {
    let head = run_git(root, &["rev-parse", "HEAD"])?;
    let porcelain = run_git(root, &["status", "--porcelain"])?;
    Some(GitSnapshot { head, porcelain })
}

fn run_git(root: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git").arg("-C").arg(root).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

// ───── Filesystem polling ─────

fn poll_filesystem(
    store: &ProjectStore,
    config: &RecorderConfig,
    baseline: &mut Option<BTreeMap<String, String>>,
) -> Result<()> {
    let current = scan_tree(&config.project_root)?;

    let Some(previous) = baseline.take() else {
        for (path, hash) in &current {
            store.seed_file_state(path, hash)?;
        }
        *baseline = Some(current);
        store.update_source_status(config.session_id, "filesystem", "available", "baseline captured")?;
        return Ok(());
    };

    let delta = diff_scans(&previous, &current);
    for (path, hash) in delta.added.iter().chain(delta.modified.iter()) {
        store.record_file_transition(config.session_id, "filesystem", path, hash)?;
    }
    for path in &delta.removed {
        store.record_file_transition(config.session_id, "filesystem", path, DELETED_SENTINEL)?;
    }

    *baseline = Some(current);
    store.update_source_status(config.session_id, "filesystem", "available", "scan complete")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_plain_text_user_prefix() {
        let (event_type, summary) = classify_plain_text("user: please add tests");
        assert_eq!(event_type, EventType::UserIntent);
        assert_eq!(summary, "please add tests");
    }

    #[test]
    fn classify_plain_text_agent_prefix() {
        let (event_type, summary) = classify_plain_text("claude: planning the refactor");
        assert_eq!(event_type, EventType::AgentPlan);
        assert_eq!(summary, "planning the refactor");
    }

    #[test]
    fn classify_plain_text_default_is_task_status() {
        let (event_type, _) = classify_plain_text("ran the build");
        assert_eq!(event_type, EventType::TaskStatus);
    }

    #[test]
    fn insert_adapter_line_honors_explicit_event_type_over_tool_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ProjectStore::open(dir.path()).unwrap();
        let session_id = store.create_session("claude", None).unwrap();
        let line = r#"{"event_type":"decision_made","summary":"use pytest","tool_name":"pytest","result":"ok"}"#;
        insert_adapter_line(&store, session_id, "adapter:claude", line).unwrap();

        let events = store.recent_events(session_id, 10).unwrap();
        assert_eq!(events[0].event_type, "decision_made");
    }

    #[test]
    fn insert_adapter_line_falls_back_to_tool_name_heuristic_without_event_type() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ProjectStore::open(dir.path()).unwrap();
        let session_id = store.create_session("claude", None).unwrap();
        let line = r#"{"summary":"ran pytest","tool_name":"pytest"}"#;
        insert_adapter_line(&store, session_id, "adapter:claude", line).unwrap();

        let events = store.recent_events(session_id, 10).unwrap();
        assert_eq!(events[0].event_type, "tool_use");
    }

    #[test]
    fn poll_filesystem_first_poll_seeds_without_emitting_events() {
        let dir = tempfile::TempDir::new().unwrap();
        let project_root = dir.path().join("project");
        std::fs::create_dir_all(&project_root).unwrap();
        std::fs::write(project_root.join("a.txt"), b"hello").unwrap();

        let store_dir = tempfile::TempDir::new().unwrap();
        let store = ProjectStore::open(store_dir.path()).unwrap();
        let session_id = store.create_session("claude", None).unwrap();

        let config = RecorderConfig {
            session_id,
            project_root: project_root.clone(),
            adapters: BTreeMap::new(),
            poll_interval: Duration::from_secs(1),
        };
        let mut baseline = None;
        poll_filesystem(&store, &config, &mut baseline).unwrap();

        assert!(baseline.is_some());
        let events = store.recent_events(session_id, 10).unwrap();
        assert!(events.is_empty());
    }
}
