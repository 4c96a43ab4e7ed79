//! Shared row types returned by the store and registry.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub agent: String,
    pub external_session_ref: Option<String>,
    pub state: String,
    pub started_at: String,
    pub stopped_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub id: i64,
    pub session_id: i64,
    pub event_type: String,
    pub summary: String,
    pub files_touched: Vec<String>,
    pub before_hash: Option<String>,
    pub after_hash: Option<String>,
    pub reverted_event_id: Option<i64>,
    pub is_effective: bool,
    pub source: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileState {
    pub path: String,
    pub current_hash: String,
    pub baseline_hash: String,
    pub last_event_id: Option<i64>,
    pub is_clean: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStatusRow {
    pub source: String,
    pub status: String,
    pub detail: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRow {
    pub path: String,
    pub last_updated_at: Option<String>,
    pub storage_used_bytes: u64,
    pub storage_cap_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub project: Option<ProjectRow>,
    pub session: Option<Session>,
    pub sources: Vec<SourceStatusRow>,
    pub events: Vec<EventRow>,
    pub last_revert: Option<EventRow>,
    pub dirty_file_count: u64,
    pub storage_used_bytes: u64,
    pub effective_changed_files: u64,
}

/// Registry-side project record: recording state and adapter wiring,
/// separate from the per-project event store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryProject {
    pub path: String,
    pub display_name: String,
    pub recording_state: String,
    pub active_session_id: Option<i64>,
    pub recorder_pid: Option<u32>,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
