//! The per-project event store: sessions, the append-only event log,
//! per-file hash state, compaction and the storage quota.
//!
//! One connection is opened per logical operation (never held across
//! calls) so that concurrent processes — the recorder, the RPC server,
//! the hook ingestor — can all write without coordinating anything
//! beyond SQLite's own WAL locking.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use fs_err as fs;
use rusqlite::{params, Connection, OpenFlags, Row};
use sha2::{Digest, Sha256};

use ctx_protocol::EventType;

use crate::error::{CoreError, Result};
use crate::hashing::sanitize_path;
use crate::types::{EventRow, FileState, ProjectRow, Session, SourceStatusRow, StatusSnapshot};

const DEFAULT_CAP_BYTES: u64 = 500 * 1024 * 1024;
const COMPACTION_THRESHOLD: f64 = 0.85;
const COMPACTION_BATCH: i64 = 3000;
const COMPACTION_AGE_HOURS: i64 = 24;
const DEDUPE_WINDOW_SECS: i64 = 30;
const MAX_SUMMARY_CHARS: usize = 500;
const LOCK_RETRY_ATTEMPTS: u32 = 8;
const LOCK_RETRY_INITIAL_DELAY_MS: u64 = 50;

pub struct ProjectStore {
    root: PathBuf,
    memory_dir: PathBuf,
    db_path: PathBuf,
    cap_bytes: u64,
}

impl ProjectStore {
    /// Opens (creating if absent) the store for a project at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        Self::with_cap(root, DEFAULT_CAP_BYTES)
    }

    pub fn with_cap(root: &Path, cap_bytes: u64) -> Result<Self> {
        let memory_dir = root.join(".context-memory");
        fs::create_dir_all(&memory_dir).map_err(|e| CoreError::io(&memory_dir, e))?;
        let store = Self {
            root: root.to_path_buf(),
            db_path: memory_dir.join("context.db"),
            memory_dir,
            cap_bytes,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.memory_dir.join("logs")
    }

    pub fn memory_dir(&self) -> &Path {
        &self.memory_dir
    }

    // ───── Connection Handling ─────

    fn open_connection(&self) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let conn = Connection::open_with_flags(&self.db_path, flags)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        Ok(conn)
    }

    /// Runs `op` with a fresh connection, retrying with bounded
    /// exponential backoff if SQLite reports the database is locked.
    fn with_connection<T>(&self, op: impl Fn(&mut Connection) -> Result<T>) -> Result<T> {
        let mut delay = LOCK_RETRY_INITIAL_DELAY_MS;
        for attempt in 0..LOCK_RETRY_ATTEMPTS {
            let mut conn = self.open_connection()?;
            match op(&mut conn) {
                Ok(value) => return Ok(value),
                Err(CoreError::Db(rusqlite::Error::SqliteFailure(e, _)))
                    if e.code == rusqlite::ErrorCode::DatabaseBusy
                        || e.code == rusqlite::ErrorCode::DatabaseLocked =>
                {
                    if attempt + 1 == LOCK_RETRY_ATTEMPTS {
                        return Err(CoreError::LockTimeout {
                            attempts: LOCK_RETRY_ATTEMPTS,
                        });
                    }
                    thread::sleep(Duration::from_millis(delay));
                    delay = delay.saturating_mul(2);
                }
                Err(other) => return Err(other),
            }
        }
        unreachable!("retry loop always returns")
    }

    fn init_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    agent TEXT NOT NULL,
                    external_session_ref TEXT,
                    state TEXT NOT NULL DEFAULT 'running',
                    started_at TEXT NOT NULL,
                    stopped_at TEXT
                 );
                 CREATE TABLE IF NOT EXISTS events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id INTEGER NOT NULL,
                    event_type TEXT NOT NULL,
                    summary TEXT NOT NULL,
                    files_touched TEXT NOT NULL DEFAULT '[]',
                    before_hash TEXT,
                    after_hash TEXT,
                    reverted_event_id INTEGER,
                    reverted_by_event_id INTEGER,
                    is_effective INTEGER NOT NULL DEFAULT 1,
                    source TEXT NOT NULL,
                    fingerprint TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id);
                 CREATE INDEX IF NOT EXISTS idx_events_fingerprint ON events(session_id, fingerprint);
                 CREATE TABLE IF NOT EXISTS tool_usage (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    event_id INTEGER NOT NULL,
                    tool_name TEXT NOT NULL,
                    tool_result TEXT
                 );
                 CREATE TABLE IF NOT EXISTS decisions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    event_id INTEGER NOT NULL,
                    summary TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS file_state (
                    path TEXT PRIMARY KEY,
                    current_hash TEXT NOT NULL,
                    baseline_hash TEXT NOT NULL,
                    last_event_id INTEGER,
                    is_clean INTEGER NOT NULL DEFAULT 1
                 );
                 CREATE TABLE IF NOT EXISTS file_hash_history (
                    path TEXT NOT NULL,
                    hash TEXT NOT NULL,
                    first_seen_at TEXT NOT NULL,
                    last_seen_at TEXT NOT NULL,
                    PRIMARY KEY (path, hash)
                 );
                 CREATE TABLE IF NOT EXISTS rollups (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    period_start TEXT NOT NULL,
                    period_end TEXT NOT NULL,
                    summary TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS adapter_offsets (
                    session_id INTEGER NOT NULL,
                    adapter TEXT NOT NULL,
                    log_path TEXT NOT NULL,
                    byte_offset INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (session_id, adapter, log_path)
                 );
                 CREATE TABLE IF NOT EXISTS source_status (
                    session_id INTEGER NOT NULL,
                    source TEXT NOT NULL,
                    status TEXT NOT NULL,
                    detail TEXT,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (session_id, source)
                 );
                 CREATE TABLE IF NOT EXISTS features (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS project_meta (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    storage_used_bytes INTEGER NOT NULL DEFAULT 0,
                    last_updated_at TEXT
                 );
                 INSERT OR IGNORE INTO project_meta (id, storage_used_bytes) VALUES (1, 0);
                 COMMIT;",
            )?;
            Ok(())
        })
    }

    // ───── Sessions ─────

    pub fn create_session(
        &self,
        agent: &str,
        external_session_ref: Option<&str>,
    ) -> Result<i64> {
        self.with_connection(|conn| {
            let now = utc_now();
            conn.execute(
                "INSERT INTO sessions (agent, external_session_ref, state, started_at) \
                 VALUES (?1, ?2, 'running', ?3)",
                params![agent, external_session_ref, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_active_session(&self) -> Result<Option<Session>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, agent, external_session_ref, state, started_at, stopped_at \
                 FROM sessions WHERE state = 'running' ORDER BY id DESC LIMIT 1",
            )?;
            let mut rows = stmt.query([])?;
            if let Some(row) = rows.next()? {
                Ok(Some(session_from_row(row)?))
            } else {
                Ok(None)
            }
        })
    }

    pub fn get_session(&self, session_id: i64) -> Result<Option<Session>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, agent, external_session_ref, state, started_at, stopped_at \
                 FROM sessions WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![session_id])?;
            if let Some(row) = rows.next()? {
                Ok(Some(session_from_row(row)?))
            } else {
                Ok(None)
            }
        })
    }

    pub fn set_session_state(&self, session_id: i64, state: &str) -> Result<()> {
        self.with_connection(|conn| {
            let stopped_at = if state == "stopped" {
                Some(utc_now())
            } else {
                None
            };
            conn.execute(
                "UPDATE sessions SET state = ?1, stopped_at = COALESCE(?2, stopped_at) \
                 WHERE id = ?3",
                params![state, stopped_at, session_id],
            )?;
            Ok(())
        })
    }

    pub fn set_session_external_ref(&self, session_id: i64, external_ref: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE sessions SET external_session_ref = ?1 WHERE id = ?2",
                params![external_ref, session_id],
            )?;
            Ok(())
        })
    }

    // ───── Events ─────

    #[allow(clippy::too_many_arguments)]
    pub fn insert_event(
        &self,
        session_id: i64,
        event_type: EventType,
        summary: &str,
        files_touched: &[String],
        source: &str,
        before_hash: Option<&str>,
        after_hash: Option<&str>,
        reverted_event_id: Option<i64>,
        tool_name: Option<&str>,
        tool_result: Option<&str>,
        decision_summary: Option<&str>,
    ) -> Result<i64> {
        let summary = normalize_summary(summary)?;
        let mut files = files_touched
            .iter()
            .map(|p| sanitize_path(&self.root, p))
            .collect::<Vec<_>>();
        files.sort();
        files.dedup();
        let files_json = serde_json::to_string(&files)?;

        let fingerprint = fingerprint(
            event_type,
            &summary,
            &files,
            before_hash,
            after_hash,
            reverted_event_id,
        );

        self.enforce_quota()?;

        let event_id = self.with_connection(|conn| {
            let now = utc_now();
            let cutoff = (Utc::now() - chrono::Duration::seconds(DEDUPE_WINDOW_SECS)).to_rfc3339();

            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM events \
                     WHERE session_id = ?1 AND fingerprint = ?2 AND created_at >= ?3 \
                     ORDER BY id DESC LIMIT 1",
                    params![session_id, fingerprint, cutoff],
                    |row| row.get(0),
                )
                .ok();

            if let Some(id) = existing {
                conn.execute(
                    "UPDATE events SET updated_at = ?1 WHERE id = ?2",
                    params![now, id],
                )?;
                return Ok(id);
            }

            conn.execute(
                "INSERT INTO events \
                    (session_id, event_type, summary, files_touched, before_hash, after_hash, \
                     reverted_event_id, is_effective, source, fingerprint, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9, ?10, ?10)",
                params![
                    session_id,
                    event_type.as_str(),
                    summary,
                    files_json,
                    before_hash,
                    after_hash,
                    reverted_event_id,
                    source,
                    fingerprint,
                    now,
                ],
            )?;
            let id = conn.last_insert_rowid();

            if let Some(name) = tool_name {
                conn.execute(
                    "INSERT INTO tool_usage (event_id, tool_name, tool_result) VALUES (?1, ?2, ?3)",
                    params![id, name, tool_result],
                )?;
            }
            if let Some(decision) = decision_summary {
                conn.execute(
                    "INSERT INTO decisions (event_id, summary) VALUES (?1, ?2)",
                    params![id, decision],
                )?;
            }
            conn.execute(
                "UPDATE project_meta SET last_updated_at = ?1 WHERE id = 1",
                params![now],
            )?;

            Ok(id)
        })?;

        self.append_sidecar_log(event_id, session_id, event_type, &summary, &files, source)?;
        self.update_storage_used()?;
        Ok(event_id)
    }

    /// Runs the file-state transition machine for one path observation
    /// and returns the new event id, or `None` if the hash is unchanged.
    pub fn record_file_transition(
        &self,
        session_id: i64,
        source: &str,
        path: &str,
        new_hash: &str,
    ) -> Result<Option<i64>> {
        let path = sanitize_path(&self.root, path);
        let current = self.get_file_state(&path)?;

        let (baseline, previous_event_id) = match &current {
            Some(state) => {
                if state.current_hash == new_hash {
                    return Ok(None);
                }
                (state.baseline_hash.clone(), state.last_event_id)
            }
            // First observation this session: the first hash seen becomes the baseline.
            None => (new_hash.to_string(), None),
        };

        let seen_before = self.hash_seen_before(&path, new_hash)?;
        let is_revert = current.is_some() && seen_before;

        let summary = if is_revert && new_hash == baseline {
            format!("{} returned to baseline.", path)
        } else if is_revert {
            format!("{} returned to a previous state.", path)
        } else {
            format!("File changed: {}", path)
        };

        let event_type = if is_revert {
            EventType::Revert
        } else {
            EventType::CodeChange
        };

        let event_id = self.insert_event(
            session_id,
            event_type,
            &summary,
            std::slice::from_ref(&path),
            source,
            current.as_ref().map(|s| s.current_hash.as_str()),
            Some(new_hash),
            if is_revert { previous_event_id } else { None },
            None,
            None,
            None,
        )?;

        self.with_connection(|conn| {
            if let Some(prev_id) = previous_event_id {
                conn.execute(
                    "UPDATE events SET is_effective = 0 WHERE id = ?1",
                    params![prev_id],
                )?;
                if is_revert {
                    conn.execute(
                        "UPDATE events SET reverted_by_event_id = ?1 WHERE id = ?2",
                        params![event_id, prev_id],
                    )?;
                }
            }

            let now = utc_now();
            let is_clean = new_hash == baseline;
            conn.execute(
                "INSERT INTO file_state (path, current_hash, baseline_hash, last_event_id, is_clean) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(path) DO UPDATE SET \
                    current_hash = excluded.current_hash, \
                    last_event_id = excluded.last_event_id, \
                    is_clean = excluded.is_clean",
                params![path, new_hash, baseline, event_id, is_clean as i64],
            )?;

            conn.execute(
                "INSERT INTO file_hash_history (path, hash, first_seen_at, last_seen_at) \
                 VALUES (?1, ?2, ?3, ?3) \
                 ON CONFLICT(path, hash) DO UPDATE SET last_seen_at = excluded.last_seen_at",
                params![path, new_hash, now],
            )?;
            Ok(())
        })?;

        Ok(Some(event_id))
    }

    /// Seeds `file_state`/`file_hash_history` for a path observed for
    /// the first time, without emitting an event. Used for the initial
    /// filesystem baseline, where every file's starting hash is state,
    /// not activity. Leaves any existing row untouched.
    pub fn seed_file_state(&self, path: &str, hash: &str) -> Result<()> {
        let path = sanitize_path(&self.root, path);
        self.with_connection(|conn| {
            let now = utc_now();
            conn.execute(
                "INSERT OR IGNORE INTO file_state \
                    (path, current_hash, baseline_hash, last_event_id, is_clean) \
                 VALUES (?1, ?2, ?2, NULL, 1)",
                params![path, hash],
            )?;
            conn.execute(
                "INSERT INTO file_hash_history (path, hash, first_seen_at, last_seen_at) \
                 VALUES (?1, ?2, ?3, ?3) \
                 ON CONFLICT(path, hash) DO UPDATE SET last_seen_at = excluded.last_seen_at",
                params![path, hash, now],
            )?;
            Ok(())
        })
    }

    fn get_file_state(&self, path: &str) -> Result<Option<FileState>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT path, current_hash, baseline_hash, last_event_id, is_clean \
                 FROM file_state WHERE path = ?1",
            )?;
            let mut rows = stmt.query(params![path])?;
            if let Some(row) = rows.next()? {
                Ok(Some(FileState {
                    path: row.get(0)?,
                    current_hash: row.get(1)?,
                    baseline_hash: row.get(2)?,
                    last_event_id: row.get(3)?,
                    is_clean: row.get::<_, i64>(4)? != 0,
                }))
            } else {
                Ok(None)
            }
        })
    }

    fn hash_seen_before(&self, path: &str, hash: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM file_hash_history WHERE path = ?1 AND hash = ?2",
                params![path, hash],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    // ───── Source heartbeats ─────

    pub fn update_source_status(
        &self,
        session_id: i64,
        source: &str,
        status: &str,
        detail: &str,
    ) -> Result<()> {
        self.with_connection(|conn| {
            let now = utc_now();
            conn.execute(
                "INSERT INTO source_status (session_id, source, status, detail, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(session_id, source) DO UPDATE SET \
                    status = excluded.status, detail = excluded.detail, updated_at = excluded.updated_at",
                params![session_id, source, status, detail, now],
            )?;
            Ok(())
        })
    }

    // ───── Adapter offsets ─────

    pub fn get_adapter_offset(&self, session_id: i64, adapter: &str, log_path: &str) -> Result<u64> {
        self.with_connection(|conn| {
            let offset: Option<i64> = conn
                .query_row(
                    "SELECT byte_offset FROM adapter_offsets \
                     WHERE session_id = ?1 AND adapter = ?2 AND log_path = ?3",
                    params![session_id, adapter, log_path],
                    |row| row.get(0),
                )
                .ok();
            Ok(offset.unwrap_or(0) as u64)
        })
    }

    pub fn set_adapter_offset(
        &self,
        session_id: i64,
        adapter: &str,
        log_path: &str,
        offset: u64,
    ) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO adapter_offsets (session_id, adapter, log_path, byte_offset) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(session_id, adapter, log_path) DO UPDATE SET byte_offset = excluded.byte_offset",
                params![session_id, adapter, log_path, offset as i64],
            )?;
            Ok(())
        })
    }

    // ───── Quota & Compaction ─────

    pub fn measure_usage(&self) -> Result<u64> {
        measure_dir_size(&self.memory_dir)
    }

    fn update_storage_used(&self) -> Result<()> {
        let used = self.measure_usage()?;
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE project_meta SET storage_used_bytes = ?1 WHERE id = 1",
                params![used as i64],
            )?;
            Ok(())
        })
    }

    fn enforce_quota(&self) -> Result<()> {
        let used = self.measure_usage()?;
        if (used as f64) >= COMPACTION_THRESHOLD * (self.cap_bytes as f64) {
            self.compact()?;
        }
        let used_after = self.measure_usage()?;
        if used_after >= self.cap_bytes {
            return Err(CoreError::StorageCapExceeded {
                path: self.root.clone(),
                used: used_after,
                cap: self.cap_bytes,
            });
        }
        Ok(())
    }

    fn compact(&self) -> Result<()> {
        self.with_connection(|conn| {
            let cutoff = (Utc::now() - chrono::Duration::hours(COMPACTION_AGE_HOURS)).to_rfc3339();
            let high_value: Vec<&str> = vec!["decision_made", "handoff", "error_seen", "tool_use", "revert"];
            let placeholders = high_value.iter().map(|_| "?").collect::<Vec<_>>().join(",");

            let query = format!(
                "SELECT id, created_at FROM events \
                 WHERE created_at < ? AND event_type NOT IN ({}) \
                 ORDER BY id ASC LIMIT {}",
                placeholders, COMPACTION_BATCH
            );

            let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&cutoff];
            for v in &high_value {
                params_vec.push(v);
            }

            let mut stmt = conn.prepare(&query)?;
            let rows: Vec<(i64, String)> = stmt
                .query_map(params_vec.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<_, _>>()?;

            if rows.is_empty() {
                return Ok(());
            }

            let first_created = rows.first().map(|r| r.1.clone()).unwrap_or_default();
            let last_created = rows.last().map(|r| r.1.clone()).unwrap_or_default();
            let ids: Vec<i64> = rows.iter().map(|r| r.0).collect();

            let tx = conn.transaction()?;
            {
                let id_list = ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                tx.execute(
                    &format!("DELETE FROM tool_usage WHERE event_id IN ({})", id_list),
                    [],
                )?;
                tx.execute(
                    &format!("DELETE FROM decisions WHERE event_id IN ({})", id_list),
                    [],
                )?;
                tx.execute(
                    &format!("DELETE FROM events WHERE id IN ({})", id_list),
                    [],
                )?;
                tx.execute(
                    "INSERT INTO rollups (period_start, period_end, summary) VALUES (?1, ?2, ?3)",
                    params![
                        first_created,
                        last_created,
                        format!("Compacted {} low-value events.", ids.len())
                    ],
                )?;
            }
            tx.commit()?;
            conn.execute("VACUUM", [])?;
            Ok(())
        })
    }

    // ───── Append-only sidecar log ─────

    fn append_sidecar_log(
        &self,
        event_id: i64,
        session_id: i64,
        event_type: EventType,
        summary: &str,
        files: &[String],
        source: &str,
    ) -> Result<()> {
        let logs_dir = self.memory_dir.join("logs");
        fs::create_dir_all(&logs_dir).map_err(|e| CoreError::io(&logs_dir, e))?;
        let file_name = format!("events-{}.jsonl", Utc::now().format("%Y-%m-%d"));
        let path = logs_dir.join(file_name);

        let line = serde_json::json!({
            "event_id": event_id,
            "session_id": session_id,
            "event_type": event_type.as_str(),
            "summary": summary,
            "files_touched": files,
            "source": source,
            "created_at": utc_now(),
        });

        use std::io::Write;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CoreError::io(&path, e))?;
        writeln!(file, "{}", serde_json::to_string(&line)?).map_err(|e| CoreError::io(&path, e))?;
        Ok(())
    }

    // ───── Status snapshot ─────

    pub fn status_snapshot(&self, recent_limit: i64) -> Result<StatusSnapshot> {
        let session = self.get_active_session()?;
        let session = match session {
            Some(s) => Some(s),
            None => self.most_recent_session()?,
        };

        let (sources, events, last_revert, dirty_file_count) = if let Some(ref s) = session {
            (
                self.sources_for_session(s.id)?,
                self.recent_events(s.id, recent_limit)?,
                self.last_revert_event(s.id)?,
                self.dirty_file_count()?,
            )
        } else {
            (Vec::new(), Vec::new(), None, self.dirty_file_count()?)
        };

        let storage_used_bytes = self.measure_usage()?;
        let project = self.with_connection(|conn| {
            let last_updated_at: Option<String> = conn
                .query_row(
                    "SELECT last_updated_at FROM project_meta WHERE id = 1",
                    [],
                    |row| row.get(0),
                )
                .ok()
                .flatten();
            Ok(Some(ProjectRow {
                path: self.root.to_string_lossy().to_string(),
                last_updated_at,
                storage_used_bytes,
                storage_cap_bytes: self.cap_bytes,
            }))
        })?;

        let effective_changed_files = self.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM file_state WHERE is_clean = 0",
                [],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })?;

        Ok(StatusSnapshot {
            project,
            session,
            sources,
            events,
            last_revert,
            dirty_file_count,
            storage_used_bytes,
            effective_changed_files,
        })
    }

    fn most_recent_session(&self) -> Result<Option<Session>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, agent, external_session_ref, state, started_at, stopped_at \
                 FROM sessions ORDER BY id DESC LIMIT 1",
            )?;
            let mut rows = stmt.query([])?;
            if let Some(row) = rows.next()? {
                Ok(Some(session_from_row(row)?))
            } else {
                Ok(None)
            }
        })
    }

    fn sources_for_session(&self, session_id: i64) -> Result<Vec<SourceStatusRow>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT source, status, detail, updated_at FROM source_status \
                 WHERE session_id = ?1 ORDER BY source ASC",
            )?;
            let rows = stmt.query_map(params![session_id], |row| {
                Ok(SourceStatusRow {
                    source: row.get(0)?,
                    status: row.get(1)?,
                    detail: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })?;
            rows.collect::<std::result::Result<_, _>>().map_err(Into::into)
        })
    }

    fn recent_events(&self, session_id: i64, limit: i64) -> Result<Vec<EventRow>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, event_type, summary, files_touched, before_hash, \
                        after_hash, reverted_event_id, is_effective, source, created_at, updated_at \
                 FROM events WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![session_id, limit], event_from_row)?;
            rows.collect::<std::result::Result<_, _>>().map_err(Into::into)
        })
    }

    fn last_revert_event(&self, session_id: i64) -> Result<Option<EventRow>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, event_type, summary, files_touched, before_hash, \
                        after_hash, reverted_event_id, is_effective, source, created_at, updated_at \
                 FROM events WHERE session_id = ?1 AND event_type = 'revert' \
                 ORDER BY id DESC LIMIT 1",
            )?;
            let mut rows = stmt.query(params![session_id])?;
            if let Some(row) = rows.next()? {
                Ok(Some(event_from_row(row)?))
            } else {
                Ok(None)
            }
        })
    }

    fn dirty_file_count(&self) -> Result<u64> {
        self.with_connection(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM file_state WHERE is_clean = 0", [], |row| {
                    row.get(0)
                })?;
            Ok(count as u64)
        })
    }

    // ───── Features ─────

    pub fn set_feature(&self, key: &str, value: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO features (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
    }

    pub fn get_feature(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM features WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .ok())
        })
    }
}

fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        agent: row.get(1)?,
        external_session_ref: row.get(2)?,
        state: row.get(3)?,
        started_at: row.get(4)?,
        stopped_at: row.get(5)?,
    })
}

fn event_from_row(row: &Row) -> rusqlite::Result<EventRow> {
    let files_json: String = row.get(4)?;
    let files_touched: Vec<String> = serde_json::from_str(&files_json).unwrap_or_default();
    Ok(EventRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        event_type: row.get(2)?,
        summary: row.get(3)?,
        files_touched,
        before_hash: row.get(5)?,
        after_hash: row.get(6)?,
        reverted_event_id: row.get(7)?,
        is_effective: row.get::<_, i64>(8)? != 0,
        source: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn normalize_summary(raw: &str) -> Result<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        return Err(CoreError::EmptySummary);
    }
    Ok(trimmed.chars().take(MAX_SUMMARY_CHARS).collect())
}

fn fingerprint(
    event_type: EventType,
    summary: &str,
    files: &[String],
    before_hash: Option<&str>,
    after_hash: Option<&str>,
    reverted_event_id: Option<i64>,
) -> String {
    let mut hasher = Sha256::new();
    let parts = [
        event_type.as_str().to_string(),
        summary.to_lowercase(),
        files.join(","),
        before_hash.unwrap_or_default().to_string(),
        after_hash.unwrap_or_default().to_string(),
        reverted_event_id.map(|id| id.to_string()).unwrap_or_default(),
        // is_effective is always 1 at insert time; later compaction/revert
        // flips the stored row's flag without rewriting its fingerprint.
        "1".to_string(),
    ];
    hasher.update(parts.join("|").as_bytes());
    format!("{:x}", hasher.finalize())
}

fn utc_now() -> String {
    Utc::now().to_rfc3339()
}

fn measure_dir_size(dir: &Path) -> Result<u64> {
    let mut total = 0u64;
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            if let Ok(meta) = entry.metadata() {
                total += meta.len();
            }
        }
    }
    Ok(total)
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
    fn create_session_marks_it_active() {
        let (_dir, store) = store();
        let id = store.create_session("claude", None).unwrap();
        let active = store.get_active_session().unwrap().unwrap();
        assert_eq!(active.id, id);
        assert_eq!(active.state, "running");
    }

    #[test]
    fn insert_event_requires_nonempty_summary() {
        let (_dir, store) = store();
        let session_id = store.create_session("claude", None).unwrap();
        let result = store.insert_event(
            session_id,
            EventType::TaskStatus,
            "   ",
            &[],
            "test",
            None,
            None,
            None,
            None,
            None,
            None,
        );
        assert!(matches!(result, Err(CoreError::EmptySummary)));
    }

    #[test]
    fn duplicate_event_within_window_does_not_insert_new_row() {
        let (_dir, store) = store();
        let session_id = store.create_session("claude", None).unwrap();
        let first = store
            .insert_event(
                session_id,
                EventType::TaskStatus,
                "doing a thing",
                &[],
                "test",
                None,
                None,
                None,
                None,
                None,
                None,
            )
            .unwrap();
        let second = store
            .insert_event(
                session_id,
                EventType::TaskStatus,
                "doing a thing",
                &[],
                "test",
                None,
                None,
                None,
                None,
                None,
                None,
            )
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn file_transition_first_observation_is_code_change() {
        let (_dir, store) = store();
        let session_id = store.create_session("claude", None).unwrap();
        let event_id = store
            .record_file_transition(session_id, "filesystem", "src/lib.rs", "hash-a")
            .unwrap();
        assert!(event_id.is_some());
        let events = store.recent_events(session_id, 10).unwrap();
        assert_eq!(events[0].event_type, "code_change");
    }

    #[test]
    fn file_transition_back_to_baseline_is_revert() {
        let (_dir, store) = store();
        let session_id = store.create_session("claude", None).unwrap();
        store
            .record_file_transition(session_id, "filesystem", "src/lib.rs", "hash-a")
            .unwrap();
        store
            .record_file_transition(session_id, "filesystem", "src/lib.rs", "hash-b")
            .unwrap();
        store
            .record_file_transition(session_id, "filesystem", "src/lib.rs", "hash-a")
            .unwrap();

        let events = store.recent_events(session_id, 10).unwrap();
        assert_eq!(events[0].event_type, "revert");
        assert!(events[0].summary.contains("baseline"));
    }

    #[test]
    fn file_transition_same_hash_is_noop() {
        let (_dir, store) = store();
        let session_id = store.create_session("claude", None).unwrap();
        store
            .record_file_transition(session_id, "filesystem", "src/lib.rs", "hash-a")
            .unwrap();
        let result = store
            .record_file_transition(session_id, "filesystem", "src/lib.rs", "hash-a")
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn seed_file_state_does_not_emit_an_event() {
        let (_dir, store) = store();
        let session_id = store.create_session("claude", None).unwrap();
        store.seed_file_state("src/lib.rs", "hash-a").unwrap();
        let events = store.recent_events(session_id, 10).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn seed_file_state_then_real_change_is_code_change_not_revert() {
        let (_dir, store) = store();
        let session_id = store.create_session("claude", None).unwrap();
        store.seed_file_state("src/lib.rs", "hash-a").unwrap();
        let event_id = store
            .record_file_transition(session_id, "filesystem", "src/lib.rs", "hash-b")
            .unwrap();
        assert!(event_id.is_some());
        let events = store.recent_events(session_id, 10).unwrap();
        assert_eq!(events[0].event_type, "code_change");
    }

    #[test]
    fn fingerprint_matches_the_documented_pipe_joined_formula() {
        let computed = fingerprint(EventType::CodeChange, "Did a Thing", &["a.rs".to_string()], Some("h1"), Some("h2"), None);
        let mut hasher = Sha256::new();
        hasher.update(b"code_change|did a thing|a.rs|h1|h2||1");
        let expected = format!("{:x}", hasher.finalize());
        assert_eq!(computed, expected);
    }

    #[test]
    fn status_snapshot_reports_dirty_file_count() {
        let (_dir, store) = store();
        let session_id = store.create_session("claude", None).unwrap();
        store
            .record_file_transition(session_id, "filesystem", "src/lib.rs", "hash-a")
            .unwrap();
        store
            .record_file_transition(session_id, "filesystem", "src/lib.rs", "hash-b")
            .unwrap();
        let snapshot = store.status_snapshot(10).unwrap();
        assert_eq!(snapshot.dirty_file_count, 1);
    }
}
