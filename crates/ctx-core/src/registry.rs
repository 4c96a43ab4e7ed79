//! The process-wide registry: which projects exist, whether each is
//! recording, and the adapter log-file wiring for each. This is the
//! cross-process coordination point for "is the recorder alive?" — the
//! per-project [`crate::store::ProjectStore`] never answers that
//! question itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs_err as fs;
use rusqlite::{params, Connection, OpenFlags, Row};

use crate::error::{CoreError, Result};
use crate::types::RegistryProject;

const CTX_HOME_ENV: &str = "CTX_HOME";

pub struct Registry {
    home: PathBuf,
    db_path: PathBuf,
}

impl Registry {
    /// Opens the registry at `CTX_HOME` (default `~/.context-agent`),
    /// creating it if it does not exist.
    pub fn open_default() -> Result<Self> {
        let home = default_home();
        Self::open(&home)
    }

    pub fn open(home: &Path) -> Result<Self> {
        fs::create_dir_all(home).map_err(|e| CoreError::io(home, e))?;
        let registry = Self {
            home: home.to_path_buf(),
            db_path: home.join("registry.db"),
        };
        registry.init_schema()?;
        Ok(registry)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

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

    fn init_schema(&self) -> Result<()> {
        let conn = self.open_connection()?;
        conn.execute_batch(
            "BEGIN;
             CREATE TABLE IF NOT EXISTS projects (
                path TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                recording_state TEXT NOT NULL DEFAULT 'stopped',
                active_session_id INTEGER,
                recorder_pid INTEGER,
                deleted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS adapters (
                path TEXT NOT NULL,
                adapter TEXT NOT NULL,
                log_path TEXT NOT NULL,
                PRIMARY KEY (path, adapter)
             );
             COMMIT;",
        )?;
        Ok(())
    }

    /// Inserts or updates a project row. A present `display_name` is
    /// never cleared by a later call that passes `None`.
    pub fn upsert_project(&self, path: &Path, display_name: Option<&str>) -> Result<()> {
        let conn = self.open_connection()?;
        let now = Utc::now().to_rfc3339();
        let path_str = path.to_string_lossy().to_string();
        let name = display_name
            .map(str::to_string)
            .unwrap_or_else(|| default_display_name(path));

        conn.execute(
            "INSERT INTO projects (path, display_name, recording_state, created_at, updated_at) \
             VALUES (?1, ?2, 'stopped', ?3, ?3) \
             ON CONFLICT(path) DO UPDATE SET \
                display_name = CASE WHEN ?4 = 1 THEN excluded.display_name ELSE projects.display_name END, \
                updated_at = excluded.updated_at",
            params![path_str, name, now, display_name.is_some() as i64],
        )?;
        self.sync_config_toml()?;
        Ok(())
    }

    pub fn get_project(&self, path: &Path) -> Result<Option<RegistryProject>> {
        let conn = self.open_connection()?;
        let path_str = path.to_string_lossy().to_string();
        let mut stmt = conn.prepare(
            "SELECT path, display_name, recording_state, active_session_id, recorder_pid, \
                    deleted_at, created_at, updated_at \
             FROM projects WHERE path = ?1",
        )?;
        let mut rows = stmt.query(params![path_str])?;
        if let Some(row) = rows.next()? {
            Ok(Some(project_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_projects(&self, include_deleted: bool) -> Result<Vec<RegistryProject>> {
        let conn = self.open_connection()?;
        let query = if include_deleted {
            "SELECT path, display_name, recording_state, active_session_id, recorder_pid, \
                    deleted_at, created_at, updated_at FROM projects ORDER BY path ASC"
        } else {
            "SELECT path, display_name, recording_state, active_session_id, recorder_pid, \
                    deleted_at, created_at, updated_at FROM projects WHERE deleted_at IS NULL \
             ORDER BY path ASC"
        };
        let mut stmt = conn.prepare(query)?;
        let rows = stmt.query_map([], project_from_row)?;
        rows.collect::<std::result::Result<_, _>>().map_err(Into::into)
    }

    /// Returns every non-deleted project whose display name matches
    /// `name`. Ambiguity (more than one match) is the caller's problem
    /// to resolve or report; this never guesses.
    pub fn find_by_name(&self, name: &str) -> Result<Vec<RegistryProject>> {
        let conn = self.open_connection()?;
        let mut stmt = conn.prepare(
            "SELECT path, display_name, recording_state, active_session_id, recorder_pid, \
                    deleted_at, created_at, updated_at \
             FROM projects WHERE display_name = ?1 AND deleted_at IS NULL ORDER BY path ASC",
        )?;
        let rows = stmt.query_map(params![name], project_from_row)?;
        rows.collect::<std::result::Result<_, _>>().map_err(Into::into)
    }

    pub fn set_recording_state(
        &self,
        path: &Path,
        state: &str,
        session_id: Option<i64>,
        recorder_pid: Option<u32>,
    ) -> Result<()> {
        let conn = self.open_connection()?;
        let path_str = path.to_string_lossy().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE projects SET recording_state = ?1, active_session_id = ?2, \
                recorder_pid = ?3, updated_at = ?4 WHERE path = ?5",
            params![state, session_id, recorder_pid, now, path_str],
        )?;
        Ok(())
    }

    pub fn set_deleted(&self, path: &Path, deleted: bool) -> Result<()> {
        let conn = self.open_connection()?;
        let path_str = path.to_string_lossy().to_string();
        let now = Utc::now().to_rfc3339();
        if deleted {
            conn.execute(
                "UPDATE projects SET deleted_at = ?1, recording_state = 'stopped', \
                    active_session_id = NULL, recorder_pid = NULL, updated_at = ?1 \
                 WHERE path = ?2",
                params![now, path_str],
            )?;
        } else {
            conn.execute(
                "UPDATE projects SET deleted_at = NULL, updated_at = ?1 WHERE path = ?2",
                params![now, path_str],
            )?;
        }
        Ok(())
    }

    pub fn remove_project(&self, path: &Path) -> Result<()> {
        let conn = self.open_connection()?;
        let path_str = path.to_string_lossy().to_string();
        conn.execute("DELETE FROM projects WHERE path = ?1", params![path_str])?;
        conn.execute("DELETE FROM adapters WHERE path = ?1", params![path_str])?;
        drop(conn);
        self.sync_config_toml()?;
        Ok(())
    }

    // ───── Adapter wiring ─────

    pub fn set_adapter_log_path(&self, path: &Path, adapter: &str, log_path: &str) -> Result<()> {
        let conn = self.open_connection()?;
        let path_str = path.to_string_lossy().to_string();
        conn.execute(
            "INSERT INTO adapters (path, adapter, log_path) VALUES (?1, ?2, ?3) \
             ON CONFLICT(path, adapter) DO UPDATE SET log_path = excluded.log_path",
            params![path_str, adapter, log_path],
        )?;
        drop(conn);
        self.sync_config_toml()?;
        Ok(())
    }

    pub fn adapter_map(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        let conn = self.open_connection()?;
        let path_str = path.to_string_lossy().to_string();
        let mut stmt =
            conn.prepare("SELECT adapter, log_path FROM adapters WHERE path = ?1 ORDER BY adapter")?;
        let rows = stmt.query_map(params![path_str], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut map = BTreeMap::new();
        for row in rows {
            let (adapter, log_path) = row?;
            map.insert(adapter, log_path);
        }
        Ok(map)
    }

    /// Writes a human-readable mirror of every project's adapter
    /// wiring to `config.toml`, so operators can inspect it without a
    /// SQLite client.
    fn sync_config_toml(&self) -> Result<()> {
        #[derive(serde::Serialize)]
        struct AdapterTable {
            log_path: String,
        }
        #[derive(serde::Serialize)]
        struct ProjectTable {
            adapters: BTreeMap<String, AdapterTable>,
        }
        #[derive(serde::Serialize)]
        struct ConfigToml {
            projects: BTreeMap<String, ProjectTable>,
        }

        let conn = self.open_connection()?;
        let mut stmt = conn.prepare("SELECT path, adapter, log_path FROM adapters ORDER BY path, adapter")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut projects: BTreeMap<String, ProjectTable> = BTreeMap::new();
        for row in rows {
            let (path, adapter, log_path) = row?;
            projects
                .entry(path)
                .or_insert_with(|| ProjectTable {
                    adapters: BTreeMap::new(),
                })
                .adapters
                .insert(adapter, AdapterTable { log_path });
        }

        let doc = ConfigToml { projects };
        let text = toml::to_string_pretty(&doc)?;
        let path = self.home.join("config.toml");
        fs::write(&path, text).map_err(|e| CoreError::io(&path, e))?;
        Ok(())
    }
}

fn project_from_row(row: &Row) -> rusqlite::Result<RegistryProject> {
    Ok(RegistryProject {
        path: row.get(0)?,
        display_name: row.get(1)?,
        recording_state: row.get(2)?,
        active_session_id: row.get(3)?,
        recorder_pid: row.get::<_, Option<i64>>(4)?.map(|v| v as u32),
        deleted_at: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn default_display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn default_home() -> PathBuf {
    if let Ok(value) = std::env::var(CTX_HOME_ENV) {
        if !value.is_empty() {
            return PathBuf::from(value);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".context-agent")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry() -> (TempDir, Registry) {
        let dir = TempDir::new().unwrap();
        let registry = Registry::open(dir.path()).unwrap();
        (dir, registry)
    }

    #[test]
    fn upsert_project_sets_default_display_name_from_last_path_component() {
        let (_dir, registry) = registry();
        registry
            .upsert_project(Path::new("/work/my-project"), None)
            .unwrap();
        let project = registry.get_project(Path::new("/work/my-project")).unwrap().unwrap();
        assert_eq!(project.display_name, "my-project");
        assert_eq!(project.recording_state, "stopped");
    }

    #[test]
    fn upsert_project_never_clears_an_existing_display_name() {
        let (_dir, registry) = registry();
        let path = Path::new("/work/my-project");
        registry.upsert_project(path, Some("custom-name")).unwrap();
        registry.upsert_project(path, None).unwrap();
        let project = registry.get_project(path).unwrap().unwrap();
        assert_eq!(project.display_name, "custom-name");
    }

    #[test]
    fn set_deleted_clears_recording_state() {
        let (_dir, registry) = registry();
        let path = Path::new("/work/my-project");
        registry.upsert_project(path, None).unwrap();
        registry
            .set_recording_state(path, "recording", Some(1), Some(42))
            .unwrap();
        registry.set_deleted(path, true).unwrap();
        let project = registry.get_project(path).unwrap().unwrap();
        assert_eq!(project.recording_state, "stopped");
        assert!(project.active_session_id.is_none());
        assert!(project.deleted_at.is_some());
    }

    #[test]
    fn find_by_name_returns_all_ambiguous_matches() {
        let (_dir, registry) = registry();
        registry
            .upsert_project(Path::new("/work/a/widgets"), Some("widgets"))
            .unwrap();
        registry
            .upsert_project(Path::new("/work/b/widgets"), Some("widgets"))
            .unwrap();
        let matches = registry.find_by_name("widgets").unwrap();
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn adapter_log_path_is_mirrored_to_config_toml() {
        let (dir, registry) = registry();
        let path = Path::new("/work/my-project");
        registry.upsert_project(path, None).unwrap();
        registry
            .set_adapter_log_path(path, "cursor", "/tmp/cursor.log")
            .unwrap();
        let text = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
        assert!(text.contains("cursor.log"));
    }
}
