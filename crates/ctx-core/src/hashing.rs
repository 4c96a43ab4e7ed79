//! Content hashing and working-tree scanning for the recorder and the
//! file-state transition machine.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{CoreError, Result};

const CHUNK_SIZE: usize = 64 * 1024;

/// Directory names never descended into while scanning a working tree.
const DENY_LIST: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".context-memory",
    "node_modules",
    "target",
    ".venv",
    "venv",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    ".idea",
    ".vscode",
    ".DS_Store",
];

/// Hashes a single file's contents as SHA-256, reading in 64 KiB chunks.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| CoreError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buf).map_err(|e| CoreError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn is_denied(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| DENY_LIST.contains(&name))
        .unwrap_or(false)
}

/// Recursively hashes every regular file under `root`, returning a map
/// of repo-relative POSIX paths to their SHA-256 hash. Directories (and
/// their contents) named in the deny list are skipped entirely.
pub fn scan_tree(root: &Path) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_denied(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let abs_path = entry.path();
        let rel = abs_path
            .strip_prefix(root)
            .unwrap_or(abs_path)
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");
        let hash = hash_file(abs_path)?;
        out.insert(rel, hash);
    }
    Ok(out)
}

/// The three-way delta between two consecutive filesystem scans.
pub struct ScanDelta {
    pub added: Vec<(String, String)>,
    pub removed: Vec<String>,
    pub modified: Vec<(String, String)>,
}

pub fn diff_scans(
    previous: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
) -> ScanDelta {
    let mut added = Vec::new();
    let mut modified = Vec::new();
    for (path, hash) in current {
        match previous.get(path) {
            None => added.push((path.clone(), hash.clone())),
            Some(prev_hash) if prev_hash != hash => modified.push((path.clone(), hash.clone())),
            _ => {}
        }
    }
    let removed: Vec<String> = previous
        .keys()
        .filter(|path| !current.contains_key(*path))
        .cloned()
        .collect();
    ScanDelta {
        added,
        removed,
        modified,
    }
}

/// Normalizes a touched-file path relative to the project root, per the
/// sanitization rule: absolute paths are kept as POSIX absolute, paths
/// that resolve inside the root become a relative POSIX path, anything
/// else is stored as the raw POSIX-separated path.
pub fn sanitize_path(root: &Path, raw: &str) -> String {
    let candidate = PathBuf::from(raw);
    let posix = |p: &Path| p.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");

    if candidate.is_absolute() {
        return match candidate.strip_prefix(root) {
            Ok(rel) => posix(rel),
            Err(_) => posix(&candidate),
        };
    }

    // Relative input: lexically normalize against the root and check it
    // did not escape via `..` components before deciding how to store it.
    let mut normalized = root.to_path_buf();
    for component in candidate.components() {
        match component {
            std::path::Component::ParentDir => {
                normalized.pop();
            }
            std::path::Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }

    if normalized.starts_with(root) {
        match normalized.strip_prefix(root) {
            Ok(rel) => posix(rel),
            Err(_) => posix(&candidate),
        }
    } else {
        posix(&candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn hash_file_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"hello world").unwrap();
        let first = hash_file(&path).unwrap();
        let second = hash_file(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn scan_tree_skips_deny_listed_dirs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/x.js"), b"ignored").unwrap();
        fs::write(dir.path().join("main.rs"), b"fn main() {}").unwrap();

        let result = scan_tree(dir.path()).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("main.rs"));
    }

    #[test]
    fn diff_scans_classifies_added_removed_modified() {
        let mut previous = BTreeMap::new();
        previous.insert("a.rs".to_string(), "h1".to_string());
        previous.insert("b.rs".to_string(), "h2".to_string());

        let mut current = BTreeMap::new();
        current.insert("a.rs".to_string(), "h1".to_string());
        current.insert("b.rs".to_string(), "h2-changed".to_string());
        current.insert("c.rs".to_string(), "h3".to_string());

        let delta = diff_scans(&previous, &current);
        assert_eq!(delta.added, vec![("c.rs".to_string(), "h3".to_string())]);
        assert_eq!(
            delta.modified,
            vec![("b.rs".to_string(), "h2-changed".to_string())]
        );
        assert!(delta.removed.is_empty());
    }

    #[test]
    fn diff_scans_detects_removed_file() {
        let mut previous = BTreeMap::new();
        previous.insert("a.rs".to_string(), "h1".to_string());
        let current = BTreeMap::new();

        let delta = diff_scans(&previous, &current);
        assert_eq!(delta.removed, vec!["a.rs".to_string()]);
        assert!(delta.added.is_empty());
        assert!(delta.modified.is_empty());
    }

    #[test]
    fn sanitize_path_keeps_relative_path_inside_root_as_posix_relative() {
        let root = Path::new("/work/project");
        assert_eq!(sanitize_path(root, "src/lib.rs"), "src/lib.rs");
    }

    #[test]
    fn sanitize_path_normalizes_parent_components_that_stay_inside_root() {
        let root = Path::new("/work/project");
        assert_eq!(sanitize_path(root, "src/../src/lib.rs"), "src/lib.rs");
    }

    #[test]
    fn sanitize_path_keeps_absolute_path_outside_root_as_is() {
        let root = Path::new("/work/project");
        assert_eq!(sanitize_path(root, "/etc/passwd"), "/etc/passwd");
    }

    #[test]
    fn sanitize_path_strips_root_prefix_from_absolute_path_inside_root() {
        let root = Path::new("/work/project");
        assert_eq!(sanitize_path(root, "/work/project/src/lib.rs"), "src/lib.rs");
    }
}
