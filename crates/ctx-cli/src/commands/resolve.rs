//! Shared `--path`/`--name` project resolution used by every subcommand.

use std::path::PathBuf;

use ctx_core::Registry;

pub enum Resolved {
    Path(PathBuf),
    /// `--name` matched zero or more than one project; caller should
    /// print the message and exit with the given code.
    Failed { message: String, exit_code: i32 },
}

pub fn resolve_project_path(
    registry: &Registry,
    path: &Option<PathBuf>,
    name: &Option<String>,
) -> Resolved {
    if let Some(path) = path {
        return Resolved::Path(normalize(path));
    }

    if let Some(name) = name {
        let matches = match registry.find_by_name(name) {
            Ok(matches) => matches,
            Err(err) => {
                return Resolved::Failed {
                    message: format!("Failed to look up project by name: {err}"),
                    exit_code: 1,
                }
            }
        };
        return match matches.as_slice() {
            [] => Resolved::Failed {
                message: format!("No active project found with name '{name}'."),
                exit_code: 1,
            },
            [only] => Resolved::Path(PathBuf::from(&only.path)),
            many => {
                let mut message = format!("Display name '{name}' is ambiguous. Provide --path. Candidates:");
                for project in many {
                    message.push_str(&format!("\n- {}", project.path));
                }
                Resolved::Failed { message, exit_code: 2 }
            }
        };
    }

    Resolved::Path(normalize(&std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))))
}

fn normalize(path: &std::path::Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
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
    fn explicit_path_wins_over_name() {
        let (_dir, registry) = registry();
        let resolved = resolve_project_path(
            &registry,
            &Some(PathBuf::from("/work/explicit")),
            &Some("ignored-name".to_string()),
        );
        match resolved {
            Resolved::Path(path) => assert_eq!(path, PathBuf::from("/work/explicit")),
            Resolved::Failed { .. } => panic!("expected an explicit path to resolve"),
        }
    }

    #[test]
    fn unknown_name_fails_with_exit_code_one() {
        let (_dir, registry) = registry();
        let resolved = resolve_project_path(&registry, &None, &Some("missing".to_string()));
        match resolved {
            Resolved::Failed { exit_code, .. } => assert_eq!(exit_code, 1),
            Resolved::Path(_) => panic!("expected no match for an unregistered name"),
        }
    }

    #[test]
    fn ambiguous_name_fails_with_exit_code_two() {
        let (_dir, registry) = registry();
        registry
            .upsert_project(std::path::Path::new("/work/a/widgets"), Some("widgets"))
            .unwrap();
        registry
            .upsert_project(std::path::Path::new("/work/b/widgets"), Some("widgets"))
            .unwrap();
        let resolved = resolve_project_path(&registry, &None, &Some("widgets".to_string()));
        match resolved {
            Resolved::Failed { exit_code, message } => {
                assert_eq!(exit_code, 2);
                assert!(message.contains("/work/a/widgets"));
                assert!(message.contains("/work/b/widgets"));
            }
            Resolved::Path(_) => panic!("expected ambiguity for a duplicated display name"),
        }
    }

    #[test]
    fn single_name_match_resolves_to_its_registered_path() {
        let (_dir, registry) = registry();
        registry
            .upsert_project(std::path::Path::new("/work/only"), Some("only"))
            .unwrap();
        let resolved = resolve_project_path(&registry, &None, &Some("only".to_string()));
        match resolved {
            Resolved::Path(path) => assert_eq!(path, PathBuf::from("/work/only")),
            Resolved::Failed { .. } => panic!("expected a unique name match to resolve"),
        }
    }
}
