//! Architectural Enforcement Integration Tests
//!
//! This package contains tests that enforce architectural principles across
//! the planner crates:
//! - No blocking sleep in production code
//! - No `unwrap()`/`expect()` outside test modules
//! - `planner-core` stays free of HTTP server dependencies
//!
//! These tests are designed to catch violations early in the development cycle.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Crates whose sources are checked
pub const CHECKED_CRATES: &[&str] = &["planner/core", "planner/daemon"];

/// Workspace root, derived from this package's manifest directory
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Every `.rs` file under `src/` of the checked crates
pub fn production_sources() -> Vec<PathBuf> {
    let root = workspace_root();
    CHECKED_CRATES
        .iter()
        .flat_map(|krate| WalkDir::new(root.join(krate).join("src")))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| path.extension().is_some_and(|ext| ext == "rs"))
        .collect()
}

/// Non-comment lines preceding the file's `#[cfg(test)]` module
pub fn production_lines(source: &str) -> Vec<(usize, &str)> {
    source
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .filter(|(_, line)| !line.trim_start().starts_with("//"))
        .map(|(index, line)| (index + 1, line))
        .collect()
}

/// `file:line: text` for every production line containing one of `patterns`
pub fn find_violations(patterns: &[&str]) -> Vec<String> {
    let mut violations = Vec::new();
    for path in production_sources() {
        let Ok(source) = std::fs::read_to_string(&path) else {
            continue;
        };
        for (number, line) in production_lines(&source) {
            if patterns.iter().any(|p| line.contains(p)) {
                violations.push(format!("{}:{number}: {}", path.display(), line.trim()));
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_are_found() {
        let sources = production_sources();
        assert!(sources.iter().any(|p| p.ends_with("reasoning/filter.rs")));
        assert!(sources.iter().any(|p| p.ends_with("routes.rs")));
    }

    #[test]
    fn test_no_blocking_sleep() {
        let violations = find_violations(&["std::thread::sleep", "thread::sleep("]);
        assert!(violations.is_empty(), "{}", violations.join("\n"));
    }

    #[test]
    fn test_no_unwrap_in_production_code() {
        let violations = find_violations(&[".unwrap()", ".expect("]);
        assert!(violations.is_empty(), "{}", violations.join("\n"));
    }

    #[test]
    fn test_core_has_no_server_dependencies() {
        let manifest =
            std::fs::read_to_string(workspace_root().join("planner/core/Cargo.toml")).unwrap();
        let dependencies = manifest
            .split("[dev-dependencies]")
            .next()
            .unwrap_or_default();

        for forbidden in ["axum", "tower", "hyper"] {
            assert!(
                !dependencies
                    .lines()
                    .any(|line| line.trim_start().starts_with(forbidden)),
                "planner-core must not depend on {forbidden}"
            );
        }
    }

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let source = "fn a() {}\n// x.unwrap()\n#[cfg(test)]\nmod tests {}\n";
        let lines = production_lines(source);
        assert_eq!(lines, vec![(1, "fn a() {}")]);
    }
}
