//! A pure predicate applied at every enumeration exit point in
//! `FileStore`, `TestRunner` framework detection, and `SecurityScanner`
//! discovery. Uses the same declarative `const`-array-of-patterns style
//! this codebase uses for its own dotfile/secret block lists.

const IGNORED_NAMES: &[&str] = &[
    ".DS_Store",
    ".DS_Store?",
    "Thumbs.db",
    "ehthumbs.db",
    ".Spotlight-V100",
    ".Trashes",
    "desktop.ini",
];

const IGNORED_PREFIX: &str = "._";
const IGNORED_SUFFIX: &str = ".backup";

const IGNORED_DIR_NAMES: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    ".pytest_cache",
    ".mypy_cache",
    ".tox",
    "venv",
    ".venv",
    "env",
];

/// True if `path` (project-relative, `/`-separated) is system noise that
/// must never be exposed to an agent or the scanner.
pub fn should_ignore_path(path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some(&file_name) = segments.last() else {
        return false;
    };

    if segments[..segments.len() - 1]
        .iter()
        .any(|seg| IGNORED_DIR_NAMES.contains(seg))
    {
        return true;
    }

    if IGNORED_DIR_NAMES.contains(&file_name) {
        return true;
    }

    if IGNORED_NAMES.contains(&file_name) {
        return true;
    }

    if file_name.starts_with(IGNORED_PREFIX) {
        return true;
    }

    if file_name.ends_with(IGNORED_SUFFIX) {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_known_os_noise() {
        assert!(should_ignore_path(".DS_Store"));
        assert!(should_ignore_path("src/.DS_Store"));
        assert!(should_ignore_path("Thumbs.db"));
        assert!(should_ignore_path("desktop.ini"));
    }

    #[test]
    fn ignores_backup_files() {
        assert!(should_ignore_path("src/main.rs.backup"));
    }

    #[test]
    fn ignores_dotprefixed_appledouble_files() {
        assert!(should_ignore_path("._resource"));
    }

    #[test]
    fn ignores_noise_directories_at_any_depth() {
        assert!(should_ignore_path("src/.git/config"));
        assert!(should_ignore_path("backend/node_modules/leftpad/index.js"));
        assert!(should_ignore_path(".venv/lib/site-packages/foo.py"));
    }

    #[test]
    fn allows_ordinary_project_files() {
        assert!(!should_ignore_path("src/main.rs"));
        assert!(!should_ignore_path("README.md"));
        assert!(!should_ignore_path("tests/test_add.py"));
    }
}
