use crate::config::Config;
use crate::fs::{FileSystem, is_python_file};
use ignore::WalkBuilder;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};

/// Directory names never descended into, whatever the config says.
const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    "__pypackages__",
    "build",
    "dist",
    "node_modules",
    "site-packages",
    "venv",
];

/// Determine the project root by looking for pyproject.toml or package markers.
pub fn detect_project_root(target: &Path, fs: &dyn FileSystem) -> PathBuf {
    let start = if fs.is_file(target) {
        target.parent().map(Path::to_path_buf)
    } else {
        Some(target.to_path_buf())
    };

    let mut current = start.clone();
    while let Some(dir) = current {
        let markers = ["pyproject.toml", "setup.py", "setup.cfg"];
        if markers.iter().any(|m| fs.exists(&dir.join(m))) {
            return dir;
        }
        if fs.exists(&dir.join("src").join("__init__.py")) {
            return dir;
        }
        current = dir.parent().map(Path::to_path_buf);
    }

    start.unwrap_or_else(|| PathBuf::from("."))
}

/// Files in `test`/`tests` directories, `test_*.py`, `*_test.py` and `conftest.py`.
pub fn is_test_file(relative: &Path) -> bool {
    let in_test_dir = relative
        .parent()
        .map(|parent| {
            parent.components().any(|c| match c {
                Component::Normal(name) => name == "test" || name == "tests",
                _ => false,
            })
        })
        .unwrap_or(false);
    if in_test_dir {
        return true;
    }

    let stem = relative.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    stem.starts_with("test_") || stem.ends_with("_test") || stem == "conftest"
}

fn in_default_excluded_dir(relative: &Path) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(name) => name
            .to_str()
            .is_some_and(|n| DEFAULT_EXCLUDED_DIRS.contains(&n)),
        _ => false,
    })
}

/// Walk the corpus root for Python files, honoring `.gitignore`, hidden-file
/// rules, test-file exclusion and configured exclude globs. Sorted by path.
pub fn discover_files(root: &Path, config: &Config) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(root).hidden(true).git_ignore(true).build();
    let mut files = Vec::new();

    for entry in walker.flatten() {
        let path = entry.path();
        if !path.is_file() || !is_python_file(path) {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        if in_default_excluded_dir(relative) {
            trace!("Skipping default-excluded path: {}", relative.display());
            continue;
        }
        if !config.analysis.include_tests && is_test_file(relative) {
            trace!("Skipping test file: {}", relative.display());
            continue;
        }
        if config.is_excluded(relative) {
            trace!("Skipping excluded path: {}", relative.display());
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    debug!("Discovered {} Python files under {}", files.len(), root.display());
    files
}

/// Files making up the target: the file itself, or every Python file in the
/// package directory (test files included).
pub fn target_files(target: &Path) -> Vec<PathBuf> {
    if target.is_file() {
        return if is_python_file(target) {
            vec![target.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    let mut files: Vec<PathBuf> = WalkBuilder::new(target)
        .hidden(true)
        .git_ignore(true)
        .build()
        .flatten()
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && is_python_file(path))
        .collect();
    files.sort();
    files
}

fn is_package_dir(dir: &Path, fs: &dyn FileSystem) -> bool {
    fs.is_file(&dir.join("__init__.py")) || fs.is_file(&dir.join("__init__.pyi"))
}

/// Walk up the directory tree collecting the names of enclosing packages.
fn package_components(start: &Path, fs: &dyn FileSystem) -> Vec<String> {
    let mut components = Vec::new();
    let mut current = Some(start);

    while let Some(dir) = current {
        if !is_package_dir(dir, fs) {
            break;
        }
        match dir.file_name().and_then(|n| n.to_str()) {
            Some(name) => components.push(name.to_string()),
            None => break,
        }
        current = dir.parent();
    }

    components.reverse();
    components
}

/// Dotted import name of a Python file, derived from its package directories.
pub fn module_name(path: &Path, fs: &dyn FileSystem) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    let packages = path
        .parent()
        .map(|parent| package_components(parent, fs))
        .unwrap_or_default();

    if stem == "__init__" {
        if packages.is_empty() {
            return path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string();
        }
        return packages.join(".");
    }

    let mut parts = packages;
    parts.push(stem.to_string());
    parts.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFs;

    fn nested_fs() -> MockFs {
        MockFs::with_files([
            ("/proj/pyproject.toml", ""),
            ("/proj/src/__init__.py", ""),
            ("/proj/src/pkg1/__init__.py", ""),
            ("/proj/src/pkg1/pkg2/__init__.py", "X = 1"),
            ("/proj/src/pkg1/pkg2/helpers.py", "Y = 2"),
            ("/proj/client/__init__.py", ""),
            ("/proj/scripts/run.py", ""),
        ])
    }

    #[test]
    fn test_module_names_follow_packages() {
        let fs = nested_fs();
        assert_eq!(
            module_name(Path::new("/proj/src/pkg1/pkg2/__init__.py"), &fs),
            "src.pkg1.pkg2"
        );
        assert_eq!(
            module_name(Path::new("/proj/src/pkg1/pkg2/helpers.py"), &fs),
            "src.pkg1.pkg2.helpers"
        );
        assert_eq!(module_name(Path::new("/proj/client/__init__.py"), &fs), "client");
        assert_eq!(module_name(Path::new("/proj/scripts/run.py"), &fs), "run");
    }

    #[test]
    fn test_detect_project_root_pyproject() {
        let fs = nested_fs();
        let root = detect_project_root(Path::new("/proj/src/pkg1/pkg2/__init__.py"), &fs);
        assert_eq!(root, PathBuf::from("/proj"));
    }

    #[test]
    fn test_detect_project_root_setup_py() {
        let fs = MockFs::with_files([
            ("/work/lib/setup.py", ""),
            ("/work/lib/mypkg/__init__.py", ""),
        ]);
        let root = detect_project_root(Path::new("/work/lib/mypkg"), &fs);
        assert_eq!(root, PathBuf::from("/work/lib"));
    }

    #[test]
    fn test_detect_project_root_fallback() {
        let fs = MockFs::with_files([("/loose/mod.py", "")]);
        let root = detect_project_root(Path::new("/loose/mod.py"), &fs);
        assert_eq!(root, PathBuf::from("/loose"));
    }

    #[test]
    fn test_is_test_file() {
        assert!(is_test_file(Path::new("tests/test_api.py")));
        assert!(is_test_file(Path::new("pkg/tests/helpers.py")));
        assert!(is_test_file(Path::new("pkg/test_core.py")));
        assert!(is_test_file(Path::new("pkg/core_test.py")));
        assert!(is_test_file(Path::new("conftest.py")));
        assert!(!is_test_file(Path::new("pkg/testing.py")));
        assert!(!is_test_file(Path::new("pkg/contest.py")));
    }

    #[test]
    fn test_default_excluded_dirs() {
        assert!(in_default_excluded_dir(Path::new("venv/lib/x.py")));
        assert!(in_default_excluded_dir(Path::new("a/build/x.py")));
        assert!(!in_default_excluded_dir(Path::new("builder/x.py")));
    }
}
