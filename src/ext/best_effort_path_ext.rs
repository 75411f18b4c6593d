use std::path::{Component, Path, PathBuf};

/// Renders a path for log and error messages.
///
/// Canonicalizes when the path exists; otherwise makes it absolute against the
/// working directory and folds `.` and `..` lexically.
pub fn best_effort_path_display(path: &Path) -> String {
    match path.canonicalize() {
        Ok(canonical_path) => canonical_path.display().to_string(),
        Err(_) => lexically_absolute(path).display().to_string(),
    }
}

/// Resolves `path` against `base` unless it is already absolute. An empty
/// result becomes `.`.
pub fn resolve_against(path: &Path, base: &Path) -> PathBuf {
    let resolved = if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    };
    if resolved.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        resolved
    }
}

fn lexically_absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize_path(path);
    }
    match std::env::current_dir() {
        Ok(current_dir) => normalize_path(&current_dir.join(path)),
        Err(_) => normalize_path(path),
    }
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => components.push(component),
            },
            _ => components.push(component),
        }
    }

    components.iter().collect()
}

pub trait BestEffortPathExt {
    fn best_effort_path_display(&self) -> String;
}

impl BestEffortPathExt for Path {
    fn best_effort_path_display(&self) -> String {
        best_effort_path_display(self)
    }
}

impl BestEffortPathExt for PathBuf {
    fn best_effort_path_display(&self) -> String {
        best_effort_path_display(self)
    }
}
