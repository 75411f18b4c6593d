use std::path::{Path, PathBuf};

use derive_more::Display;
use ignore::WalkBuilder;
use regex::Regex;
use snafu::{ResultExt, Snafu};
use tracing::{debug, warn};

use crate::ext::BestEffortPathExt;
use crate::locks::normalize_repo_path;
use crate::tool::{LockTool, ToolInvocationError};

const GIT_DIR: &str = ".git";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum PathSourceKind {
    /// Files git-lfs tracks, as listed by `git lfs ls-files`.
    #[default]
    #[display("tracked")]
    Tracked,
    /// Every file below the project root that git would not ignore.
    #[display("filesystem")]
    Filesystem,
}

/// Produces the repository-relative paths the lock tree is built from.
#[derive(Debug, Clone)]
pub struct PathSource {
    kind: PathSourceKind,
    project_root: PathBuf,
    filter: Option<Regex>,
}

impl PathSource {
    /// `filter` is a regular expression anchored at the start of the path.
    pub fn new(
        kind: PathSourceKind,
        project_root: impl Into<PathBuf>,
        filter: Option<&str>,
    ) -> Result<Self, PathSourceError> {
        let filter = filter
            .map(str::trim)
            .filter(|pattern| !pattern.is_empty())
            .map(|pattern| {
                Regex::new(&format!("^(?:{pattern})")).context(InvalidFilterSnafu {
                    pattern: pattern.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            kind,
            project_root: project_root.into(),
            filter,
        })
    }

    /// Whether `path` names a regular file below the project root, whatever
    /// the source kind or filter say.
    pub fn exists_locally(&self, path: &str) -> bool {
        self.project_root.join(path).is_file()
    }

    pub async fn enumerate<T: LockTool>(&self, tool: &T) -> Result<Vec<String>, PathSourceError> {
        let paths = match self.kind {
            PathSourceKind::Tracked => tool.list_tracked_files().await.context(ToolSnafu)?,
            PathSourceKind::Filesystem => walk(&self.project_root),
        };

        let total = paths.len();
        let paths: Vec<String> = paths
            .into_iter()
            .map(|path| normalize_repo_path(&path))
            .filter(|path| !path.is_empty() && self.admits(path))
            .collect();
        debug!(
            "Enumerated {} {} paths, {} pass the filter",
            total,
            self.kind,
            paths.len()
        );

        Ok(paths)
    }

    fn admits(&self, path: &str) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| filter.is_match(path))
    }
}

fn walk(root: &Path) -> Vec<String> {
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .require_git(false)
        .filter_entry(|entry| entry.file_name() != GIT_DIR)
        .build();

    let mut paths = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_some_and(|t| t.is_file()) => {
                let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                paths.push(relative.to_string_lossy().replace('\\', "/"));
            }
            Ok(_) => {}
            Err(e) => warn!(
                "Skipping unreadable entry below {}: {}",
                root.best_effort_path_display(),
                e
            ),
        }
    }

    paths.sort();
    paths
}

#[derive(Debug, Snafu)]
pub enum PathSourceError {
    #[snafu(display("Invalid tracked file filter '{}'", pattern))]
    InvalidFilter {
        pattern: String,
        source: regex::Error,
    },
    #[snafu(display("Failed to list tracked files"))]
    ToolError { source: ToolInvocationError },
}
