use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{DefaultMode, Settings};
use crate::ext::resolve_against;
use crate::paths::PathSourceKind;

/// Settings merged with command line overrides, with paths resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub project_root: PathBuf,
    pub git_lfs_executable: Option<String>,
    pub current_user: Option<String>,
    pub admin_users: Vec<String>,
    pub tracked_file_filter: Option<String>,
    pub expansion_depth: usize,
    pub default_mode: DefaultMode,
    pub path_source: PathSourceKind,
    pub command_timeout: Duration,
}

impl RuntimeConfig {
    /// A relative `projectRoot` is taken relative to `settings_dir`, the
    /// directory the settings file lives in. `root_override` wins over both.
    pub fn new(settings: Settings, settings_dir: &Path, root_override: Option<&Path>) -> Self {
        let project_root = match root_override {
            Some(root) => resolve_against(root, Path::new("")),
            None => resolve_against(&settings.project_root, settings_dir),
        };

        Self {
            project_root,
            git_lfs_executable: settings.git_lfs_executable,
            current_user: settings.current_user,
            admin_users: settings.admin_users,
            tracked_file_filter: settings.tracked_file_filter,
            expansion_depth: settings.default_expansion_depth,
            default_mode: settings.default_mode,
            path_source: settings.path_source,
            command_timeout: settings.command_timeout,
        }
    }
}
