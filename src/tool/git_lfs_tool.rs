use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use compio::process::Command;
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, info, warn};

use crate::ext::BestEffortPathExt;
use crate::tool::lock_tool::{
    EmptyOutputSnafu, ExecutableNotFoundSnafu, SpawnSnafu, UnsuccessfulExecutionSnafu,
};
use crate::tool::{LockTool, ToolInvocationError};

const DEFAULT_GIT_LFS_EXECUTABLE: &str = "git-lfs";
const GIT_EXECUTABLE: &str = "git";

/// Drives the `git-lfs` command line client inside the project root.
#[derive(Debug, Clone)]
pub struct GitLfsTool {
    executable: PathBuf,
    project_root: PathBuf,
}

impl GitLfsTool {
    pub fn new(executable: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            project_root: project_root.into(),
        }
    }

    /// Picks the executable to run: a configured one, relative to the project
    /// root unless absolute, or `git-lfs` from `PATH`.
    pub fn resolve_executable(
        custom: Option<&str>,
        project_root: &Path,
    ) -> Result<PathBuf, ToolInvocationError> {
        let Some(custom) = custom.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(PathBuf::from(DEFAULT_GIT_LFS_EXECUTABLE));
        };

        let mut executable = project_root.join(custom);
        if cfg!(target_family = "windows") && executable.extension().is_none() {
            executable.set_extension("exe");
        }

        ensure!(
            executable.is_file(),
            ExecutableNotFoundSnafu {
                executable: executable.clone()
            }
        );
        info!(
            "Using custom git-lfs executable {}",
            executable.best_effort_path_display()
        );
        Ok(executable)
    }

    async fn run_lfs<I, S>(&self, args: I) -> Result<Vec<String>, ToolInvocationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run(&self.executable, args).await
    }

    async fn run<I, S>(&self, program: &Path, args: I) -> Result<Vec<String>, ToolInvocationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let command_line = describe(program, &args);
        debug!(
            "Running '{}' in {}",
            command_line,
            self.project_root.best_effort_path_display()
        );

        let mut cmd = Command::new(program);
        cmd.args(&args);
        cmd.current_dir(&self.project_root);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        let _ = cmd.stdin(Stdio::null());
        let _ = cmd.stdout(Stdio::piped());
        let _ = cmd.stderr(Stdio::piped());

        let output = cmd.output().await.context(SpawnSnafu {
            command: command_line.clone(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("'{}' failed: {}", command_line, stderr);
            return UnsuccessfulExecutionSnafu {
                command: command_line,
                status: output.status.code().unwrap_or(-1),
                stderr,
            }
            .fail();
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl LockTool for GitLfsTool {
    async fn list_locks(&self) -> Result<Vec<String>, ToolInvocationError> {
        self.run_lfs(["locks"]).await
    }

    async fn set_lock(&self, path: &str) -> Result<(), ToolInvocationError> {
        self.run_lfs(["lock", "--", path]).await.map(|_| ())
    }

    async fn release_lock(&self, path: &str) -> Result<(), ToolInvocationError> {
        self.run_lfs(["unlock", "--", path]).await.map(|_| ())
    }

    async fn force_release_lock(
        &self,
        path: &str,
        owner: &str,
    ) -> Result<(), ToolInvocationError> {
        info!("Force-releasing lock on '{}' held by {}", path, owner);
        self.run_lfs(["unlock", "--force", "--", path]).await.map(|_| ())
    }

    async fn list_tracked_files(&self) -> Result<Vec<String>, ToolInvocationError> {
        self.run_lfs(["ls-files", "--name-only"]).await
    }

    async fn current_user(&self) -> Result<String, ToolInvocationError> {
        let git = Path::new(GIT_EXECUTABLE);
        let lines = self.run(git, ["config", "user.name"]).await?;
        lines.into_iter().next().context(EmptyOutputSnafu {
            command: describe(git, &["config", "user.name"]),
        })
    }
}

fn describe<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> String {
    std::iter::once(program.as_os_str())
        .chain(args.iter().map(|arg| arg.as_ref()))
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
