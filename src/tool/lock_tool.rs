use std::path::PathBuf;

use snafu::Snafu;

/// Operations offered by the external lock tool.
///
/// Implementations are the only place in the crate that launches processes.
/// Every call is awaited to completion; a non-zero exit status is reported as
/// [`ToolInvocationError::UnsuccessfulExecution`].
pub trait LockTool {
    /// Raw, trimmed, non-blank lines of the lock listing.
    async fn list_locks(&self) -> Result<Vec<String>, ToolInvocationError>;
    async fn set_lock(&self, path: &str) -> Result<(), ToolInvocationError>;
    async fn release_lock(&self, path: &str) -> Result<(), ToolInvocationError>;
    /// Releases a lock held by `owner`, who is someone other than the caller.
    async fn force_release_lock(&self, path: &str, owner: &str)
    -> Result<(), ToolInvocationError>;
    /// Repository-relative paths of every file the tool tracks.
    async fn list_tracked_files(&self) -> Result<Vec<String>, ToolInvocationError>;
    /// The user name the repository is configured with.
    async fn current_user(&self) -> Result<String, ToolInvocationError>;
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ToolInvocationError {
    #[snafu(display("Lock tool executable '{}' does not exist", executable.display()))]
    ExecutableNotFound { executable: PathBuf },
    #[snafu(display("Failed to run '{}'", command))]
    SpawnError {
        command: String,
        source: std::io::Error,
    },
    #[snafu(display("'{}' failed with exit code {}: {}", command, status, stderr))]
    UnsuccessfulExecution {
        command: String,
        status: i32,
        stderr: String,
    },
    #[snafu(display("'{}' printed nothing", command))]
    EmptyOutput { command: String },
}
