//! Adapter around the external lock tool.

mod git_lfs_tool;
mod lock_tool;
#[cfg(test)]
pub mod scripted_tool;

pub use git_lfs_tool::GitLfsTool;
pub use lock_tool::{LockTool, ToolInvocationError};
