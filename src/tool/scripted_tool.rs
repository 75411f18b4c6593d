use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::tool::{LockTool, ToolInvocationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    ListLocks,
    ListTrackedFiles,
    SetLock(String),
    ReleaseLock(String),
    ForceReleaseLock(String, String),
    CurrentUser,
}

#[derive(Debug, Default)]
struct ScriptedState {
    user: String,
    tracked: Vec<String>,
    locks: BTreeMap<String, (String, u64)>,
    next_id: u64,
    failing: HashSet<String>,
    listing_fails: bool,
    extra_lines: Vec<String>,
    call_delay: Option<Duration>,
    calls: Vec<ToolCall>,
}

/// In-memory lock server standing in for git-lfs, shared between clones so a
/// test can inspect what the workers did.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTool {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedTool {
    pub fn new(user: &str) -> Self {
        let tool = Self::default();
        tool.with_state(|state| {
            state.user = user.to_string();
            state.next_id = 1;
        });
        tool
    }

    pub fn tracking(self, paths: &[&str]) -> Self {
        self.with_state(|state| state.tracked = paths.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn locked_by(self, path: &str, owner: &str) -> Self {
        self.with_state(|state| {
            let id = state.next_id;
            state.next_id += 1;
            state.locks.insert(path.to_string(), (owner.to_string(), id));
        });
        self
    }

    /// Every lock operation on `path` exits with a non-zero status.
    pub fn failing_on(self, path: &str) -> Self {
        self.with_state(|state| {
            state.failing.insert(path.to_string());
        });
        self
    }

    pub fn with_extra_lines(self, lines: &[&str]) -> Self {
        self.with_state(|state| state.extra_lines = lines.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn with_call_delay(self, delay: Duration) -> Self {
        self.with_state(|state| state.call_delay = Some(delay));
        self
    }

    pub fn set_listing_fails(&self, fails: bool) {
        self.with_state(|state| state.listing_fails = fails);
    }

    /// Simulates another user taking a lock between two refreshes.
    pub fn lock_as(&self, path: &str, owner: &str) {
        self.clone().locked_by(path, owner);
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.with_state(|state| state.calls.clone())
    }

    pub fn lock_calls(&self) -> Vec<ToolCall> {
        self.calls()
            .into_iter()
            .filter(|call| {
                matches!(
                    call,
                    ToolCall::SetLock(_) | ToolCall::ReleaseLock(_) | ToolCall::ForceReleaseLock(..)
                )
            })
            .collect()
    }

    pub fn listing_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == ToolCall::ListLocks)
            .count()
    }

    pub fn owner_of(&self, path: &str) -> Option<String> {
        self.with_state(|state| state.locks.get(path).map(|(owner, _)| owner.clone()))
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ScriptedState) -> R) -> R {
        let mut state = self.state.lock().expect("scripted tool state poisoned");
        f(&mut state)
    }

    async fn pause(&self) {
        if let Some(delay) = self.with_state(|state| state.call_delay) {
            compio::time::sleep(delay).await;
        }
    }

    fn failure(command: String, stderr: &str) -> ToolInvocationError {
        ToolInvocationError::UnsuccessfulExecution {
            command,
            status: 2,
            stderr: stderr.to_string(),
        }
    }

    fn mutate(
        &self,
        call: ToolCall,
        path: &str,
        apply: impl FnOnce(&mut ScriptedState) -> Result<(), String>,
    ) -> Result<(), ToolInvocationError> {
        self.with_state(|state| {
            state.calls.push(call.clone());
            if state.failing.contains(path) {
                return Err(Self::failure(format!("{call:?}"), "scripted failure"));
            }
            apply(state).map_err(|stderr| Self::failure(format!("{call:?}"), &stderr))
        })
    }
}

impl LockTool for ScriptedTool {
    async fn list_locks(&self) -> Result<Vec<String>, ToolInvocationError> {
        self.pause().await;
        self.with_state(|state| {
            state.calls.push(ToolCall::ListLocks);
            if state.listing_fails {
                return Err(Self::failure("locks".into(), "remote unavailable"));
            }
            let mut lines: Vec<String> = state
                .locks
                .iter()
                .map(|(path, (owner, id))| format!("{path}\t{owner}\tID:{id}"))
                .collect();
            lines.extend(state.extra_lines.iter().cloned());
            Ok(lines)
        })
    }

    async fn set_lock(&self, path: &str) -> Result<(), ToolInvocationError> {
        self.pause().await;
        self.mutate(ToolCall::SetLock(path.to_string()), path, |state| {
            if let Some((owner, _)) = state.locks.get(path) {
                return Err(format!("lock exists, held by {owner}"));
            }
            let id = state.next_id;
            state.next_id += 1;
            state.locks.insert(path.to_string(), (state.user.clone(), id));
            Ok(())
        })
    }

    async fn release_lock(&self, path: &str) -> Result<(), ToolInvocationError> {
        self.pause().await;
        self.mutate(ToolCall::ReleaseLock(path.to_string()), path, |state| {
            match state.locks.get(path) {
                None => Err("no matching locks found".into()),
                Some((owner, _)) if *owner != state.user => {
                    Err(format!("lock is owned by {owner}"))
                }
                Some(_) => {
                    state.locks.remove(path);
                    Ok(())
                }
            }
        })
    }

    async fn force_release_lock(
        &self,
        path: &str,
        owner: &str,
    ) -> Result<(), ToolInvocationError> {
        self.pause().await;
        let call = ToolCall::ForceReleaseLock(path.to_string(), owner.to_string());
        self.mutate(call, path, |state| match state.locks.remove(path) {
            Some(_) => Ok(()),
            None => Err("no matching locks found".into()),
        })
    }

    async fn list_tracked_files(&self) -> Result<Vec<String>, ToolInvocationError> {
        self.with_state(|state| {
            state.calls.push(ToolCall::ListTrackedFiles);
            Ok(state.tracked.clone())
        })
    }

    async fn current_user(&self) -> Result<String, ToolInvocationError> {
        self.with_state(|state| {
            state.calls.push(ToolCall::CurrentUser);
            Ok(state.user.clone())
        })
    }
}
