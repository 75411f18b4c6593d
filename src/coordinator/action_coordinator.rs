use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use snafu::{Snafu, ensure};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinator::{
    ActionKind, ActionReport, OutcomeStatus, PathOutcome, SkipReason, StaleStateNotice,
};
use crate::executor::{BatchError, JobError, WorkerPool};
use crate::locks::normalize_repo_path;
use crate::session::{LockSession, LockTree};
use crate::tool::{LockTool, ToolInvocationError};

/// Users allowed to release locks held by someone else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    admin_users: HashSet<String>,
}

impl AccessPolicy {
    pub fn new<I, S>(admin_users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            admin_users: admin_users.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_admin(&self, user: &str) -> bool {
        self.admin_users.contains(user)
    }
}

/// A single tool call to run on a worker.
#[derive(Debug, Clone)]
struct LockRequest {
    kind: ActionKind,
    path: String,
    owner: Option<String>,
}

#[derive(Debug)]
enum CallFailure {
    Tool(ToolInvocationError),
    TimedOut,
}

/// Turns a selection of paths into lock tool calls and reconciles the lock
/// tree afterwards.
pub struct ActionCoordinator<T: LockTool + Clone + Send + 'static> {
    session: Arc<LockSession<T>>,
    pool: WorkerPool,
    access: AccessPolicy,
    call_timeout: Duration,
}

impl<T: LockTool + Clone + Send + 'static> ActionCoordinator<T> {
    pub fn new(
        session: Arc<LockSession<T>>,
        pool: WorkerPool,
        access: AccessPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            session,
            pool,
            access,
            call_timeout,
        }
    }

    #[cfg(test)]
    pub fn session(&self) -> &Arc<LockSession<T>> {
        &self.session
    }

    /// Runs `kind` on every selected path, one worker call per path, then
    /// refreshes the lock tree once.
    ///
    /// Force-unlocking requires `current_user` to be an administrator; the
    /// check happens before any tool call. Failed calls are reported per path
    /// and never retried.
    pub async fn perform_action(
        &self,
        kind: ActionKind,
        selected_paths: &[String],
        current_user: &str,
        cancellation: &CancellationToken,
    ) -> Result<ActionReport, ActionError> {
        if kind == ActionKind::ForceUnlock {
            ensure!(
                self.access.is_admin(current_user),
                AuthorizationSnafu {
                    user: current_user.to_string()
                }
            );
        }

        let paths = dedupe_paths(selected_paths);
        let before = self.session.snapshot();
        info!("Performing {} on {} paths", kind, paths.len());

        let mut statuses: Vec<Option<OutcomeStatus>> = Vec::with_capacity(paths.len());
        let mut requests: Vec<(usize, LockRequest)> = Vec::new();
        for (index, path) in paths.iter().enumerate() {
            match plan(kind, path, &before, current_user) {
                Ok(request) => {
                    statuses.push(None);
                    requests.push((index, request));
                }
                Err(reason) => {
                    debug!("Skipping {} of '{}': {}", kind, path, reason);
                    statuses.push(Some(OutcomeStatus::Skipped { reason }));
                }
            }
        }

        let jobs: Vec<_> = requests
            .iter()
            .map(|(_, request)| {
                let tool = self.session.tool().clone();
                let request = request.clone();
                let timeout = self.call_timeout;
                move || async move { invoke(&tool, &request, timeout).await }
            })
            .collect();

        let results = match self.pool.run_batch(jobs, cancellation).await {
            Ok(results) => results,
            Err(BatchError::Cancelled { jobs }) => {
                return CancelledSnafu { pending: jobs }.fail();
            }
        };
        ensure!(
            !cancellation.is_cancelled(),
            CancelledSnafu {
                pending: 0usize
            }
        );

        for ((index, request), result) in requests.iter().zip(results) {
            let status = classify(result);
            if status.is_failure() {
                warn!("{} of '{}' {}", kind, request.path, status);
            }
            statuses[*index] = Some(status);
        }

        let outcomes: Vec<PathOutcome> = paths
            .into_iter()
            .zip(statuses)
            .map(|(path, status)| PathOutcome {
                path,
                status: status.unwrap_or(OutcomeStatus::Failed {
                    reason: "no result".to_string(),
                }),
            })
            .collect();

        let (notices, refresh_error) = match self.session.refresh().await {
            Ok(_) => {
                let after = self.session.snapshot();
                (reconcile(kind, &outcomes, &before, &after, current_user), None)
            }
            Err(e) => {
                warn!("Refresh after {} failed: {}", kind, e);
                (Vec::new(), Some(e))
            }
        };

        for notice in &notices {
            info!("Stale state: {}", notice);
        }

        Ok(ActionReport {
            kind,
            outcomes,
            notices,
            refresh_error,
        })
    }
}

fn dedupe_paths(selected_paths: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    selected_paths
        .iter()
        .map(|path| normalize_repo_path(path))
        .filter(|path| !path.is_empty() && seen.insert(path.clone()))
        .collect()
}

fn plan(
    kind: ActionKind,
    path: &str,
    snapshot: &LockTree,
    current_user: &str,
) -> Result<LockRequest, SkipReason> {
    let owner = snapshot.owner_of(path).map(str::to_string);
    if kind == ActionKind::ForceUnlock {
        match owner.as_deref() {
            None => return Err(SkipReason::NotLocked),
            Some(owner) if owner == current_user => return Err(SkipReason::OwnedByCurrentUser),
            Some(_) => {}
        }
    }

    Ok(LockRequest {
        kind,
        path: path.to_string(),
        owner,
    })
}

async fn invoke<T: LockTool>(
    tool: &T,
    request: &LockRequest,
    timeout: Duration,
) -> Result<(), CallFailure> {
    let path = request.path.as_str();
    let call = async {
        match (request.kind, request.owner.as_deref()) {
            (ActionKind::Lock, _) => tool.set_lock(path).await,
            (ActionKind::Unlock, _) => tool.release_lock(path).await,
            (ActionKind::ForceUnlock, owner) => {
                tool.force_release_lock(path, owner.unwrap_or_default()).await
            }
        }
    };

    match compio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(CallFailure::Tool),
        Err(_) => Err(CallFailure::TimedOut),
    }
}

fn classify(result: Result<Result<(), CallFailure>, JobError>) -> OutcomeStatus {
    match result {
        Ok(Ok(())) => OutcomeStatus::Succeeded,
        Ok(Err(CallFailure::TimedOut)) => OutcomeStatus::TimedOut,
        Ok(Err(CallFailure::Tool(e))) => OutcomeStatus::Failed {
            reason: e.to_string(),
        },
        Err(e) => OutcomeStatus::Failed {
            reason: e.to_string(),
        },
    }
}

/// Compares each attempted path before and after the reconciling refresh.
fn reconcile(
    kind: ActionKind,
    outcomes: &[PathOutcome],
    before: &LockTree,
    after: &LockTree,
    current_user: &str,
) -> Vec<StaleStateNotice> {
    outcomes
        .iter()
        .filter(|outcome| outcome.status.was_attempted())
        .filter_map(|outcome| {
            let observed = after.owner_of(&outcome.path);
            let expected = if outcome.status == OutcomeStatus::Succeeded {
                kind.expected_owner(current_user)
            } else {
                before.owner_of(&outcome.path)
            };

            (observed != expected).then(|| StaleStateNotice {
                path: outcome.path.clone(),
                expected_owner: expected.map(str::to_string),
                observed_owner: observed.map(str::to_string),
            })
        })
        .collect()
}

#[derive(Debug, Snafu)]
pub enum ActionError {
    #[snafu(display("User '{}' is not allowed to force-unlock files", user))]
    AuthorizationError { user: String },
    #[snafu(display("Action cancelled with {} calls in flight", pending))]
    CancelledError { pending: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::{PathSource, PathSourceKind};
    use crate::tool::scripted_tool::{ScriptedTool, ToolCall};
    use std::num::NonZeroUsize;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn coordinator(tool: ScriptedTool, admins: &[&str]) -> ActionCoordinator<ScriptedTool> {
        let paths = PathSource::new(PathSourceKind::Tracked, ".", None).unwrap();
        let session = Arc::new(LockSession::new(tool, paths));
        session.refresh().await.expect("initial refresh");
        let pool = WorkerPool::with_workers(NonZeroUsize::new(4).unwrap()).unwrap();
        ActionCoordinator::new(session, pool, AccessPolicy::new(admins.iter().copied()), TIMEOUT)
    }

    fn selection(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[compio::test]
    async fn locks_selected_paths_and_refreshes_once() {
        let tool = ScriptedTool::new("alice").tracking(&["a/b.uasset", "a/c.uasset"]);
        let coordinator = coordinator(tool.clone(), &[]).await;
        let listings_before = tool.listing_count();

        let report = coordinator
            .perform_action(
                ActionKind::Lock,
                &selection(&["a/b.uasset", "a/c.uasset"]),
                "alice",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!report.has_failures());
        assert!(report.notices.is_empty());
        assert_eq!(tool.listing_count(), listings_before + 1);
        let snapshot = coordinator.session().snapshot();
        assert_eq!(snapshot.owner_of("a/b.uasset"), Some("alice"));
        assert_eq!(snapshot.owner_of("a/c.uasset"), Some("alice"));
    }

    #[compio::test]
    async fn unlock_returns_file_to_unlocked() {
        let tool = ScriptedTool::new("alice")
            .tracking(&["a.uasset"])
            .locked_by("a.uasset", "alice");
        let coordinator = coordinator(tool.clone(), &[]).await;

        let report = coordinator
            .perform_action(
                ActionKind::Unlock,
                &selection(&["a.uasset"]),
                "alice",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.outcome_for("a.uasset"), Some(&OutcomeStatus::Succeeded));
        assert_eq!(coordinator.session().snapshot().owner_of("a.uasset"), None);
        assert_eq!(tool.lock_calls(), vec![ToolCall::ReleaseLock("a.uasset".into())]);
    }

    #[compio::test]
    async fn failed_lock_leaves_file_unlocked_and_still_refreshes() {
        let tool = ScriptedTool::new("alice")
            .tracking(&["x.uasset", "y.uasset"])
            .failing_on("x.uasset");
        let coordinator = coordinator(tool.clone(), &[]).await;
        let listings_before = tool.listing_count();

        let report = coordinator
            .perform_action(
                ActionKind::Lock,
                &selection(&["x.uasset", "y.uasset"]),
                "alice",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(
            report.outcome_for("x.uasset"),
            Some(OutcomeStatus::Failed { .. })
        ));
        assert_eq!(report.outcome_for("y.uasset"), Some(&OutcomeStatus::Succeeded));
        assert!(report.has_failures());
        assert_eq!(tool.listing_count(), listings_before + 1);

        let snapshot = coordinator.session().snapshot();
        let node = snapshot.root().find("x.uasset").unwrap();
        assert!(node.lock.is_none());
        assert!(report.notices.is_empty());
    }

    #[compio::test]
    async fn force_unlock_by_non_admin_makes_no_calls() {
        let tool = ScriptedTool::new("alice")
            .tracking(&["a.uasset"])
            .locked_by("a.uasset", "bob");
        let coordinator = coordinator(tool.clone(), &["carol"]).await;
        let calls_before = tool.calls();

        let result = coordinator
            .perform_action(
                ActionKind::ForceUnlock,
                &selection(&["a.uasset"]),
                "alice",
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(ActionError::AuthorizationError { .. })));
        assert_eq!(tool.calls(), calls_before);
        assert_eq!(tool.owner_of("a.uasset").as_deref(), Some("bob"));
    }

    #[compio::test]
    async fn admin_force_unlocks_other_users_locks_only() {
        let tool = ScriptedTool::new("carol")
            .tracking(&["a.uasset", "b.uasset", "c.uasset"])
            .locked_by("a.uasset", "bob")
            .locked_by("b.uasset", "carol");
        let coordinator = coordinator(tool.clone(), &["carol"]).await;

        let report = coordinator
            .perform_action(
                ActionKind::ForceUnlock,
                &selection(&["a.uasset", "b.uasset", "c.uasset"]),
                "carol",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.outcome_for("a.uasset"), Some(&OutcomeStatus::Succeeded));
        assert_eq!(
            report.outcome_for("b.uasset"),
            Some(&OutcomeStatus::Skipped {
                reason: SkipReason::OwnedByCurrentUser
            })
        );
        assert_eq!(
            report.outcome_for("c.uasset"),
            Some(&OutcomeStatus::Skipped {
                reason: SkipReason::NotLocked
            })
        );
        assert_eq!(
            tool.lock_calls(),
            vec![ToolCall::ForceReleaseLock("a.uasset".into(), "bob".into())]
        );
        assert_eq!(coordinator.session().snapshot().owner_of("a.uasset"), None);
    }

    #[compio::test]
    async fn lock_taken_since_last_refresh_is_reported_as_stale() {
        let tool = ScriptedTool::new("alice").tracking(&["a.uasset"]);
        let coordinator = coordinator(tool.clone(), &[]).await;
        tool.lock_as("a.uasset", "bob");

        let report = coordinator
            .perform_action(
                ActionKind::Lock,
                &selection(&["a.uasset"]),
                "alice",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(report.has_failures());
        assert_eq!(
            report.notices,
            vec![StaleStateNotice {
                path: "a.uasset".into(),
                expected_owner: None,
                observed_owner: Some("bob".into()),
            }]
        );
    }

    #[compio::test]
    async fn duplicate_and_unnormalized_selection_collapses() {
        let tool = ScriptedTool::new("alice").tracking(&["a/b.uasset"]);
        let coordinator = coordinator(tool.clone(), &[]).await;

        let report = coordinator
            .perform_action(
                ActionKind::Lock,
                &selection(&["a/b.uasset", "a\\b.uasset", "./a/b.uasset", ""]),
                "alice",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(tool.lock_calls(), vec![ToolCall::SetLock("a/b.uasset".into())]);
    }

    #[compio::test]
    async fn slow_calls_time_out() {
        let tool = ScriptedTool::new("alice")
            .tracking(&["a.uasset"])
            .with_call_delay(Duration::from_millis(300));
        let paths = PathSource::new(PathSourceKind::Tracked, ".", None).unwrap();
        let session = Arc::new(LockSession::new(tool, paths));
        let pool = WorkerPool::with_workers(NonZeroUsize::new(2).unwrap()).unwrap();
        let coordinator = ActionCoordinator::new(
            session,
            pool,
            AccessPolicy::default(),
            Duration::from_millis(20),
        );

        let report = coordinator
            .perform_action(
                ActionKind::Lock,
                &selection(&["a.uasset"]),
                "alice",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.outcome_for("a.uasset"), Some(&OutcomeStatus::TimedOut));
    }

    #[compio::test]
    async fn cancelled_action_skips_refresh() {
        let tool = ScriptedTool::new("alice").tracking(&["a.uasset"]);
        let coordinator = coordinator(tool.clone(), &[]).await;
        let listings_before = tool.listing_count();
        let token = CancellationToken::new();
        token.cancel();

        let result = coordinator
            .perform_action(ActionKind::Lock, &selection(&["a.uasset"]), "alice", &token)
            .await;

        assert!(matches!(result, Err(ActionError::CancelledError { .. })));
        assert_eq!(tool.listing_count(), listings_before);
    }

    #[test]
    fn access_policy_checks_membership() {
        let policy = AccessPolicy::new(["carol", "dave"]);
        assert!(policy.is_admin("carol"));
        assert!(!policy.is_admin("alice"));
        assert!(!AccessPolicy::default().is_admin("carol"));
    }
}
