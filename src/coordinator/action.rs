use std::fmt;

use derive_more::Display;

use crate::session::RefreshError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ActionKind {
    #[display("lock")]
    Lock,
    #[display("unlock")]
    Unlock,
    #[display("force-unlock")]
    ForceUnlock,
}

impl ActionKind {
    /// The lock owner a path should have once the action went through.
    pub fn expected_owner<'a>(&self, current_user: &'a str) -> Option<&'a str> {
        match self {
            ActionKind::Lock => Some(current_user),
            ActionKind::Unlock | ActionKind::ForceUnlock => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SkipReason {
    #[display("not locked")]
    NotLocked,
    #[display("locked by you, use unlock instead")]
    OwnedByCurrentUser,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Succeeded,
    Failed { reason: String },
    TimedOut,
    /// Rejected before any tool call was made.
    Skipped { reason: SkipReason },
}

impl OutcomeStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, OutcomeStatus::Failed { .. } | OutcomeStatus::TimedOut)
    }

    pub fn was_attempted(&self) -> bool {
        !matches!(self, OutcomeStatus::Skipped { .. })
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Succeeded => write!(f, "ok"),
            OutcomeStatus::Failed { reason } => write!(f, "failed: {reason}"),
            OutcomeStatus::TimedOut => write!(f, "timed out"),
            OutcomeStatus::Skipped { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{path}: {status}")]
pub struct PathOutcome {
    pub path: String,
    pub status: OutcomeStatus,
}

/// The refreshed state of a path disagrees with what the action assumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleStateNotice {
    pub path: String,
    pub expected_owner: Option<String>,
    pub observed_owner: Option<String>,
}

impl fmt::Display for StaleStateNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let describe = |owner: &Option<String>| match owner {
            Some(owner) => format!("locked by {owner}"),
            None => "unlocked".to_string(),
        };
        write!(
            f,
            "{} is {}, expected it to be {}",
            self.path,
            describe(&self.observed_owner),
            describe(&self.expected_owner)
        )
    }
}

#[derive(Debug)]
pub struct ActionReport {
    pub kind: ActionKind,
    pub outcomes: Vec<PathOutcome>,
    pub notices: Vec<StaleStateNotice>,
    /// Set when the reconciling refresh failed; the displayed tree is then the
    /// one from before the action.
    pub refresh_error: Option<RefreshError>,
}

impl ActionReport {
    pub fn failures(&self) -> impl Iterator<Item = &PathOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.status.is_failure())
    }

    #[cfg(test)]
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some() || self.refresh_error.is_some()
    }

    #[cfg(test)]
    pub fn outcome_for(&self, path: &str) -> Option<&OutcomeStatus> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.path == path)
            .map(|outcome| &outcome.status)
    }
}
