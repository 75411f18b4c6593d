//! Lock, unlock and force-unlock batches over a selection of paths.

mod action;
mod action_coordinator;

pub use action::{
    ActionKind, ActionReport, OutcomeStatus, PathOutcome, SkipReason, StaleStateNotice,
};
pub use action_coordinator::{AccessPolicy, ActionCoordinator, ActionError};
