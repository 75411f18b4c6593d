mod lock_session;

pub use lock_session::{LockSession, LockTree, RefreshError};
