//! Lock records and the parser for the external tool's lock listing.

mod lock_record;
mod parser;

pub use lock_record::{LockRecord, normalize_repo_path, owners};
pub use parser::{ParseWarning, parse_lock_lines};
