mod async_conversion;
mod best_effort_path_ext;

pub use async_conversion::{AsyncTryFrom, AsyncTryInto};
pub use best_effort_path_ext::{BestEffortPathExt, resolve_against};
