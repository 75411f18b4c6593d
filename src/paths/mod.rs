mod path_source;

pub use path_source::{PathSource, PathSourceError, PathSourceKind};
