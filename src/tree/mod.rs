//! Hierarchical view of repository files and the locks held on them.
//!
//! The tree is a plain value: a front end projects it into whatever model
//! its widgets need, and a refresh replaces it wholesale.

mod builder;
mod filter;
mod node;

pub use builder::{BuildError, build_tree};
pub use filter::{ViewFilter, ViewMode, apply_filter, apply_view};
pub use node::{NodeKind, TreeNode};
