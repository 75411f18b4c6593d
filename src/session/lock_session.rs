use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::lock::Mutex;
use snafu::{ResultExt, Snafu};
use tracing::{debug, info, warn};

use crate::locks::{LockRecord, ParseWarning, normalize_repo_path, owners, parse_lock_lines};
use crate::paths::{PathSource, PathSourceError};
use crate::tool::{LockTool, ToolInvocationError};
use crate::tree::{BuildError, TreeNode, build_tree};

/// One consistent view of the repository's locks.
#[derive(Debug, Clone)]
pub struct LockTree {
    root: TreeNode,
    records: Vec<LockRecord>,
    by_path: HashMap<String, usize>,
}

impl LockTree {
    pub fn empty() -> Self {
        Self::new(TreeNode::root(), Vec::new())
    }

    fn new(root: TreeNode, records: Vec<LockRecord>) -> Self {
        let mut by_path = HashMap::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            by_path.entry(record.path.clone()).or_insert(index);
        }
        Self {
            root,
            records,
            by_path,
        }
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    #[cfg(test)]
    pub fn records(&self) -> &[LockRecord] {
        &self.records
    }

    pub fn lock_for(&self, path: &str) -> Option<&LockRecord> {
        self.by_path
            .get(&normalize_repo_path(path))
            .map(|&index| &self.records[index])
    }

    pub fn owner_of(&self, path: &str) -> Option<&str> {
        self.lock_for(path).map(|record| record.owner.as_str())
    }

    pub fn owners(&self) -> Vec<String> {
        owners(&self.records)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    pub files: usize,
    pub locks: usize,
    /// Only filled when every non-blank line of the listing was rejected.
    pub warnings: Vec<ParseWarning>,
}

/// Owns the current lock tree and keeps it in step with the lock tool.
///
/// Refreshes run one at a time: a refresh requested while another is in
/// flight waits for it to finish. The tree is rebuilt from scratch on every
/// refresh and published by swapping an `Arc`, so readers either see the
/// previous snapshot or the new one.
pub struct LockSession<T: LockTool> {
    tool: T,
    paths: PathSource,
    current: RwLock<Arc<LockTree>>,
    refresh_gate: Mutex<()>,
}

impl<T: LockTool> LockSession<T> {
    pub fn new(tool: T, paths: PathSource) -> Self {
        Self {
            tool,
            paths,
            current: RwLock::new(Arc::new(LockTree::empty())),
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    pub fn snapshot(&self) -> Arc<LockTree> {
        match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Lists locks and files, rebuilds the tree and publishes it.
    ///
    /// On any failure the previously published tree stays in place.
    pub async fn refresh(&self) -> Result<RefreshSummary, RefreshError> {
        let _gate = self.refresh_gate.lock().await;
        debug!("Refreshing lock tree");

        let lines = self.tool.list_locks().await.context(ListLocksSnafu)?;
        let parsed = parse_lock_lines(&lines);
        let paths = self.paths.enumerate(&self.tool).await.context(ListPathsSnafu)?;
        let mut root = build_tree(&paths, &parsed.records).context(BuildSnafu)?;
        root.mark_missing_locally(&|path: &str| self.paths.exists_locally(path));

        let summary = RefreshSummary {
            files: root.files().len(),
            locks: parsed.records.len(),
            warnings: if parsed.should_surface_warnings() {
                parsed.warnings.clone()
            } else {
                Vec::new()
            },
        };
        if !parsed.warnings.is_empty() {
            warn!("Skipped {} malformed lock lines", parsed.warnings.len());
        }

        self.publish(LockTree::new(root, parsed.records));
        info!(
            "Lock tree refreshed: {} files, {} locks",
            summary.files, summary.locks
        );

        Ok(summary)
    }

    fn publish(&self, tree: LockTree) {
        let tree = Arc::new(tree);
        match self.current.write() {
            Ok(mut current) => *current = tree,
            Err(poisoned) => *poisoned.into_inner() = tree,
        }
    }
}

#[derive(Debug, Snafu)]
pub enum RefreshError {
    #[snafu(display("Failed to list locks"))]
    ListLocksError { source: ToolInvocationError },
    #[snafu(display("Failed to enumerate repository files"))]
    ListPathsError { source: PathSourceError },
    #[snafu(display("Failed to build the lock tree"))]
    BuildError { source: BuildError },
}
