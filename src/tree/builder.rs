use std::collections::HashMap;

use snafu::Snafu;
use tracing::{debug, warn};

use crate::locks::{LockRecord, normalize_repo_path};
use crate::tree::{NodeKind, TreeNode};

const ROOT: usize = 0;

/// Node under construction. Children are indexed by name so that every
/// segment lookup is a hash lookup rather than a scan of its siblings.
#[derive(Debug)]
struct DraftNode {
    name: String,
    full_path: String,
    kind: NodeKind,
    lock: Option<LockRecord>,
    synthetic: bool,
    children: HashMap<String, usize>,
}

#[derive(Debug)]
struct TreeDraft {
    nodes: Vec<DraftNode>,
}

impl TreeDraft {
    fn new() -> Self {
        Self {
            nodes: vec![DraftNode {
                name: String::new(),
                full_path: String::new(),
                kind: NodeKind::Directory,
                lock: None,
                synthetic: false,
                children: HashMap::new(),
            }],
        }
    }

    /// Inserts `path` as a file, creating intermediate directories on the way.
    /// Returns the index of the file node.
    fn insert_file(&mut self, path: &str, synthetic: bool) -> Result<usize, BuildError> {
        let segments: Vec<&str> = path.split('/').collect();
        let mut current = ROOT;

        for (depth, segment) in segments.iter().enumerate() {
            let is_last = depth + 1 == segments.len();
            let kind = if is_last {
                NodeKind::File
            } else {
                NodeKind::Directory
            };

            current = match self.nodes[current].children.get(*segment) {
                Some(&existing) => {
                    if self.nodes[existing].kind != kind {
                        return PathConflictSnafu {
                            path: path.to_string(),
                            existing: self.nodes[existing].full_path.clone(),
                            existing_kind: self.nodes[existing].kind,
                        }
                        .fail();
                    }
                    existing
                }
                None => {
                    let full_path = segments[..=depth].join("/");
                    let index = self.nodes.len();
                    self.nodes.push(DraftNode {
                        name: segment.to_string(),
                        full_path,
                        kind,
                        lock: None,
                        synthetic: synthetic && is_last,
                        children: HashMap::new(),
                    });
                    self.nodes[current]
                        .children
                        .insert(segment.to_string(), index);
                    index
                }
            };
        }

        Ok(current)
    }

    fn into_tree(mut self) -> TreeNode {
        self.take_node(ROOT)
    }

    fn take_node(&mut self, index: usize) -> TreeNode {
        let draft = &mut self.nodes[index];
        let child_indices: Vec<usize> = draft.children.drain().map(|(_, child)| child).collect();
        let name = std::mem::take(&mut draft.name);
        let full_path = std::mem::take(&mut draft.full_path);
        let mut node = match draft.kind {
            NodeKind::Directory => TreeNode::directory(name, full_path),
            NodeKind::File => TreeNode::file(name, full_path),
        };
        node.lock = draft.lock.take();
        node.synthetic = draft.synthetic;

        node.children = child_indices
            .into_iter()
            .map(|child| self.take_node(child))
            .collect();
        node.children.sort_by(|a, b| {
            (a.kind != NodeKind::Directory, &a.name).cmp(&(b.kind != NodeKind::Directory, &b.name))
        });

        node
    }
}

/// Builds the lock tree from the enumerated repository files and the current
/// lock records.
///
/// Children are ordered directories first, then by name. A lock whose path is
/// not among `all_paths` still gets a (synthetic) file node. A path that uses
/// a file as a directory, or the other way around, aborts the whole build.
pub fn build_tree<I, S>(all_paths: I, records: &[LockRecord]) -> Result<TreeNode, BuildError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut draft = TreeDraft::new();
    let mut files: HashMap<String, usize> = HashMap::new();

    for raw_path in all_paths {
        let path = normalize_repo_path(raw_path.as_ref());
        if path.is_empty() {
            warn!("Skipping empty path '{}'", raw_path.as_ref());
            continue;
        }
        if files.contains_key(&path) {
            continue;
        }
        let index = draft.insert_file(&path, false)?;
        files.insert(path, index);
    }

    let mut orphaned = 0usize;
    for record in records {
        let path = normalize_repo_path(&record.path);
        if path.is_empty() {
            warn!("Skipping lock {} with an empty path", record.lock_id);
            continue;
        }

        let index = match files.get(&path) {
            Some(&index) => index,
            None => {
                orphaned += 1;
                let index = draft.insert_file(&path, true)?;
                files.insert(path.clone(), index);
                index
            }
        };

        let node = &mut draft.nodes[index];
        match &node.lock {
            Some(existing) => warn!(
                "Ignoring lock {} on '{}': already locked by {} (lock {})",
                record.lock_id, path, existing.owner, existing.lock_id
            ),
            None => {
                node.lock = Some(LockRecord {
                    path,
                    ..record.clone()
                });
            }
        }
    }

    debug!(
        "Built lock tree from {} files and {} locks ({} orphaned)",
        files.len() - orphaned,
        records.len(),
        orphaned
    );

    Ok(draft.into_tree())
}

#[derive(Debug, Snafu)]
pub enum BuildError {
    #[snafu(display(
        "Path '{}' conflicts with existing {} '{}'",
        path,
        existing_kind,
        existing
    ))]
    PathConflict {
        path: String,
        existing: String,
        existing_kind: NodeKind,
    },
}
