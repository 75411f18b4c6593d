use crate::tree::TreeNode;

/// Which lock state a file must be in to be shown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ViewMode {
    #[default]
    All,
    /// Files nobody holds a lock on.
    Lockable,
    /// Locked files, optionally restricted to one owner.
    Locked { owner: Option<String> },
}

impl ViewMode {
    fn admits(&self, node: &TreeNode) -> bool {
        match self {
            ViewMode::All => true,
            ViewMode::Lockable => node.lock.is_none(),
            ViewMode::Locked { owner: None } => node.lock.is_some(),
            ViewMode::Locked { owner: Some(owner) } => node.lock_owner() == Some(owner.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFilter {
    pub query: String,
    pub mode: ViewMode,
}

impl ViewFilter {
    pub fn new(query: impl Into<String>, mode: ViewMode) -> Self {
        Self {
            query: query.into(),
            mode,
        }
    }
}

/// Recomputes `visible` for every node from a free-text query.
///
/// Matching is a case-insensitive substring test against a file's name and
/// full path. Directories stay visible when a descendant is visible or their
/// own name matches. Nodes are never removed or reordered.
pub fn apply_filter(root: &mut TreeNode, query: &str) {
    apply_view(root, &ViewFilter::new(query, ViewMode::All));
}

/// Like [`apply_filter`], additionally restricting files by lock state.
///
/// A directory whose name matches only stays visible if it contains at least
/// one file admitted by the mode.
pub fn apply_view(root: &mut TreeNode, filter: &ViewFilter) {
    let needle = filter.query.to_lowercase();
    mark(root, &needle, &filter.mode);
}

struct Marked {
    visible: bool,
    has_admitted_file: bool,
}

fn mark(node: &mut TreeNode, needle: &str, mode: &ViewMode) -> Marked {
    if node.is_file() {
        let admitted = mode.admits(node);
        node.visible = admitted
            && (needle.is_empty()
                || node.name.to_lowercase().contains(needle)
                || node.full_path.to_lowercase().contains(needle));
        return Marked {
            visible: node.visible,
            has_admitted_file: admitted,
        };
    }

    let mut any_child_visible = false;
    let mut has_admitted_file = false;
    for child in &mut node.children {
        let marked = mark(child, needle, mode);
        any_child_visible |= marked.visible;
        has_admitted_file |= marked.has_admitted_file;
    }

    let name_matches = needle.is_empty() || node.name.to_lowercase().contains(needle);
    let mode_allows_empty = *mode == ViewMode::All || has_admitted_file;
    node.visible = any_child_visible || (name_matches && mode_allows_empty);

    Marked {
        visible: node.visible,
        has_admitted_file,
    }
}
