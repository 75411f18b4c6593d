use derive_more::Display;

use crate::locks::LockRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum NodeKind {
    #[display("directory")]
    Directory,
    #[display("file")]
    File,
}

/// One entry of the lock tree.
///
/// Directory nodes never carry a lock. `synthetic` marks file nodes that only
/// exist because a lock names a path missing from the enumerated files;
/// `missing_locally` is only ever set on those, when the working copy has no
/// such file either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub full_path: String,
    pub kind: NodeKind,
    pub lock: Option<LockRecord>,
    pub children: Vec<TreeNode>,
    pub visible: bool,
    pub synthetic: bool,
    pub missing_locally: bool,
}

impl TreeNode {
    pub fn root() -> Self {
        Self::directory(String::new(), String::new())
    }

    pub fn directory(name: String, full_path: String) -> Self {
        Self {
            name,
            full_path,
            kind: NodeKind::Directory,
            lock: None,
            children: Vec::new(),
            visible: true,
            synthetic: false,
            missing_locally: false,
        }
    }

    pub fn file(name: String, full_path: String) -> Self {
        Self {
            kind: NodeKind::File,
            ..Self::directory(name, full_path)
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn lock_owner(&self) -> Option<&str> {
        self.lock.as_ref().map(|lock| lock.owner.as_str())
    }

    /// Flags every synthetic file node for which `exists` reports no file in
    /// the working copy.
    pub fn mark_missing_locally<F: Fn(&str) -> bool>(&mut self, exists: &F) {
        if self.synthetic {
            self.missing_locally = !exists(&self.full_path);
        }
        for child in &mut self.children {
            child.mark_missing_locally(exists);
        }
    }

    /// Looks a node up by its repository-relative path.
    #[cfg(test)]
    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, segment| {
                node.children.iter().find(|child| child.name == segment)
            })
    }

    #[cfg(test)]
    pub fn child(&self, name: &str) -> Option<&TreeNode> {
        self.children.iter().find(|child| child.name == name)
    }

    /// All file nodes below this one, depth first in display order.
    pub fn files(&self) -> Vec<&TreeNode> {
        let mut files = Vec::new();
        self.collect_files(&mut files);
        files
    }

    fn collect_files<'a>(&'a self, files: &mut Vec<&'a TreeNode>) {
        if self.is_file() {
            files.push(self);
        }
        for child in &self.children {
            child.collect_files(files);
        }
    }

    #[cfg(test)]
    pub fn locked_files(&self) -> Vec<&TreeNode> {
        self.files()
            .into_iter()
            .filter(|node| node.lock.is_some())
            .collect()
    }

    /// Number of visible file nodes in this subtree.
    pub fn visible_file_count(&self) -> usize {
        if !self.visible {
            return 0;
        }
        match self.kind {
            NodeKind::File => 1,
            NodeKind::Directory => self.children.iter().map(Self::visible_file_count).sum(),
        }
    }

    #[cfg(test)]
    pub fn all_visible(&self) -> bool {
        self.visible && self.children.iter().all(Self::all_visible)
    }
}
