use colored::Colorize;

use crate::tree::TreeNode;

const BRANCH: &str = "├── ";
const LAST_BRANCH: &str = "└── ";
const PIPE: &str = "│   ";
const GAP: &str = "    ";

/// Projects a lock tree into indented text lines, skipping hidden nodes.
///
/// Directories nested deeper than the expansion depth are printed collapsed
/// with the number of visible files they hold.
#[derive(Debug, Clone)]
pub struct TreeRenderer<'a> {
    expansion_depth: usize,
    current_user: Option<&'a str>,
}

impl<'a> TreeRenderer<'a> {
    pub fn new(expansion_depth: usize) -> Self {
        Self {
            expansion_depth,
            current_user: None,
        }
    }

    /// Locks held by `user` are highlighted differently from other users' locks.
    pub fn highlighting(mut self, user: &'a str) -> Self {
        self.current_user = Some(user);
        self
    }

    pub fn render(&self, root: &TreeNode) -> Vec<String> {
        let mut lines = Vec::new();
        self.render_children(root, "", 0, &mut lines);
        lines
    }

    fn render_children(&self, node: &TreeNode, prefix: &str, depth: usize, lines: &mut Vec<String>) {
        let visible: Vec<&TreeNode> = node.children.iter().filter(|c| c.visible).collect();
        let count = visible.len();

        for (index, child) in visible.into_iter().enumerate() {
            let is_last = index + 1 == count;
            let connector = if is_last { LAST_BRANCH } else { BRANCH };
            let expanded = depth < self.expansion_depth;

            lines.push(format!("{prefix}{connector}{}", self.label(child, expanded)));

            if child.is_directory() && expanded {
                let child_prefix = format!("{prefix}{}", if is_last { GAP } else { PIPE });
                self.render_children(child, &child_prefix, depth + 1, lines);
            }
        }
    }

    fn label(&self, node: &TreeNode, expanded: bool) -> String {
        if node.is_directory() {
            let name = format!("{}/", node.name).blue().bold().to_string();
            if expanded {
                return name;
            }
            let files = node.visible_file_count();
            let noun = if files == 1 { "file" } else { "files" };
            return format!("{name} {}", format!("({files} {noun})").dimmed());
        }

        let mut label = node.name.clone();
        if let Some(lock) = &node.lock {
            let owner = if self.current_user.is_some_and(|user| lock.is_owned_by(user)) {
                lock.owner.green()
            } else {
                lock.owner.yellow()
            };
            label.push_str(&format!("  [{owner}, ID {}]", lock.lock_id));
        }
        if node.missing_locally {
            label.push_str(&format!(" {}", "(missing locally)".red()));
        } else if node.synthetic {
            label.push_str(&format!(" {}", "(not listed)".dimmed()));
        }
        label
    }
}
