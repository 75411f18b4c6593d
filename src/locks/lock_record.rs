use std::collections::BTreeSet;

/// A single lock as reported by `git lfs locks`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockRecord {
    pub path: String,
    pub owner: String,
    pub lock_id: String,
}

impl LockRecord {
    pub fn new(path: impl AsRef<str>, owner: impl Into<String>, lock_id: impl Into<String>) -> Self {
        Self {
            path: normalize_repo_path(path.as_ref()),
            owner: owner.into(),
            lock_id: lock_id.into(),
        }
    }

    pub fn is_owned_by(&self, user: &str) -> bool {
        self.owner == user
    }
}

/// Returns every distinct lock owner, sorted by name.
pub fn owners(records: &[LockRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| record.owner.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Brings a repository-relative path into the `dir/sub/file.ext` form used
/// as the identity of lock records and tree nodes.
pub fn normalize_repo_path(path: &str) -> String {
    let unquoted = path.trim().replace('"', "").replace('\\', "/");
    unquoted
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Content/Maps/Level.umap", "Content/Maps/Level.umap")]
    #[case("  Content/Maps/Level.umap  ", "Content/Maps/Level.umap")]
    #[case("\"Content/My Map.umap\"", "Content/My Map.umap")]
    #[case("Content\\Maps\\Level.umap", "Content/Maps/Level.umap")]
    #[case("./Content//Maps/", "Content/Maps")]
    #[case("/", "")]
    fn normalizes_repository_paths(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_repo_path(raw), expected);
    }

    #[test]
    fn owners_are_unique_and_sorted() {
        let records = vec![
            LockRecord::new("a.uasset", "mallory", "3"),
            LockRecord::new("b.uasset", "alice", "1"),
            LockRecord::new("c.uasset", "mallory", "2"),
        ];

        assert_eq!(owners(&records), vec!["alice", "mallory"]);
    }

    #[test]
    fn record_path_is_normalized_on_construction() {
        let record = LockRecord::new("Content\\Hero.uasset", "alice", "7");
        assert_eq!(record.path, "Content/Hero.uasset");
        assert!(record.is_owned_by("alice"));
        assert!(!record.is_owned_by("bob"));
    }
}
