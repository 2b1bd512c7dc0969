//! The cached path-regex tree transformer.
//!
//! Applies an ordered list of (path-pattern, action) rules to every path
//! reachable under a root tree, based only on the existing contents, never
//! on which commit points at the tree. Results are memoized by
//! `(optional prefix, input tree hash)`, so a subtree shared by thousands of
//! commits is rewritten exactly once.
//!
//! Paths are matched with a leading `/`; a pattern ending in `/` acts on a
//! directory (before descent), anything else on a leaf entry. Patterns are
//! anchored on both ends. The `regex` engine has no partial-match support,
//! so the rule set is carried whole into every subtree rather than pruned
//! against the current prefix; the memoization makes this affordable.

use std::collections::HashMap;

use regex::Regex;

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::internal::object::tree::{TreeEntry, TreeMap, TreeStore};
use crate::internal::object::types::EntryMode;

/// An action invoked with the store, the full path and the current entry.
/// Returning `None` deletes the entry and short-circuits later rules.
pub type PathAction<S> =
    Box<dyn FnMut(&mut S, &str, TreeEntry) -> Result<Option<TreeEntry>, GitError>>;

/// One (path-pattern, action) rule. Rules run in declaration order; earlier
/// rules see the original entry, later rules the output of earlier ones.
pub struct PathRule<S> {
    pattern: Regex,
    raw: String,
    /// `None` is the delete action.
    action: Option<PathAction<S>>,
}

impl<S> PathRule<S> {
    pub fn new(pattern: &str, action: PathAction<S>) -> Result<PathRule<S>, GitError> {
        Ok(PathRule {
            pattern: compile(pattern)?,
            raw: pattern.to_string(),
            action: Some(action),
        })
    }

    /// A rule that deletes every matching entry.
    pub fn delete(pattern: &str) -> Result<PathRule<S>, GitError> {
        Ok(PathRule {
            pattern: compile(pattern)?,
            raw: pattern.to_string(),
            action: None,
        })
    }

    /// A pattern anchored somewhere other than an unconditional wildcard
    /// makes the rewrite position-dependent.
    fn is_wildcard_prefixed(&self) -> bool {
        self.raw.starts_with(".*")
    }

    fn matches(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }
}

fn compile(pattern: &str) -> Result<Regex, GitError> {
    Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| GitError::InvalidArgument(format!("bad path pattern `{pattern}`: {e}")))
}

/// Counters surfaced on completion for observability; the driver displays
/// them, the library never prints.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransformStats {
    pub tree_cache_hits: u64,
    pub trees_retrieved: u64,
    pub trees_written: u64,
    pub actions_invoked: u64,
}

/// Rewrites trees under a rule set with aggressive memoization.
pub struct TreeTransformer<S> {
    rules: Vec<PathRule<S>>,
    prefix_sensitive: bool,
    /// (prefix when sensitive, input tree hash) -> canonical output entry,
    /// `None` meaning the subtree was deleted or emptied.
    cache: HashMap<(Option<String>, ObjectHash), Option<(EntryMode, ObjectHash)>>,
    stats: TransformStats,
}

impl<S: TreeStore> TreeTransformer<S> {
    /// `prefix_sensitive` forces position-dependent caching even when every
    /// pattern is wildcard-prefixed; actions that inspect their path
    /// argument need it.
    pub fn new(rules: Vec<PathRule<S>>, prefix_sensitive: bool) -> TreeTransformer<S> {
        let matchers_sensitive = rules.iter().any(|rule| !rule.is_wildcard_prefixed());
        TreeTransformer {
            rules,
            prefix_sensitive: prefix_sensitive || matchers_sensitive,
            cache: HashMap::new(),
            stats: TransformStats::default(),
        }
    }

    pub fn stats(&self) -> TransformStats {
        self.stats
    }

    /// Rewrite the tree at `root`, returning the new root hash. An emptied
    /// root collapses to the empty-tree sentinel.
    pub fn transform(&mut self, store: &mut S, root: &ObjectHash) -> Result<ObjectHash, GitError> {
        match self.transform_tree(store, "/", root)? {
            None => Ok(ObjectHash::empty_tree(root.kind())),
            Some(entry) if entry.is_directory() => entry
                .hash()
                .ok_or_else(|| GitError::InvalidTreeItem("uncanonicalized root".to_string())),
            Some(_) => Err(GitError::InvalidTreeItem(
                "root tree replaced by a non-directory".to_string(),
            )),
        }
    }

    fn apply_rule(
        &mut self,
        store: &mut S,
        index: usize,
        path: &str,
        entry: TreeEntry,
    ) -> Result<Option<TreeEntry>, GitError> {
        match self.rules[index].action {
            None => Ok(None),
            Some(ref mut action) => {
                self.stats.actions_invoked += 1;
                action(store, path, entry)
            }
        }
    }

    /// Rewrite one directory identified by `old_hash`, with `prefix` its
    /// full path including the trailing slash.
    fn transform_tree(
        &mut self,
        store: &mut S,
        prefix: &str,
        old_hash: &ObjectHash,
    ) -> Result<Option<TreeEntry>, GitError> {
        let cache_prefix = self.prefix_sensitive.then(|| prefix.to_string());
        if let Some(cached) = self.cache.get(&(cache_prefix.clone(), *old_hash)) {
            self.stats.tree_cache_hits += 1;
            return Ok(cached.map(|(mode, hash)| TreeEntry::clean(mode, hash)));
        }

        let mut current = Some(TreeEntry::clean(EntryMode::Directory, *old_hash));

        // Rules whose pattern fully matches this directory's own path run
        // before descent.
        for index in 0..self.rules.len() {
            if !self.rules[index].matches(prefix) {
                continue;
            }
            let Some(entry) = current.take() else { break };
            current = self.apply_rule(store, index, prefix, entry)?;
        }

        if let Some(entry) = current.take() {
            if entry.is_directory() && !self.rules.is_empty() {
                current = self.transform_entries(store, prefix, entry)?;
            } else {
                current = Some(entry);
            }
        }

        // Canonicalize before caching; an emptied directory collapses to
        // nothing at all.
        let cached = match current.as_mut() {
            None => None,
            Some(entry) => {
                if entry.is_dirty() {
                    self.stats.trees_written += 1;
                }
                let hash = entry.write_subentries(store)?;
                if entry.is_directory() && hash == ObjectHash::empty_tree(hash.kind()) {
                    None
                } else {
                    Some((entry.mode, hash))
                }
            }
        };
        if cached.is_none() {
            current = None;
        }
        self.cache.insert((cache_prefix, *old_hash), cached);
        Ok(current)
    }

    /// Rewrite the children of a surviving directory: recurse into
    /// subdirectories, run matching rules on leaves, and keep the receiver
    /// itself when nothing below changed.
    fn transform_entries(
        &mut self,
        store: &mut S,
        prefix: &str,
        entry: TreeEntry,
    ) -> Result<Option<TreeEntry>, GitError> {
        let was_clean = !entry.is_dirty();
        let old_entries = entry.get_subentries(store)?;
        if was_clean {
            self.stats.trees_retrieved += 1;
        }

        let mut new_entries = TreeMap::new();
        let mut changed = false;

        for (name, child) in &old_entries {
            if child.is_directory() {
                let child_prefix = format!("{prefix}{name}/");
                let child_hash = match child.hash() {
                    Some(hash) => hash,
                    // A dirty child can only come from an upstream action's
                    // output; canonicalize so memoization applies to it.
                    None => child.clone().write_subentries(store)?,
                };
                match self.transform_tree(store, &child_prefix, &child_hash)? {
                    None => {
                        changed = true;
                    }
                    Some(new_child) => {
                        if new_child.hash() != Some(child_hash) || new_child.mode != child.mode {
                            changed = true;
                        }
                        new_entries.insert(name.clone(), new_child);
                    }
                }
            } else {
                let full_path = format!("{prefix}{name}");
                let mut cur = Some(child.clone());
                for index in 0..self.rules.len() {
                    if !self.rules[index].matches(&full_path) {
                        continue;
                    }
                    let Some(entry) = cur.take() else { break };
                    cur = self.apply_rule(store, index, &full_path, entry)?;
                }
                match cur {
                    None => {
                        changed = true;
                    }
                    Some(new_child) => {
                        if new_child != *child {
                            changed = true;
                        }
                        new_entries.insert(name.clone(), new_child);
                    }
                }
            }
        }

        if !changed {
            return Ok(Some(entry));
        }
        if new_entries.is_empty() {
            return Ok(None);
        }
        Ok(Some(TreeEntry::dirty(new_entries)))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use std::str::FromStr;

    use super::*;
    use crate::hash::{HashKind, set_hash_kind_for_test};
    use crate::internal::object::tree::to_tree_data;
    use crate::internal::object::types::ObjectType;

    /// In-memory store with round-trip counters, hashing trees exactly as
    /// git does.
    #[derive(Default)]
    struct MemStore {
        trees: HashMap<ObjectHash, TreeMap>,
        gets: Cell<u64>,
        writes: Cell<u64>,
    }

    impl TreeStore for MemStore {
        fn get_tree(&mut self, hash: &ObjectHash) -> Result<TreeMap, GitError> {
            self.gets.set(self.gets.get() + 1);
            self.trees
                .get(hash)
                .cloned()
                .ok_or_else(|| GitError::ObjectMissing(hash.to_string()))
        }

        fn write_tree(&mut self, entries: &TreeMap) -> Result<ObjectHash, GitError> {
            self.writes.set(self.writes.get() + 1);
            let hash = ObjectHash::from_type_and_data(ObjectType::Tree, &to_tree_data(entries)?);
            self.trees.insert(hash, entries.clone());
            Ok(hash)
        }
    }

    const BLOB: &str = "ce013625030ba8dba906f756967f9e9ca394464a";

    fn blob_entry() -> TreeEntry {
        TreeEntry::clean(EntryMode::Regular, ObjectHash::from_str(BLOB).unwrap())
    }

    /// Build a tree from (path, entry) pairs and return its hash.
    fn build_tree(store: &mut MemStore, paths: &[&str]) -> ObjectHash {
        let mut root = TreeEntry::empty_dir();
        for path in paths {
            let segs: Vec<&str> = path.split('/').collect();
            root = root.add_path(store, &segs, blob_entry()).unwrap();
        }
        root.write_subentries(store).unwrap()
    }

    #[test]
    fn test_delete_collapses_intermediate_dirs() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let mut store = MemStore::default();
        let root = build_tree(&mut store, &["a/b/c.bin", "keep.txt"]);

        let mut transformer =
            TreeTransformer::new(vec![PathRule::delete(r".*/c\.bin").unwrap()], false);
        let new_root = transformer.transform(&mut store, &root).unwrap();

        let expected = build_tree(&mut store, &["keep.txt"]);
        assert_eq!(new_root, expected);
    }

    #[test]
    fn test_everything_deleted_yields_sentinel() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let mut store = MemStore::default();
        let root = build_tree(&mut store, &["x.zip", "a/y.zip"]);

        let mut transformer =
            TreeTransformer::new(vec![PathRule::delete(r".*\.zip").unwrap()], false);
        let new_root = transformer.transform(&mut store, &root).unwrap();
        assert_eq!(new_root, ObjectHash::empty_tree(HashKind::Sha1));
    }

    #[test]
    fn test_untouched_tree_returned_unchanged() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let mut store = MemStore::default();
        let root = build_tree(&mut store, &["a/b.txt", "c.txt"]);

        let writes_before = store.writes.get();
        let mut transformer =
            TreeTransformer::new(vec![PathRule::delete(r".*\.zip").unwrap()], false);
        let new_root = transformer.transform(&mut store, &root).unwrap();
        assert_eq!(new_root, root);
        assert_eq!(store.writes.get(), writes_before);
    }

    /// Shared subtrees are rewritten once: the second encounter is a cache
    /// hit and no further store round-trips happen.
    #[test]
    fn test_memoization_across_roots() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let mut store = MemStore::default();
        // Two roots sharing the identical `shared/` subtree.
        let root1 = build_tree(&mut store, &["shared/data.zip", "shared/keep.txt", "one.txt"]);
        let root2 = build_tree(&mut store, &["shared/data.zip", "shared/keep.txt", "two.txt"]);

        let mut transformer =
            TreeTransformer::new(vec![PathRule::delete(r".*\.zip").unwrap()], false);
        let out1 = transformer.transform(&mut store, &root1).unwrap();

        let gets_before = store.gets.get();
        let writes_before = store.writes.get();
        let out2 = transformer.transform(&mut store, &root2).unwrap();
        assert_ne!(out1, out2);

        // Only the second root itself was re-read and re-written; the
        // shared subtree came from the transformer cache.
        assert_eq!(store.gets.get() - gets_before, 1);
        assert_eq!(store.writes.get() - writes_before, 1);
        assert!(transformer.stats().tree_cache_hits >= 1);

        // Same input a third time: pure cache, zero round-trips.
        let gets_before = store.gets.get();
        let writes_before = store.writes.get();
        let out3 = transformer.transform(&mut store, &root2).unwrap();
        assert_eq!(out2, out3);
        assert_eq!(store.gets.get(), gets_before);
        assert_eq!(store.writes.get(), writes_before);
    }

    /// The action runs once per matching blob, not once per referencing
    /// commit.
    #[test]
    fn test_action_invocations_counted_once_per_blob() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let mut store = MemStore::default();
        let root1 = build_tree(&mut store, &["shared/a.cfg", "one.txt"]);
        let root2 = build_tree(&mut store, &["shared/a.cfg", "two.txt"]);

        let calls = Rc::new(Cell::new(0u32));
        let seen = calls.clone();
        let action: PathAction<MemStore> = Box::new(move |_store, path, entry| {
            assert_eq!(path, "/shared/a.cfg");
            seen.set(seen.get() + 1);
            Ok(Some(entry))
        });

        let mut transformer =
            TreeTransformer::new(vec![PathRule::new(r".*\.cfg", action).unwrap()], false);
        transformer.transform(&mut store, &root1).unwrap();
        transformer.transform(&mut store, &root2).unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(transformer.stats().actions_invoked, 1);
    }

    /// Rules run in declaration order; deletion short-circuits later rules.
    #[test]
    fn test_rule_order_and_delete_short_circuit() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let mut store = MemStore::default();
        let root = build_tree(&mut store, &["doc.txt"]);

        let later = Rc::new(Cell::new(0u32));
        let seen = later.clone();
        let action: PathAction<MemStore> = Box::new(move |_store, _path, entry| {
            seen.set(seen.get() + 1);
            Ok(Some(entry))
        });

        let mut transformer = TreeTransformer::new(
            vec![
                PathRule::delete(r".*\.txt").unwrap(),
                PathRule::new(r".*\.txt", action).unwrap(),
            ],
            false,
        );
        let new_root = transformer.transform(&mut store, &root).unwrap();
        assert_eq!(new_root, ObjectHash::empty_tree(HashKind::Sha1));
        assert_eq!(later.get(), 0);
    }

    /// A directory rule (trailing slash) removes the whole subtree before
    /// descent.
    #[test]
    fn test_directory_rule_matches_prefix() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let mut store = MemStore::default();
        let root = build_tree(&mut store, &["lldb/llvm.zip", "llvm/keep.txt"]);

        let mut transformer =
            TreeTransformer::new(vec![PathRule::delete(r"/lldb/").unwrap()], true);
        let new_root = transformer.transform(&mut store, &root).unwrap();

        let expected = build_tree(&mut store, &["llvm/keep.txt"]);
        assert_eq!(new_root, expected);
    }

    /// Prefix-sensitive rule sets key the cache by position, so the same
    /// subtree hash at different paths is transformed independently.
    #[test]
    fn test_prefix_sensitive_cache_keys() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let mut store = MemStore::default();
        // The same single-file subtree appears under two names.
        let root = build_tree(&mut store, &["first/data.bin", "second/data.bin"]);

        let mut transformer =
            TreeTransformer::new(vec![PathRule::delete(r"/first/data\.bin").unwrap()], false);
        assert!(transformer.prefix_sensitive);
        let new_root = transformer.transform(&mut store, &root).unwrap();

        let expected = build_tree(&mut store, &["second/data.bin"]);
        assert_eq!(new_root, expected);
    }

    #[test]
    fn test_bad_pattern_is_error() {
        assert!(PathRule::<MemStore>::delete("(unclosed").is_err());
    }
}
