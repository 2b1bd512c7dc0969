//! The immutable tree model with structural sharing and path-level mutation.
//!
//! A [`TreeEntry`] is either *clean* (a known content hash) or *dirty* (an
//! in-memory map from child name to child entry, permitted only on
//! directories). Mutation operators return the receiver untouched when
//! nothing changed, so untouched subtrees persist as single shared hashes
//! across every commit that contains them. Dirty trees are single-owner by
//! construction and are mutated in place; [`TreeEntry::write_subentries`]
//! makes them canonical again, collapsing emptied subtrees into nothing via
//! the empty-tree sentinel.
//!
//! The [`TreeStore`] trait is the seam between this model and the object
//! store: production code passes the gateway, tests pass an in-memory map.

use std::collections::BTreeMap;

use memchr::memchr;

use crate::errors::GitError;
use crate::hash::{ObjectHash, get_hash_kind};
use crate::internal::object::types::EntryMode;

/// The child map of a directory. Key order is irrelevant; serialization
/// applies the git tree sort.
pub type TreeMap = BTreeMap<String, TreeEntry>;

/// Read and write whole trees by hash.
///
/// Implementations must return the empty-tree sentinel when asked to write
/// an empty map.
pub trait TreeStore {
    fn get_tree(&mut self, hash: &ObjectHash) -> Result<TreeMap, GitError>;
    fn write_tree(&mut self, entries: &TreeMap) -> Result<ObjectHash, GitError>;
}

#[derive(Debug, Clone)]
enum EntryState {
    Clean(ObjectHash),
    Dirty(TreeMap),
}

/// One directory/file entry in a tree object.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub mode: EntryMode,
    state: EntryState,
}

/// Two entries are equal iff both are clean and their hashes and modes
/// match. Dirty entries are never equal; materialize first. (`Eq` is
/// deliberately not implemented: a dirty entry does not equal itself.)
impl PartialEq for TreeEntry {
    fn eq(&self, other: &Self) -> bool {
        match (&self.state, &other.state) {
            (EntryState::Clean(a), EntryState::Clean(b)) => self.mode == other.mode && a == b,
            _ => false,
        }
    }
}

fn check_name(name: &str) -> Result<(), GitError> {
    if name.is_empty() || name.contains('/') {
        return Err(GitError::InvalidEntryName(name.to_string()));
    }
    Ok(())
}

impl TreeEntry {
    /// An entry with a known content hash.
    pub fn clean(mode: EntryMode, hash: ObjectHash) -> TreeEntry {
        TreeEntry {
            mode,
            state: EntryState::Clean(hash),
        }
    }

    /// A dirty directory holding the given children.
    pub fn dirty(entries: TreeMap) -> TreeEntry {
        TreeEntry {
            mode: EntryMode::Directory,
            state: EntryState::Dirty(entries),
        }
    }

    /// A dirty directory with no children yet.
    pub fn empty_dir() -> TreeEntry {
        TreeEntry::dirty(TreeMap::new())
    }

    /// The known content hash, absent while dirty.
    pub fn hash(&self) -> Option<ObjectHash> {
        match &self.state {
            EntryState::Clean(hash) => Some(*hash),
            EntryState::Dirty(_) => None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.state, EntryState::Dirty(_))
    }

    pub fn is_directory(&self) -> bool {
        self.mode.is_directory()
    }

    /// Materialize the child map of a directory. Dirty directories return
    /// their in-memory map; clean ones are fetched through the store.
    pub fn get_subentries<S: TreeStore>(&self, store: &mut S) -> Result<TreeMap, GitError> {
        match &self.state {
            _ if !self.is_directory() => Err(GitError::InvalidEntryName(format!(
                "{} entry has no sub-entries",
                self.mode
            ))),
            EntryState::Dirty(entries) => Ok(entries.clone()),
            EntryState::Clean(hash) => store.get_tree(hash),
        }
    }

    /// Walk segment by segment. A missing name or a non-directory hit
    /// mid-walk yields `None`.
    pub fn get_path<S: TreeStore>(
        &self,
        store: &mut S,
        path: &[&str],
    ) -> Result<Option<TreeEntry>, GitError> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(Some(self.clone()));
        };
        if !self.is_directory() {
            return Ok(None);
        }
        let entries = self.get_subentries(store)?;
        match entries.get(*first) {
            None => Ok(None),
            Some(child) if rest.is_empty() => Ok(Some(child.clone())),
            Some(child) => child.get_path(store, rest),
        }
    }

    /// Install `entry` under `name`, returning the resulting directory.
    ///
    /// A dirty receiver is mutated in place and returned (dirty trees are
    /// single-owner); a clean receiver becomes a fresh dirty directory with
    /// the copied child map.
    pub fn add_entry<S: TreeStore>(
        mut self,
        store: &mut S,
        name: &str,
        entry: TreeEntry,
    ) -> Result<TreeEntry, GitError> {
        check_name(name)?;
        match self.state {
            EntryState::Dirty(ref mut entries) => {
                entries.insert(name.to_string(), entry);
                Ok(self)
            }
            EntryState::Clean(_) => {
                let mut entries = self.get_subentries(store)?;
                entries.insert(name.to_string(), entry);
                Ok(TreeEntry::dirty(entries))
            }
        }
    }

    /// Remove `name` if present; an absent name returns the receiver
    /// unchanged, preserving sharing.
    pub fn remove_entry<S: TreeStore>(
        mut self,
        store: &mut S,
        name: &str,
    ) -> Result<TreeEntry, GitError> {
        check_name(name)?;
        match self.state {
            EntryState::Dirty(ref mut entries) => {
                entries.remove(name);
                Ok(self)
            }
            EntryState::Clean(_) => {
                let mut entries = self.get_subentries(store)?;
                if entries.remove(name).is_none() {
                    return Ok(self);
                }
                Ok(TreeEntry::dirty(entries))
            }
        }
    }

    /// Install `entry` at a deeper path, creating empty intermediate
    /// directories as needed. A length-1 path degenerates to
    /// [`TreeEntry::add_entry`].
    pub fn add_path<S: TreeStore>(
        mut self,
        store: &mut S,
        path: &[&str],
        entry: TreeEntry,
    ) -> Result<TreeEntry, GitError> {
        let Some((first, rest)) = path.split_first() else {
            return Err(GitError::InvalidEntryName("empty path".to_string()));
        };
        if rest.is_empty() {
            return self.add_entry(store, first, entry);
        }
        check_name(first)?;

        match self.state {
            EntryState::Dirty(ref mut entries) => {
                let child = entries
                    .remove(*first)
                    .unwrap_or_else(TreeEntry::empty_dir);
                let child = child.add_path(store, rest, entry)?;
                entries.insert(first.to_string(), child);
                Ok(self)
            }
            EntryState::Clean(_) => {
                let mut entries = self.get_subentries(store)?;
                let child = entries
                    .remove(*first)
                    .unwrap_or_else(TreeEntry::empty_dir);
                let child = child.add_path(store, rest, entry)?;
                entries.insert(first.to_string(), child);
                Ok(TreeEntry::dirty(entries))
            }
        }
    }

    /// Remove the entry at a deeper path; a nonexistent path returns the
    /// receiver unchanged. Subtrees emptied by the removal are elided by
    /// the next [`TreeEntry::write_subentries`].
    pub fn remove_path<S: TreeStore>(
        mut self,
        store: &mut S,
        path: &[&str],
    ) -> Result<TreeEntry, GitError> {
        let Some((first, rest)) = path.split_first() else {
            return Err(GitError::InvalidEntryName("empty path".to_string()));
        };
        if rest.is_empty() {
            return self.remove_entry(store, first);
        }
        check_name(first)?;

        match self.state {
            EntryState::Dirty(ref mut entries) => {
                let Some(child) = entries.remove(*first) else {
                    return Ok(self);
                };
                if !child.is_directory() {
                    entries.insert(first.to_string(), child);
                    return Ok(self);
                }
                let child = child.remove_path(store, rest)?;
                entries.insert(first.to_string(), child);
                Ok(self)
            }
            EntryState::Clean(_) => {
                let entries = self.get_subentries(store)?;
                let Some(child) = entries.get(*first) else {
                    return Ok(self);
                };
                if !child.is_directory() {
                    return Ok(self);
                }
                let old_hash = child.hash();
                let new_child = child.clone().remove_path(store, rest)?;
                if new_child.hash().is_some() && new_child.hash() == old_hash {
                    // Nothing below changed; keep sharing the old tree.
                    return Ok(self);
                }
                let mut entries = entries;
                entries.insert(first.to_string(), new_child);
                Ok(TreeEntry::dirty(entries))
            }
        }
    }

    /// Canonicalize a dirty directory: recursively write every dirty child
    /// depth first, prune child directories that collapsed to the
    /// empty-tree sentinel, write the receiver through the store and stamp
    /// it with its now-known hash. Idempotent for clean entries.
    pub fn write_subentries<S: TreeStore>(
        &mut self,
        store: &mut S,
    ) -> Result<ObjectHash, GitError> {
        match &mut self.state {
            EntryState::Clean(hash) => Ok(*hash),
            EntryState::Dirty(entries) => {
                let mut emptied = Vec::new();
                for (name, child) in entries.iter_mut() {
                    if child.is_directory() {
                        let child_hash = child.write_subentries(store)?;
                        if child_hash == ObjectHash::empty_tree(child_hash.kind()) {
                            emptied.push(name.clone());
                        }
                    }
                }
                for name in &emptied {
                    entries.remove(name);
                }
                let hash = store.write_tree(entries)?;
                self.state = EntryState::Clean(hash);
                Ok(hash)
            }
        }
    }
}

/// The git tree sort key: directories sort as if their name had a trailing
/// slash.
fn tree_sort_key(name: &str, mode: EntryMode) -> Vec<u8> {
    let mut key = name.as_bytes().to_vec();
    if mode.is_directory() {
        key.push(b'/');
    }
    key
}

/// Entries in git tree sort order.
pub fn sorted_entries(entries: &TreeMap) -> Vec<(&String, &TreeEntry)> {
    let mut sorted: Vec<_> = entries.iter().collect();
    sorted.sort_by_key(|(name, entry)| tree_sort_key(name, entry.mode));
    sorted
}

/// Parse a raw tree payload: `<mode> <name>\0<binary-hash>` records, hash
/// width per the current hash kind.
pub fn parse_tree_payload(data: &[u8]) -> Result<TreeMap, GitError> {
    let hash_size = get_hash_kind().size();
    let mut entries = TreeMap::new();
    let mut rest = data;

    while !rest.is_empty() {
        let space = memchr(b' ', rest).ok_or_else(|| {
            GitError::InvalidTreeObject("entry without mode/name separator".to_string())
        })?;
        let mode = EntryMode::from_bytes(&rest[..space])?;
        rest = &rest[space + 1..];

        let nul = memchr(b'\0', rest)
            .ok_or_else(|| GitError::InvalidTreeObject("entry without terminator".to_string()))?;
        let name = String::from_utf8_lossy(&rest[..nul]).to_string();
        check_name(&name).map_err(|_| GitError::InvalidTreeItem(name.clone()))?;
        rest = &rest[nul + 1..];

        if rest.len() < hash_size {
            return Err(GitError::InvalidTreeObject(format!(
                "truncated hash for entry `{name}`"
            )));
        }
        let hash = ObjectHash::from_bytes(&rest[..hash_size])?;
        rest = &rest[hash_size..];

        entries.insert(name, TreeEntry::clean(mode, hash));
    }

    Ok(entries)
}

/// Serialize to the raw tree object payload. All entries must be clean.
pub fn to_tree_data(entries: &TreeMap) -> Result<Vec<u8>, GitError> {
    let mut data = Vec::new();
    for (name, entry) in sorted_entries(entries) {
        let hash = entry
            .hash()
            .ok_or_else(|| GitError::InvalidTreeItem(format!("dirty entry `{name}`")))?;
        data.extend(entry.mode.as_str().as_bytes());
        data.push(b' ');
        data.extend(name.as_bytes());
        data.push(b'\0');
        data.extend(hash.as_ref());
    }
    Ok(data)
}

/// Serialize to one mktree `-z --batch` request: NUL-delimited
/// `<mode> <type> <hex-hash>\t<name>` records plus the terminating blank
/// record. All entries must be clean.
pub fn to_mktree_data(entries: &TreeMap) -> Result<Vec<u8>, GitError> {
    let mut data = Vec::new();
    for (name, entry) in sorted_entries(entries) {
        let hash = entry
            .hash()
            .ok_or_else(|| GitError::InvalidTreeItem(format!("dirty entry `{name}`")))?;
        data.extend(entry.mode.as_str().as_bytes());
        data.push(b' ');
        data.extend(entry.mode.object_type().to_string().as_bytes());
        data.push(b' ');
        data.extend(hash.to_string().as_bytes());
        data.push(b'\t');
        data.extend(name.as_bytes());
        data.push(b'\0');
    }
    data.push(b'\0');
    Ok(data)
}
