//! The batched object-store gateway: a synchronous facade over three
//! long-running git child processes, multiplexed so a whole-history rewrite
//! never pays per-object process startup.
//!
//! The three channels are pipelined but sequential at the caller: requests
//! on one channel never overlap, so no locking is needed. The gateway owns
//! three write-through caches (hash to tree, hash-or-mark to commit, and the
//! tree cache doubles for freshly written trees): a cache hit short-circuits
//! the child request, and every write pre-populates its cache so an
//! immediate re-read succeeds before the child has acknowledged anything.

pub mod catfile;
pub mod fastimport;
pub mod mktree;

use std::collections::HashMap;
use std::path::Path;

use crate::errors::GitError;
use crate::hash::{Mark, ObjectHash, ObjectRef, get_hash_kind};
use crate::internal::object::ObjectTrait;
use crate::internal::object::commit::Commit;
use crate::internal::object::tag::Tag;
use crate::internal::object::tree::{TreeMap, TreeStore, parse_tree_payload};
use crate::internal::object::types::ObjectType;

use catfile::CatFileChannel;
use fastimport::FastImportChannel;
use mktree::MktreeChannel;

/// Owns the three child-process channels and the process-wide caches.
///
/// Commit and tag records are handed out as copies so callers may mutate
/// them freely; tree maps are cached by hash and cloned on read.
pub struct FilterGateway {
    catfile: CatFileChannel,
    mktree: MktreeChannel,
    import: FastImportChannel,
    cached_trees: HashMap<ObjectHash, TreeMap>,
    cached_commits: HashMap<ObjectRef, Commit>,
}

impl FilterGateway {
    /// Spawn the three channels against the repository at `repo`.
    pub fn open(repo: &Path) -> Result<FilterGateway, GitError> {
        Ok(FilterGateway {
            catfile: CatFileChannel::spawn(repo)?,
            mktree: MktreeChannel::spawn(repo)?,
            import: FastImportChannel::spawn(repo)?,
            cached_trees: HashMap::new(),
            cached_commits: HashMap::new(),
        })
    }

    /// Read an object's kind and payload, with no kind expectation.
    fn read_object(&mut self, hash: &ObjectHash) -> Result<(ObjectType, Vec<u8>), GitError> {
        self.catfile.read_object(hash)
    }

    fn read_expecting(
        &mut self,
        hash: &ObjectHash,
        expected: ObjectType,
    ) -> Result<Vec<u8>, GitError> {
        let (kind, payload) = self.read_object(hash)?;
        if kind != expected {
            return Err(GitError::ObjectKindMismatch {
                hash: hash.to_string(),
                expected: expected.to_string(),
                actual: kind.to_string(),
            });
        }
        Ok(payload)
    }

    /// Classify an arbitrary hash.
    pub fn get_object_type(&mut self, hash: &ObjectHash) -> Result<ObjectType, GitError> {
        Ok(self.read_object(hash)?.0)
    }

    /// Parse a commit by hash or mark. Marks are served from the write
    /// cache only: they name objects the reader child may not have seen
    /// flushed yet.
    pub fn parse_commit(&mut self, id: &ObjectRef) -> Result<Commit, GitError> {
        if let Some(commit) = self.cached_commits.get(id) {
            return Ok(commit.clone());
        }
        let hash = match id {
            ObjectRef::Hash(hash) => hash,
            ObjectRef::Mark(_) => return Err(GitError::ObjectMissing(id.to_string())),
        };
        let payload = self.read_expecting(hash, ObjectType::Commit)?;
        let commit = Commit::from_bytes(&payload)?;
        self.cached_commits.insert(*id, commit.clone());
        Ok(commit)
    }

    /// Parse an annotated tag. Tag reads are not cached; each ref is
    /// visited once.
    pub fn parse_tag(&mut self, hash: &ObjectHash) -> Result<Tag, GitError> {
        let payload = self.read_expecting(hash, ObjectType::Tag)?;
        Tag::from_bytes(&payload)
    }

    /// Read a blob's content.
    pub fn get_blob(&mut self, hash: &ObjectHash) -> Result<Vec<u8>, GitError> {
        self.read_expecting(hash, ObjectType::Blob)
    }

    /// Enqueue a commit write; returns the mark standing in for its hash.
    pub fn write_commit(&mut self, commit: &Commit) -> Result<Mark, GitError> {
        let mark = self.import.write_commit(commit)?;
        self.cached_commits
            .insert(ObjectRef::Mark(mark), commit.clone());
        Ok(mark)
    }

    /// Enqueue a tag write. The import channel names the resulting ref
    /// after the tag's embedded name; callers reset the ref when that is
    /// not the right place.
    pub fn write_tag(&mut self, tag: &Tag) -> Result<(), GitError> {
        self.import.write_tag(tag)
    }

    /// Repoint a named ref; the all-zero hash deletes it.
    pub fn reset_ref(&mut self, name: &str, target: &ObjectRef) -> Result<(), GitError> {
        self.import.reset_ref(name, target)
    }

    /// Resolve a mark to a concrete hash, blocking until the import child
    /// has flushed enough to answer.
    pub fn resolve_mark(&mut self, mark: Mark) -> Result<ObjectHash, GitError> {
        self.import.get_mark(mark)
    }

    /// Resolve a hash-or-mark to a concrete hash.
    pub fn resolve_ref(&mut self, id: &ObjectRef) -> Result<ObjectHash, GitError> {
        match id {
            ObjectRef::Hash(hash) => Ok(*hash),
            ObjectRef::Mark(mark) => self.resolve_mark(*mark),
        }
    }

    /// Signal end-of-input to every channel and reap the children. Fails
    /// with `ChildFailure` on any nonzero exit.
    pub fn close(self) -> Result<(), GitError> {
        self.catfile.close()?;
        self.mktree.close()?;
        self.import.close()?;
        Ok(())
    }
}

impl TreeStore for FilterGateway {
    fn get_tree(&mut self, hash: &ObjectHash) -> Result<TreeMap, GitError> {
        if let Some(entries) = self.cached_trees.get(hash) {
            return Ok(entries.clone());
        }
        let payload = self.read_expecting(hash, ObjectType::Tree)?;
        let entries = parse_tree_payload(&payload)?;
        self.cached_trees.insert(*hash, entries.clone());
        Ok(entries)
    }

    fn write_tree(&mut self, entries: &TreeMap) -> Result<ObjectHash, GitError> {
        if entries.is_empty() {
            return Ok(ObjectHash::empty_tree(get_hash_kind()));
        }
        let hash = self.mktree.write_tree(entries)?;
        self.cached_trees.insert(hash, entries.clone());
        Ok(hash)
    }
}
