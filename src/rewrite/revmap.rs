//! The revision map: old commit hash to rewritten commit hash-or-mark.
//!
//! Grows monotonically during a rewrite. Optionally persisted as a
//! whitespace-delimited two-column text file; marks are resolved to
//! concrete hashes before anything reaches disk, and the write goes through
//! a temp file plus atomic rename for crash safety.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use crate::errors::GitError;
use crate::hash::{Mark, ObjectHash, ObjectRef};

/// Mapping from old commit hash to new commit hash-or-mark. Absent keys are
/// identity mappings.
#[derive(Debug, Default)]
pub struct RevMap {
    map: BTreeMap<ObjectHash, ObjectRef>,
}

impl RevMap {
    pub fn new() -> RevMap {
        RevMap::default()
    }

    /// Load a persisted revmap; every value in the file is a concrete hash.
    pub fn load(path: &Path) -> Result<RevMap, GitError> {
        let content = std::fs::read_to_string(path)?;
        let mut map = BTreeMap::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(old), Some(new), None) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(GitError::InvalidRevMap(format!(
                    "expected two columns: {line:?}"
                )));
            };
            map.insert(
                ObjectHash::from_str(old)?,
                ObjectRef::Hash(ObjectHash::from_str(new)?),
            );
        }
        Ok(RevMap { map })
    }

    pub fn contains(&self, old: &ObjectHash) -> bool {
        self.map.contains_key(old)
    }

    pub fn get(&self, old: &ObjectHash) -> Option<&ObjectRef> {
        self.map.get(old)
    }

    pub fn insert(&mut self, old: ObjectHash, new: ObjectRef) {
        self.map.insert(old, new);
    }

    /// Remap a parent pointer. Unknown parents pass through unchanged: the
    /// root-commit case, or commits deliberately outside the rewrite set.
    pub fn remap(&self, parent: &ObjectRef) -> ObjectRef {
        match parent {
            ObjectRef::Hash(hash) => *self.map.get(hash).unwrap_or(parent),
            ObjectRef::Mark(_) => *parent,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectHash, &ObjectRef)> {
        self.map.iter()
    }

    /// Persist to `path`, resolving every mark through `resolve` first.
    /// Written to a temp file in the target directory, then renamed into
    /// place.
    pub fn save(
        &self,
        path: &Path,
        mut resolve: impl FnMut(Mark) -> Result<ObjectHash, GitError>,
    ) -> Result<(), GitError> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
            None => tempfile::NamedTempFile::new_in(".")?,
        };
        for (old, new) in &self.map {
            let new = match new {
                ObjectRef::Hash(hash) => *hash,
                ObjectRef::Mark(mark) => resolve(*mark)?,
            };
            writeln!(tmp, "{old} {new}")?;
        }
        tmp.persist(path).map_err(|e| GitError::IOError(e.error))?;
        Ok(())
    }
}
