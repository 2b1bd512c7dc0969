//! Object type and tree entry mode enumerations.
//!
//! This module defines the object kinds reported by the object-reader channel
//! and the file modes carried by tree entries, with conversions to and from
//! the exact byte strings used on the wire.

use std::fmt::{self, Display};

use crate::errors::GitError;

/// In Git, each object is one of four kinds, distinguished by the header of
/// the raw object bytes.
///
/// * `Commit`: a snapshot of the repository with author, committer, message
///   and parent commits.
/// * `Tree`: a directory, a set of (name, mode, hash) entries.
/// * `Blob`: the content of a file.
/// * `Tag`: an annotated tag, a first-class object pointing at another
///   object and carrying a message.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
}

const COMMIT_OBJECT_TYPE: &[u8] = b"commit";
const TREE_OBJECT_TYPE: &[u8] = b"tree";
const BLOB_OBJECT_TYPE: &[u8] = b"blob";
const TAG_OBJECT_TYPE: &[u8] = b"tag";

/// Display trait for Git objects type
impl Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ObjectType::Commit => write!(f, "commit"),
            ObjectType::Tree => write!(f, "tree"),
            ObjectType::Blob => write!(f, "blob"),
            ObjectType::Tag => write!(f, "tag"),
        }
    }
}

impl ObjectType {
    /// Parse an object kind from the exact byte string used by cat-file
    /// headers and tag `type` lines.
    pub fn from_bytes(bytes: &[u8]) -> Result<ObjectType, GitError> {
        match bytes {
            COMMIT_OBJECT_TYPE => Ok(ObjectType::Commit),
            TREE_OBJECT_TYPE => Ok(ObjectType::Tree),
            BLOB_OBJECT_TYPE => Ok(ObjectType::Blob),
            TAG_OBJECT_TYPE => Ok(ObjectType::Tag),
            _ => Err(GitError::InvalidObjectType(
                String::from_utf8_lossy(bytes).to_string(),
            )),
        }
    }
}

impl std::str::FromStr for ObjectType {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectType::from_bytes(s.as_bytes())
    }
}

/// File mode of a tree entry, restricted to the exact mode strings git
/// writes into tree objects.
///
/// Non-directory modes always carry a concrete content hash; only the
/// directory mode may carry an in-memory dirty sub-entry map.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum EntryMode {
    /// `100644`, a regular file.
    Regular,
    /// `100755`, an executable file.
    Executable,
    /// `120000`, a symbolic link.
    Symlink,
    /// `160000`, a submodule gitlink; its hash names a commit in some other
    /// history, possibly absent from this store.
    Gitlink,
    /// `40000`, a directory.
    Directory,
}

impl EntryMode {
    /// The exact mode string written into raw tree objects.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntryMode::Regular => "100644",
            EntryMode::Executable => "100755",
            EntryMode::Symlink => "120000",
            EntryMode::Gitlink => "160000",
            EntryMode::Directory => "40000",
        }
    }

    /// Parse a raw mode string.
    pub fn from_bytes(bytes: &[u8]) -> Result<EntryMode, GitError> {
        match bytes {
            b"100644" | b"644" => Ok(EntryMode::Regular),
            b"100755" | b"755" => Ok(EntryMode::Executable),
            b"120000" => Ok(EntryMode::Symlink),
            b"160000" => Ok(EntryMode::Gitlink),
            b"40000" | b"040000" => Ok(EntryMode::Directory),
            _ => Err(GitError::InvalidEntryMode(
                String::from_utf8_lossy(bytes).to_string(),
            )),
        }
    }

    /// The object kind this mode points at, as named in mktree input:
    /// directories are trees, gitlinks are commits, everything else blobs.
    pub const fn object_type(&self) -> ObjectType {
        match self {
            EntryMode::Directory => ObjectType::Tree,
            EntryMode::Gitlink => ObjectType::Commit,
            _ => ObjectType::Blob,
        }
    }

    pub const fn is_directory(&self) -> bool {
        matches!(self, EntryMode::Directory)
    }
}

impl Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_object_type_round_trip() {
        for kind in ["commit", "tree", "blob", "tag"] {
            assert_eq!(ObjectType::from_str(kind).unwrap().to_string(), kind);
        }
        assert!(ObjectType::from_bytes(b"gitlink").is_err());
    }

    #[test]
    fn test_entry_mode_round_trip() {
        for mode in ["100644", "100755", "120000", "160000", "40000"] {
            assert_eq!(
                EntryMode::from_bytes(mode.as_bytes()).unwrap().to_string(),
                mode
            );
        }
        assert!(EntryMode::from_bytes(b"100777").is_err());
    }

    /// `040000` is accepted on input but always written back as `40000`.
    #[test]
    fn test_directory_mode_normalized() {
        let mode = EntryMode::from_bytes(b"040000").unwrap();
        assert_eq!(mode, EntryMode::Directory);
        assert_eq!(mode.as_str(), "40000");
    }

    #[test]
    fn test_mode_object_types() {
        assert_eq!(EntryMode::Directory.object_type(), ObjectType::Tree);
        assert_eq!(EntryMode::Gitlink.object_type(), ObjectType::Commit);
        assert_eq!(EntryMode::Regular.object_type(), ObjectType::Blob);
        assert_eq!(EntryMode::Symlink.object_type(), ObjectType::Blob);
    }
}
