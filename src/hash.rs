//! Hash utilities for Git objects with selectable algorithms (SHA-1 and SHA-256).
//! Hash kind is stored thread-locally; set once at startup to match your repository format.
//! Defaults to SHA-1.
//!
//! Also defines [`Mark`] and [`ObjectRef`], the transient fast-import handles
//! that stand in for hashes of objects whose content hash is not yet known.

use std::{cell::RefCell, fmt::Display, io, str::FromStr};

use serde::{Deserialize, Serialize};
use sha1::Digest;

use crate::errors::GitError;
use crate::internal::object::types::ObjectType;

/// Supported hash algorithms for object IDs (selector only, no data attached).
/// Used to configure which hash algorithm to use globally (thread-local).
/// Defaults to SHA-1.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize, Serialize,
)]
pub enum HashKind {
    #[default]
    Sha1,
    Sha256,
}

impl HashKind {
    /// Byte length of the hash output.
    pub const fn size(&self) -> usize {
        match self {
            HashKind::Sha1 => 20,
            HashKind::Sha256 => 32,
        }
    }

    /// Hex string length of the hash output.
    pub const fn hex_len(&self) -> usize {
        match self {
            HashKind::Sha1 => 40,
            HashKind::Sha256 => 64,
        }
    }

    /// Lowercase name of the hash algorithm.
    pub const fn as_str(&self) -> &'static str {
        match self {
            HashKind::Sha1 => "sha1",
            HashKind::Sha256 => "sha256",
        }
    }
}

impl Display for HashKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(HashKind::Sha1),
            "sha256" => Ok(HashKind::Sha256),
            _ => Err("Invalid hash kind".to_string()),
        }
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize,
)]
/// Concrete object ID value carrying the bytes for the selected algorithm (SHA-1 or SHA-256).
/// Used for Git object hashes.
/// Supports conversion to/from hex strings, byte slices, and stream reading.
pub enum ObjectHash {
    Sha1([u8; 20]),
    Sha256([u8; 32]),
}

impl Default for ObjectHash {
    fn default() -> Self {
        ObjectHash::Sha1([0u8; 20])
    }
}

impl Display for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.as_ref()))
    }
}

impl AsRef<[u8]> for ObjectHash {
    fn as_ref(&self) -> &[u8] {
        match self {
            ObjectHash::Sha1(bytes) => bytes.as_slice(),
            ObjectHash::Sha256(bytes) => bytes.as_slice(),
        }
    }
}

/// Parse hex (40 for SHA1, 64 for SHA-256) into `ObjectHash`.
impl FromStr for ObjectHash {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.len() {
            40 => {
                let mut h = [0u8; 20];
                let bytes =
                    hex::decode(s).map_err(|_| GitError::InvalidHashValue(s.to_string()))?;
                h.copy_from_slice(bytes.as_slice());
                Ok(ObjectHash::Sha1(h))
            }
            64 => {
                let mut h = [0u8; 32];
                let bytes =
                    hex::decode(s).map_err(|_| GitError::InvalidHashValue(s.to_string()))?;
                h.copy_from_slice(bytes.as_slice());
                Ok(ObjectHash::Sha256(h))
            }
            _ => Err(GitError::InvalidHashValue(s.to_string())),
        }
    }
}

/// Hex form of the SHA-1 empty tree object.
const EMPTY_TREE_SHA1: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";
/// Hex form of the SHA-256 empty tree object.
const EMPTY_TREE_SHA256: &str = "6ef19b41225c5369f1c104d45d8d85efa9b057b53b14b4b9b939dd74decc5321";

impl ObjectHash {
    /// All-zero hash for a given hash kind. Resetting a ref to this value
    /// deletes the ref.
    pub fn zero(kind: HashKind) -> ObjectHash {
        match kind {
            HashKind::Sha1 => ObjectHash::Sha1([0u8; 20]),
            HashKind::Sha256 => ObjectHash::Sha256([0u8; 32]),
        }
    }

    /// Zero-filled hex string for a given hash kind.
    pub fn zero_str(kind: HashKind) -> String {
        "0".repeat(kind.hex_len())
    }

    /// True when every byte of the hash is zero.
    pub fn is_zero(&self) -> bool {
        self.as_ref().iter().all(|b| *b == 0)
    }

    /// Well-known hash of the zero-entry tree object for a given hash kind.
    /// Dirty subtrees that empty out collapse to this sentinel, which causes
    /// the parent tree to drop the entry entirely.
    pub fn empty_tree(kind: HashKind) -> ObjectHash {
        let hex = match kind {
            HashKind::Sha1 => EMPTY_TREE_SHA1,
            HashKind::Sha256 => EMPTY_TREE_SHA256,
        };
        ObjectHash::from_str(hex).unwrap()
    }

    /// Return the hash kind for this value.
    pub fn kind(&self) -> HashKind {
        match self {
            ObjectHash::Sha1(_) => HashKind::Sha1,
            ObjectHash::Sha256(_) => HashKind::Sha256,
        }
    }

    /// Return the hash size in bytes.
    pub fn size(&self) -> usize {
        self.kind().size()
    }

    /// Compute hash of data using current thread-local `HashKind`.
    pub fn new(data: &[u8]) -> ObjectHash {
        match get_hash_kind() {
            HashKind::Sha1 => {
                let h = sha1::Sha1::digest(data);
                let mut bytes = [0u8; 20];
                bytes.copy_from_slice(h.as_ref());
                ObjectHash::Sha1(bytes)
            }
            HashKind::Sha256 => {
                let h = sha2::Sha256::digest(data);
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(h.as_ref());
                ObjectHash::Sha256(bytes)
            }
        }
    }

    /// Create ObjectHash from object type and data
    pub fn from_type_and_data(object_type: ObjectType, data: &[u8]) -> ObjectHash {
        let mut d: Vec<u8> = Vec::new();
        d.extend(object_type.to_string().as_bytes());
        d.push(b' ');
        d.extend(data.len().to_string().as_bytes());
        d.push(b'\x00');
        d.extend(data);
        ObjectHash::new(&d)
    }

    /// Create `ObjectHash` from raw bytes matching the current hash size.
    pub fn from_bytes(bytes: &[u8]) -> Result<ObjectHash, GitError> {
        let expected_len = get_hash_kind().size();
        if bytes.len() != expected_len {
            return Err(GitError::InvalidHashValue(format!(
                "byte length {}, expected {}",
                bytes.len(),
                expected_len
            )));
        }

        match get_hash_kind() {
            HashKind::Sha1 => {
                let mut h = [0u8; 20];
                h.copy_from_slice(bytes);
                Ok(ObjectHash::Sha1(h))
            }
            HashKind::Sha256 => {
                let mut h = [0u8; 32];
                h.copy_from_slice(bytes);
                Ok(ObjectHash::Sha256(h))
            }
        }
    }

    /// Read hash bytes from a stream according to current hash size.
    pub fn from_stream(data: &mut impl io::Read) -> io::Result<ObjectHash> {
        match get_hash_kind() {
            HashKind::Sha1 => {
                let mut h = [0u8; 20];
                data.read_exact(&mut h)?;
                Ok(ObjectHash::Sha1(h))
            }
            HashKind::Sha256 => {
                let mut h = [0u8; 32];
                data.read_exact(&mut h)?;
                Ok(ObjectHash::Sha256(h))
            }
        }
    }

    /// Return raw bytes of the hash.
    pub fn to_data(self) -> Vec<u8> {
        self.as_ref().to_vec()
    }
}

/// A transient integer handle allocated by the fast-import channel for a
/// newly written object whose content hash is not yet known. Resolvable to a
/// concrete hash on demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mark(pub u64);

impl Display for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, ":{}", self.0)
    }
}

/// Either a concrete content hash or a fast-import mark. Commit parents and
/// revmap values are `ObjectRef`s: freshly written commits are referenced by
/// mark until the import channel is asked to resolve them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    Hash(ObjectHash),
    Mark(Mark),
}

impl ObjectRef {
    /// The concrete hash, if this ref already has one.
    pub fn as_hash(&self) -> Option<&ObjectHash> {
        match self {
            ObjectRef::Hash(h) => Some(h),
            ObjectRef::Mark(_) => None,
        }
    }

    pub fn is_mark(&self) -> bool {
        matches!(self, ObjectRef::Mark(_))
    }
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectRef::Hash(h) => write!(f, "{h}"),
            ObjectRef::Mark(m) => write!(f, "{m}"),
        }
    }
}

impl From<ObjectHash> for ObjectRef {
    fn from(hash: ObjectHash) -> Self {
        ObjectRef::Hash(hash)
    }
}

impl From<Mark> for ObjectRef {
    fn from(mark: Mark) -> Self {
        ObjectRef::Mark(mark)
    }
}

/// Parse either a hex hash or a `:<n>` mark.
impl FromStr for ObjectRef {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(digits) = s.strip_prefix(':') {
            let n: u64 = digits
                .parse()
                .map_err(|_| GitError::InvalidHashValue(s.to_string()))?;
            Ok(ObjectRef::Mark(Mark(n)))
        } else {
            Ok(ObjectRef::Hash(ObjectHash::from_str(s)?))
        }
    }
}

thread_local! {
    /// Thread-local variable to store the current hash kind.
    /// This allows different threads to work with different hash algorithms concurrently
    /// without interfering with each other.
    static CURRENT_HASH_KIND: RefCell<HashKind> = RefCell::new(HashKind::default());
}

/// Set the thread-local hash kind (configure once at startup to match repo format).
pub fn set_hash_kind(kind: HashKind) {
    CURRENT_HASH_KIND.with(|h| {
        *h.borrow_mut() = kind;
    });
}

/// Retrieves the hash kind for the current thread.
pub fn get_hash_kind() -> HashKind {
    CURRENT_HASH_KIND.with(|h| *h.borrow())
}

/// A guard to reset the hash kind after the test
pub struct HashKindGuard {
    prev: HashKind,
}

/// Implementation of the `Drop` trait for the `HashKindGuard` struct.
impl Drop for HashKindGuard {
    fn drop(&mut self) {
        set_hash_kind(self.prev);
    }
}

/// Sets the hash kind for the current thread and returns a guard to reset it later.
pub fn set_hash_kind_for_test(kind: HashKind) -> HashKindGuard {
    let prev = get_hash_kind();
    set_hash_kind(kind);
    HashKindGuard { prev }
}
