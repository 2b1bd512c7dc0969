//! Object model definitions for Git commits, tags, trees and the supporting
//! types that let the gateway create strongly typed values from raw bytes.
//!
//! Commits and tags are plain records: the gateway hands out copies, so
//! callers may mutate them freely before writing them back. Tree entries are
//! shared-immutable values with a dirty/clean lifecycle, defined in
//! [`tree`].

pub mod commit;
pub mod signature;
pub mod tag;
pub mod tree;
pub mod types;

use std::fmt::Display;

use crate::{errors::GitError, hash::ObjectHash, internal::object::types::ObjectType};

/// **The Object Trait**
/// Defines the common interface for the object kinds that round-trip through
/// the object-reader channel as whole records: commits and tags.
pub trait ObjectTrait: Sized + Display {
    /// Creates a new object from a raw payload (the bytes after the
    /// `<hash> <kind> <size>` header).
    fn from_bytes(data: &[u8]) -> Result<Self, GitError>;

    /// Returns the type of the object.
    fn get_type(&self) -> ObjectType;

    /// Re-serializes the object to its canonical raw payload.
    fn to_data(&self) -> Result<Vec<u8>, GitError>;

    /// Computes the object hash from serialized data.
    ///
    /// Default implementation serializes the object and computes the hash
    /// from that data. Override only if you need custom hash computation or
    /// caching.
    fn object_hash(&self) -> Result<ObjectHash, GitError> {
        let data = self.to_data()?;
        Ok(ObjectHash::from_type_and_data(self.get_type(), &data))
    }
}
