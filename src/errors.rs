//! Error types for the git-rewrite crate.
//!
//! This module defines a unified error enumeration used across object parsing,
//! the child-process channels, tree transformation and the rewrite driver. It
//! integrates with `thiserror` to provide rich `Display` implementations and
//! error source chaining where applicable.
//!
//! Notes:
//! - Each variant carries contextual details via its message payload.
//! - Channel errors (`ProtocolError`, `ChildFailure`) are fatal to a rewrite;
//!   refs are never repointed once one is raised.

use thiserror::Error;

#[derive(Error, Debug)]
/// Unified error enumeration for the git-rewrite library.
///
/// - Used across object parsing, the batch channels, tree transforms and ref
///   updates.
/// - Implements `std::error::Error` via `thiserror`.
pub enum GitError {
    /// Invalid or unsupported git object type name.
    #[error("The `{0}` is not a valid git object type.")]
    InvalidObjectType(String),

    /// Invalid or unsupported tree entry file mode.
    #[error("The `{0}` is not a valid git tree entry mode.")]
    InvalidEntryMode(String),

    /// Malformed tree object payload.
    #[error("Not a valid git tree object: {0}")]
    InvalidTreeObject(String),

    /// Invalid tree entry (mode/name/hash).
    #[error("The `{0}` is not a valid git tree item.")]
    InvalidTreeItem(String),

    /// A tree entry name containing `/`, or sub-entries attached to a
    /// non-directory mode.
    #[error("Invalid tree entry name: {0}")]
    InvalidEntryName(String),

    /// Malformed commit object.
    #[error("Not a valid git commit object: {0}")]
    InvalidCommitObject(String),

    /// Malformed tag object.
    #[error("Not a valid git tag object: {0}")]
    InvalidTagObject(String),

    /// Asked to parse an object of one kind as another.
    #[error("Object `{hash}` is a {actual}, not a {expected}.")]
    ObjectKindMismatch {
        hash: String,
        expected: String,
        actual: String,
    },

    /// An object referenced by hash is absent from the store. Gitlink
    /// targets routinely hit this; callers decide whether to escalate.
    #[error("Can't find specific object: {0}")]
    ObjectMissing(String),

    /// Malformed response from a child channel (bad header, short read,
    /// missing terminator).
    #[error("Protocol error on the {channel} channel: {msg}")]
    ProtocolError { channel: &'static str, msg: String },

    /// A child process exited with a non-zero status.
    #[error("The {channel} child exited with non-zero status {code}.")]
    ChildFailure { channel: &'static str, code: i32 },

    /// A commit violates the caller's parent-count expectations. Surfaced to
    /// the commit filter; the caller decides.
    #[error("Malformed history at {0}")]
    MalformedHistory(String),

    /// A user-supplied callback failed; the payload names the offending
    /// commit or ref.
    #[error("Filter callback failed: {0}")]
    FilterFailed(String),

    /// Invalid ref name (backup prefixes and refs must start with `refs/`).
    #[error("The `{0}` is not a valid ref name.")]
    InvalidRefName(String),

    /// Malformed persistent revmap file.
    #[error("Not a valid revmap file: {0}")]
    InvalidRevMap(String),

    /// Invalid caller-supplied argument (e.g. a malformed path pattern).
    #[error("Argument parse failed: {0}")]
    InvalidArgument(String),

    /// Invalid SHA-1/SHA-256 hash formatting or value.
    #[error("The {0} is not a valid Hash value ")]
    InvalidHashValue(String),

    /// I/O error from underlying reader or writer.
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    /// Generic custom error for miscellaneous failures.
    #[error("{0}")]
    CustomError(String),
}
