//! Error types for the git-engine crate.
//!
//! This module defines a unified error enumeration used across object
//! parsing, the loose object store, the staging index, reference updates,
//! and the working-tree operations. It integrates with `thiserror` to
//! provide rich `Display` implementations and error source chaining.
//!
//! Notes:
//! - Each variant carries contextual details via its message payload
//!   (path, ref name, object id).
//! - `ObjectCorrupted` and I/O failures are fatal to the current
//!   operation; `LockBusy` is transient and expected to be retried by
//!   the caller.

use thiserror::Error;

#[derive(Error, Debug)]
/// Unified error enumeration for the git-engine library.
///
/// - Used across object parsing, storage, index, refs and working-tree ops.
/// - Implements `std::error::Error` via `thiserror`.
pub enum GitError {
    /// Invalid or unsupported git object type name.
    #[error("The `{0}` is not a valid git object type.")]
    InvalidObjectType(String),

    /// Malformed or unsupported blob object encoding.
    #[error("The `{0}` is not a valid git blob object.")]
    InvalidBlobObject(String),

    /// Malformed tree object.
    #[error("Not a valid git tree object: {0}")]
    InvalidTreeObject(String),

    /// Invalid tree entry (mode/name/hash).
    #[error("The `{0}` is not a valid git tree item.")]
    InvalidTreeItem(String),

    /// Invalid commit signature line.
    #[error("The `{0}` is not a valid git commit signature.")]
    InvalidSignatureType(String),

    /// Malformed commit object.
    #[error("Not a valid git commit object: {0}")]
    InvalidCommitObject(String),

    /// Malformed tag object.
    #[error("Not a valid git tag object: {0}")]
    InvalidTagObject(String),

    /// Malformed or unsupported staging index file.
    #[error("The `{0}` is not a valid index file.")]
    InvalidIndexFile(String),

    /// Invalid staging index header.
    #[error("The `{0}` is not a valid index header.")]
    InvalidIndexHeader(String),

    /// Invalid function argument.
    #[error("Argument parse failed: {0}")]
    InvalidArgument(String),

    /// I/O error from underlying reader or writer.
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    /// Invalid hash formatting or value.
    #[error("The {0} is not a valid Hash value ")]
    InvalidHashValue(String),

    /// Stored bytes do not hash back to the id they were filed under.
    #[error("Object `{0}` is corrupt: {1}")]
    ObjectCorrupted(String, String),

    /// Object missing from storage.
    #[error("Can't find specific object: {0}")]
    ObjectNotFound(String),

    /// Short-id prefix matches more than one object.
    #[error("Short object id `{0}` is ambiguous")]
    AmbiguousPrefix(String),

    /// Ref or working-tree path missing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad ref name or symbolic ref cycle.
    #[error("Invalid reference `{0}`: {1}")]
    InvalidRef(String, String),

    /// Compare-and-swap expectation mismatch on a ref update.
    #[error("Reference `{0}` moved: expected {1}, found {2}")]
    StaleRef(String, String, String),

    /// A lockfile is already held by another writer.
    #[error("Unable to create `{0}`: lock already held")]
    LockBusy(String),

    /// Checkout/reset refused to overwrite uncommitted work.
    #[error("Local changes to `{0}` would be overwritten")]
    LocalChangesWouldBeLost(String),

    /// A commit would record the same tree as its parent.
    #[error("Nothing to commit, working tree clean")]
    NothingToCommit,

    /// The merge stopped with unresolved conflicts in the working tree.
    #[error("Merge conflict in {0} path(s)")]
    MergeConflict(usize),

    /// Text encoding or UTF-8 conversion error.
    #[error("UTF-8 conversion error: {0}")]
    ConversionError(String),

    /// Repository not found.
    #[error("Repository not found")]
    RepoNotFound,

    /// Generic custom error for miscellaneous failures.
    #[error("{0}")]
    CustomError(String),
}
