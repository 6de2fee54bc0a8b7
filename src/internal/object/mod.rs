//! Object model definitions for Git blobs, trees, commits, tags, and the
//! trait that lets storage create strongly typed values from raw bytes.

pub mod blob;
pub mod commit;
pub mod signature;
pub mod tag;
pub mod tree;
pub mod types;

use std::fmt::Display;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::{blob::Blob, commit::Commit, tag::Tag, tree::Tree, types::ObjectType},
};

/// **The Object Trait**
/// Defines the common interface for all Git object types, including blobs, trees, commits, and tags.
pub trait ObjectTrait: Send + Sync + Display {
    /// Creates a new object from a byte slice.
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError>
    where
        Self: Sized;

    /// Returns the type of the object.
    fn get_type(&self) -> ObjectType;

    fn get_size(&self) -> usize;

    fn to_data(&self) -> Result<Vec<u8>, GitError>;

    /// Computes the object hash from serialized data.
    ///
    /// Default implementation serializes the object and computes the hash from that data.
    /// Override only if you need custom hash computation or caching.
    fn object_hash(&self) -> Result<ObjectHash, GitError> {
        let data = self.to_data()?;
        Ok(ObjectHash::from_type_and_data(self.get_type(), &data))
    }
}

/// Tagged union over the four object kinds, for reads that dispatch on the
/// stored type header.
#[derive(Debug, Clone)]
pub enum GitObject {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl GitObject {
    /// Decode payload bytes under the given type header.
    pub fn from_bytes(
        object_type: ObjectType,
        data: &[u8],
        hash: ObjectHash,
    ) -> Result<Self, GitError> {
        Ok(match object_type {
            ObjectType::Blob => GitObject::Blob(Blob::from_bytes(data, hash)?),
            ObjectType::Tree => GitObject::Tree(Tree::from_bytes(data, hash)?),
            ObjectType::Commit => GitObject::Commit(Commit::from_bytes(data, hash)?),
            ObjectType::Tag => GitObject::Tag(Tag::from_bytes(data, hash)?),
        })
    }

    pub fn get_type(&self) -> ObjectType {
        match self {
            GitObject::Blob(_) => ObjectType::Blob,
            GitObject::Tree(_) => ObjectType::Tree,
            GitObject::Commit(_) => ObjectType::Commit,
            GitObject::Tag(_) => ObjectType::Tag,
        }
    }

    pub fn id(&self) -> ObjectHash {
        match self {
            GitObject::Blob(blob) => blob.id,
            GitObject::Tree(tree) => tree.id,
            GitObject::Commit(commit) => commit.id,
            GitObject::Tag(tag) => tag.id,
        }
    }

    pub fn to_data(&self) -> Result<Vec<u8>, GitError> {
        match self {
            GitObject::Blob(blob) => blob.to_data(),
            GitObject::Tree(tree) => tree.to_data(),
            GitObject::Commit(commit) => commit.to_data(),
            GitObject::Tag(tag) => tag.to_data(),
        }
    }
}

impl Display for GitObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitObject::Blob(blob) => blob.fmt(f),
            GitObject::Tree(tree) => tree.fmt(f),
            GitObject::Commit(commit) => commit.fmt(f),
            GitObject::Tag(tag) => tag.fmt(f),
        }
    }
}
