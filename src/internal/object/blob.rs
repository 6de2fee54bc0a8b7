//! The Blob object stores the raw content of a file. It carries no name,
//! mode or history of its own; trees give blobs their place in a snapshot
//! and commits give them a point in time.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::internal::object::ObjectTrait;
use crate::internal::object::types::ObjectType;

/// An opaque byte sequence addressed by the hash of its framed encoding.
#[derive(Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Blob {
    pub id: ObjectHash,
    pub data: Vec<u8>,
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Type: Blob")?;
        writeln!(f, "Size: {}", self.data.len())
    }
}

impl Blob {
    /// Create a blob from UTF-8 content.
    pub fn from_content(content: &str) -> Blob {
        Blob::from_content_bytes(content.as_bytes().to_vec())
    }

    /// Create a blob from raw bytes, computing its id.
    pub fn from_content_bytes(data: Vec<u8>) -> Blob {
        let id = ObjectHash::from_type_and_data(ObjectType::Blob, &data);
        Blob { id, data }
    }
}

impl ObjectTrait for Blob {
    /// The payload of a blob is the content itself, unframed.
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError>
    where
        Self: Sized,
    {
        Ok(Blob {
            id: hash,
            data: data.to_vec(),
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Blob
    }

    fn get_size(&self) -> usize {
        self.data.len()
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        Ok(self.data.clone())
    }
}
