//! The Tag object is an annotated pointer: it names another object
//! (almost always a commit), records who tagged it and when, and carries
//! a free-form message. Lightweight tags never materialize a Tag object;
//! they are plain refs under `refs/tags/`.

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::internal::object::ObjectTrait;
use crate::internal::object::signature::Signature;
use crate::internal::object::types::ObjectType;

/// An annotated tag: `(object, type, tag, tagger, message)`.
#[derive(Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: ObjectHash,
    pub object_id: ObjectHash,
    pub object_type: ObjectType,
    pub tag_name: String,
    pub tagger: Signature,
    pub message: String,
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "object {}", self.object_id)?;
        writeln!(f, "type {}", self.object_type)?;
        writeln!(f, "tag {}", self.tag_name)?;
        writeln!(f, "tagger {}", self.tagger)?;
        writeln!(f, "{}", self.message)
    }
}

impl Tag {
    pub fn new(
        object_id: ObjectHash,
        object_type: ObjectType,
        tag_name: String,
        tagger: Signature,
        message: &str,
    ) -> Result<Tag, GitError> {
        let mut tag = Tag {
            id: ObjectHash::default(),
            object_id,
            object_type,
            tag_name,
            tagger,
            message: message.to_string(),
        };
        let hash = ObjectHash::from_type_and_data(ObjectType::Tag, &tag.to_data()?);
        tag.id = hash;
        Ok(tag)
    }
}

impl ObjectTrait for Tag {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError>
    where
        Self: Sized,
    {
        let invalid = |msg: &str| GitError::InvalidTagObject(msg.to_string());

        // header lines in fixed order: object, type, tag, tagger
        let mut rest = data;
        let mut take_line = |prefix: &[u8]| -> Result<Vec<u8>, GitError> {
            if !rest.starts_with(prefix) {
                return Err(invalid(&format!(
                    "missing `{}` header",
                    String::from_utf8_lossy(prefix)
                )));
            }
            let end = rest
                .find_byte(0x0a)
                .ok_or_else(|| invalid("truncated header"))?;
            let line = rest[prefix.len()..end].to_vec();
            rest = &rest[end + 1..];
            Ok(line)
        };

        let object_hex = take_line(b"object ")?;
        let object_hex = object_hex
            .to_str()
            .map_err(|e| GitError::ConversionError(e.to_string()))?;
        let object_id = ObjectHash::from_str(object_hex)
            .map_err(|_| GitError::InvalidHashValue(object_hex.to_string()))?;

        let type_name = take_line(b"type ")?;
        let object_type = ObjectType::from_string(
            type_name
                .to_str()
                .map_err(|e| GitError::ConversionError(e.to_string()))?,
        )?;

        let tag_name = take_line(b"tag ")?
            .to_str()
            .map_err(|e| GitError::ConversionError(e.to_string()))?
            .to_string();

        let tagger_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| invalid("truncated tagger header"))?;
        let tagger = Signature::from_data(rest[..tagger_end].to_vec())?;

        let message = rest[tagger_end + 1..]
            .to_str()
            .map_err(|e| GitError::ConversionError(e.to_string()))?
            .to_string();

        Ok(Tag {
            id: hash,
            object_id,
            object_type,
            tag_name,
            tagger,
            message,
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Tag
    }

    fn get_size(&self) -> usize {
        0
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();

        data.extend(b"object ");
        data.extend(self.object_id.to_string().as_bytes());
        data.extend(&[0x0a]);

        data.extend(b"type ");
        data.extend(self.object_type.to_bytes());
        data.extend(&[0x0a]);

        data.extend(b"tag ");
        data.extend(self.tag_name.as_bytes());
        data.extend(&[0x0a]);

        data.extend(self.tagger.to_data()?);
        data.extend(&[0x0a]);
        data.extend(self.message.as_bytes());

        Ok(data)
    }
}
