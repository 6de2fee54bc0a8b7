//! The Commit object is a data structure used to represent a specific version of a project's
//! files at a particular point in time. Whenever a developer makes changes to the files in a
//! repository, they create a new commit object that records those changes.
//!
//! Each commit object contains the following information:
//!
//! - A unique SHA-1 / SHA-256 hash that identifies the commit.
//! - The author and committer of the commit (which may be different people).
//! - The date and time the commit was made.
//! - A commit message that describes the changes made in the commit.
//! - A reference to the parent commit or commits (in the case of a merge commit).
//! - The tree describing the contents of the repository at the time of the commit.

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::internal::object::ObjectTrait;
use crate::internal::object::signature::Signature;
use crate::internal::object::types::ObjectType;

/// The `Commit` struct is used to represent a commit object.
///
/// - The tree id points to the top level tree for this commit, which reflects the complete
///   state of the repository at the time of the commit.
/// - The parent commit ids allow construction of the full commit history: zero parents for a
///   root commit, one for a normal commit, two or more for a merge.
/// - The author and committer fields contain the name, email address, timestamp and timezone.
/// - The message field contains the commit message, and may carry an embedded GPG signature
///   block, which is preserved verbatim.
#[derive(Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: ObjectHash,
    pub tree_id: ObjectHash,
    pub parent_commit_ids: Vec<ObjectHash>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}
impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "tree: {}", self.tree_id)?;
        for parent in self.parent_commit_ids.iter() {
            writeln!(f, "parent: {parent}")?;
        }
        writeln!(f, "author {}", self.author)?;
        writeln!(f, "committer {}", self.committer)?;
        writeln!(f, "{}", self.message)
    }
}

impl Commit {
    pub fn new(
        author: Signature,
        committer: Signature,
        tree_id: ObjectHash,
        parent_commit_ids: Vec<ObjectHash>,
        message: &str,
    ) -> Result<Commit, GitError> {
        let mut commit = Commit {
            id: ObjectHash::default(),
            tree_id,
            parent_commit_ids,
            author,
            committer,
            message: message.to_string(),
        };
        // The id is the hash of the framed serialization.
        let hash = ObjectHash::from_type_and_data(ObjectType::Commit, &commit.to_data()?);
        commit.id = hash;
        Ok(commit)
    }

    /// Formats the commit message by extracting the first meaningful line.
    ///
    /// If the message contains a PGP signature, it returns the first non-empty line
    /// after the signature block. Otherwise, it returns the first non-empty line
    /// in the message. If no such line exists, it returns the original message.
    pub fn format_message(&self) -> String {
        let mut lines = self.message.lines();

        // If a PGP signature is present, skip lines until after the signature ends
        if let Some(pos) = self
            .message
            .lines()
            .position(|line| line.contains("-----END PGP SIGNATURE-----"))
        {
            return self
                .message
                .lines()
                .skip(pos + 1)
                .find(|line| !line.trim().is_empty())
                .map(|line| line.to_owned())
                .unwrap_or_else(|| self.message.clone());
        }

        // Return the first non-empty line from the start
        lines
            .find(|line| !line.trim().is_empty())
            .map(|line| line.to_owned())
            .unwrap_or_else(|| self.message.clone())
    }
}

impl ObjectTrait for Commit {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError>
    where
        Self: Sized,
    {
        let invalid = |msg: &str| GitError::InvalidCommitObject(msg.to_string());

        let mut commit = data;
        // The tree header is the first line: `tree <hex>`
        if !commit.starts_with(b"tree ") {
            return Err(invalid("missing tree header"));
        }
        let tree_end = commit
            .find_byte(0x0a)
            .ok_or_else(|| invalid("truncated tree header"))?;
        let tree_hex = commit[5..tree_end]
            .to_str()
            .map_err(|e| GitError::ConversionError(e.to_string()))?;
        let tree_id =
            ObjectHash::from_str(tree_hex).map_err(|_| GitError::InvalidHashValue(tree_hex.into()))?;
        let binding = commit[tree_end + 1..].to_vec();
        commit = &binding;

        // Everything between the tree and the author line is parent headers.
        let author_begin = commit
            .find("author")
            .ok_or_else(|| invalid("missing author header"))?;
        let mut parent_commit_ids: Vec<ObjectHash> = Vec::new();
        for parent in commit[..author_begin].find_iter("parent") {
            let parent_end = commit[parent..]
                .find_byte(0x0a)
                .ok_or_else(|| invalid("truncated parent header"))?;
            // 7 is the length of "parent "
            let hex = commit[parent + 7..parent + parent_end]
                .to_str()
                .map_err(|e| GitError::ConversionError(e.to_string()))?;
            parent_commit_ids.push(
                ObjectHash::from_str(hex).map_err(|_| GitError::InvalidHashValue(hex.into()))?,
            );
        }
        let binding = commit[author_begin..].to_vec();
        commit = &binding;

        // The author and committer each occupy one line.
        let author_end = commit
            .find_byte(0x0a)
            .ok_or_else(|| invalid("truncated author header"))?;
        let author = Signature::from_data(commit[..author_end].to_vec())?;

        let binding = commit[author_end + 1..].to_vec();
        commit = &binding;
        let committer_end = commit
            .find_byte(0x0a)
            .ok_or_else(|| invalid("truncated committer header"))?;
        let committer = Signature::from_data(commit[..committer_end].to_vec())?;

        // The rest is the message, including any gpgsig block and the
        // separating blank line, preserved byte for byte.
        let message = commit[committer_end + 1..]
            .to_str()
            .map_err(|e| GitError::ConversionError(e.to_string()))?
            .to_string();

        Ok(Commit {
            id: hash,
            tree_id,
            parent_commit_ids,
            author,
            committer,
            message,
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Commit
    }

    fn get_size(&self) -> usize {
        0
    }

    /// [Git-Internals-Git-Objects](https://git-scm.com/book/en/v2/Git-Internals-Git-Objects)
    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();

        data.extend(b"tree ");
        data.extend(self.tree_id.to_string().as_bytes());
        data.extend(&[0x0a]);

        for parent_tree_id in &self.parent_commit_ids {
            data.extend(b"parent ");
            data.extend(parent_tree_id.to_string().as_bytes());
            data.extend(&[0x0a]);
        }

        data.extend(self.author.to_data()?);
        data.extend(&[0x0a]);
        data.extend(self.committer.to_data()?);
        data.extend(&[0x0a]);
        data.extend(self.message.as_bytes());

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{HashKind, set_hash_kind_for_test};
    use crate::internal::object::signature::SignatureType;
    use std::str::FromStr;

    fn basic_commit() -> Commit {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let raw_commit = br#"tree 341e54913a3a43069f2927cc0f703e5a9f730df1
author benjamin.747 <benjamin.747@outlook.com> 1757467768 +0800
committer benjamin.747 <benjamin.747@outlook.com> 1757491219 +0800
gpgsig -----BEGIN PGP SIGNATURE-----

 iQJNBAABCAA3FiEEs4MaYUV7JcjxsVMPyqxGczTZ6K4FAmjBMC4ZHGJlbmphbWlu
 =UeLf
 -----END PGP SIGNATURE-----

test parse commit from bytes
"#;

        let hash = ObjectHash::from_str("57d7685c60213a9da465cf900f31933be3a7ee39").unwrap();
        Commit::from_bytes(raw_commit, hash).unwrap()
    }

    #[test]
    fn test_from_bytes_with_gpgsig() {
        let commit = basic_commit();

        assert_eq!(
            commit.tree_id,
            ObjectHash::from_str("341e54913a3a43069f2927cc0f703e5a9f730df1").unwrap()
        );
        assert!(commit.parent_commit_ids.is_empty());
        assert_eq!(commit.author.name, "benjamin.747");
        assert_eq!(commit.author.email, "benjamin.747@outlook.com");
        assert_eq!(commit.committer.name, "benjamin.747");

        // message must retain the signature block and the content
        assert!(commit.message.contains("-----BEGIN PGP SIGNATURE-----"));
        assert!(commit.message.contains("-----END PGP SIGNATURE-----"));
        assert!(commit.message.contains("test parse commit from bytes"));
    }

    #[test]
    fn test_format_message_with_pgp_signature() {
        let commit = basic_commit();
        assert_eq!(commit.format_message(), "test parse commit from bytes");
    }

    #[test]
    fn test_parent_headers_parsed() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let raw = b"tree 341e54913a3a43069f2927cc0f703e5a9f730df1\n\
parent 57d7685c60213a9da465cf900f31933be3a7ee39\n\
parent ce013625030ba8dba906f756967f9e9ca394464a\n\
author a <a@x> 1700000000 +0000\n\
committer a <a@x> 1700000000 +0000\n\
\nmerge two histories\n";
        let hash = ObjectHash::from_type_and_data(ObjectType::Commit, raw);
        let commit = Commit::from_bytes(raw, hash).unwrap();
        assert_eq!(commit.parent_commit_ids.len(), 2);
        assert_eq!(
            commit.parent_commit_ids[0].to_string(),
            "57d7685c60213a9da465cf900f31933be3a7ee39"
        );
    }

    #[test]
    fn test_encode_round_trip() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let author = Signature::from_parts(
            SignatureType::Author,
            "Ada".to_string(),
            "ada@x".to_string(),
            1700000000,
            "+0000".to_string(),
        );
        let committer = Signature::from_parts(
            SignatureType::Committer,
            "Ada".to_string(),
            "ada@x".to_string(),
            1700000000,
            "+0000".to_string(),
        );
        let tree_id = ObjectHash::from_str("4b825dc642cb6eb9a060e54bf8d69288fbee4904").unwrap();
        let commit = Commit::new(author, committer, tree_id, vec![], "\ninitial\n").unwrap();

        let data = commit.to_data().unwrap();
        let parsed = Commit::from_bytes(&data, commit.id).unwrap();
        assert_eq!(parsed, commit);
        assert_eq!(parsed.message, commit.message);
        assert_eq!(parsed.object_hash().unwrap(), commit.id);
    }

    #[test]
    fn test_missing_tree_rejected() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let raw = b"author a <a@x> 1 +0000\ncommitter a <a@x> 1 +0000\n\nmsg";
        let hash = ObjectHash::from_type_and_data(ObjectType::Commit, raw);
        assert!(Commit::from_bytes(raw, hash).is_err());
    }

    /// SHA-256 headers carry 64-hex ids; parsing must honor the wide width.
    #[test]
    fn test_from_bytes_sha256_widths() {
        let _guard = set_hash_kind_for_test(HashKind::Sha256);
        let tree_hex = "11".repeat(32);
        let parent_hex = "22".repeat(32);
        let raw = format!(
            "tree {tree_hex}\nparent {parent_hex}\nauthor a <a@x> 1700000000 +0000\ncommitter a <a@x> 1700000000 +0000\n\nwide ids\n"
        );
        let hash = ObjectHash::from_type_and_data(ObjectType::Commit, raw.as_bytes());

        let commit = Commit::from_bytes(raw.as_bytes(), hash).unwrap();
        assert_eq!(commit.tree_id.kind(), HashKind::Sha256);
        assert_eq!(commit.tree_id.to_string(), tree_hex);
        assert_eq!(commit.parent_commit_ids.len(), 1);
        assert_eq!(commit.parent_commit_ids[0].to_string(), parent_hex);
        assert_eq!(commit.message, "\nwide ids\n");
    }

    /// Encode/decode round-trip under SHA-256 re-hashes to the same 64-hex id.
    #[test]
    fn test_encode_round_trip_sha256() {
        let _guard = set_hash_kind_for_test(HashKind::Sha256);
        let author = Signature::from_parts(
            SignatureType::Author,
            "Ada".to_string(),
            "ada@x".to_string(),
            1700000000,
            "+0000".to_string(),
        );
        let committer = Signature::from_parts(
            SignatureType::Committer,
            "Ada".to_string(),
            "ada@x".to_string(),
            1700000000,
            "+0000".to_string(),
        );
        let tree_id = ObjectHash::from_type_and_data(ObjectType::Tree, &[]);
        let parent = ObjectHash::from_type_and_data(ObjectType::Commit, b"synthetic parent");
        let commit =
            Commit::new(author, committer, tree_id, vec![parent], "\nsha256 commit\n").unwrap();
        assert_eq!(commit.id.to_string().len(), 64);

        let data = commit.to_data().unwrap();
        let parsed = Commit::from_bytes(&data, commit.id).unwrap();
        assert_eq!(parsed.tree_id, tree_id);
        assert_eq!(parsed.parent_commit_ids, vec![parent]);
        assert_eq!(parsed.object_hash().unwrap(), commit.id);
    }
}
