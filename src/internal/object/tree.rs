//! The Tree object records one directory level of a snapshot: an ordered
//! run of `<mode> SP <name> NUL <raw-id>` entries. Subtree entries point
//! at further Tree objects, so a root tree names the complete state of
//! the repository at one commit.
//!
//! Ordering is canonical and load-bearing: entries are byte-lexicographic
//! by name, with subtree names compared as if they ended in `/`. Two
//! trees holding the same entries therefore always hash to the same id,
//! no matter the order they were assembled in.

use std::cmp::Ordering;
use std::fmt::Display;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::internal::object::ObjectTrait;
use crate::internal::object::types::ObjectType;

/// The mode of one tree entry.
#[derive(PartialEq, Eq, Hash, Ord, PartialOrd, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum TreeItemMode {
    Blob,
    BlobExecutable,
    Link,
    Tree,
}

impl Display for TreeItemMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let _print = match *self {
            TreeItemMode::Blob => "blob",
            TreeItemMode::BlobExecutable => "blob executable",
            TreeItemMode::Link => "link",
            TreeItemMode::Tree => "tree",
        };
        write!(f, "{_print}")
    }
}

impl TreeItemMode {
    /// Parse an octal mode string (as serialized in tree payloads) into a mode.
    pub fn tree_item_type_from_bytes(mode: &[u8]) -> Result<TreeItemMode, GitError> {
        Ok(match mode {
            b"40000" | b"040000" => TreeItemMode::Tree,
            b"100644" | b"644" => TreeItemMode::Blob,
            b"100755" | b"755" => TreeItemMode::BlobExecutable,
            b"120000" => TreeItemMode::Link,
            _ => {
                return Err(GitError::InvalidTreeItem(
                    String::from_utf8_lossy(mode).to_string(),
                ));
            }
        })
    }

    /// Octal mode bytes as written into a tree payload (no leading zero).
    pub fn to_bytes(self) -> &'static [u8] {
        match self {
            TreeItemMode::Blob => b"100644",
            TreeItemMode::BlobExecutable => b"100755",
            TreeItemMode::Link => b"120000",
            TreeItemMode::Tree => b"40000",
        }
    }

    /// The numeric file mode recorded in the index for this entry kind.
    pub fn to_unix_mode(self) -> u32 {
        match self {
            TreeItemMode::Blob => 0o100644,
            TreeItemMode::BlobExecutable => 0o100755,
            TreeItemMode::Link => 0o120000,
            TreeItemMode::Tree => 0o040000,
        }
    }

    /// Map an index/stat mode back to the tree entry kind.
    pub fn from_unix_mode(mode: u32) -> Result<TreeItemMode, GitError> {
        match mode {
            0o100644 => Ok(TreeItemMode::Blob),
            0o100755 => Ok(TreeItemMode::BlobExecutable),
            0o120000 => Ok(TreeItemMode::Link),
            0o040000 => Ok(TreeItemMode::Tree),
            _ => Err(GitError::InvalidTreeItem(format!("mode {mode:o}"))),
        }
    }
}

/// One `(mode, name, id)` entry of a tree. `name` is a single path
/// component without `/`.
#[derive(Eq, PartialEq, Hash, Ord, PartialOrd, Debug, Clone, Serialize, Deserialize)]
pub struct TreeItem {
    pub mode: TreeItemMode,
    pub id: ObjectHash,
    pub name: String,
}

impl TreeItem {
    pub fn new(mode: TreeItemMode, id: ObjectHash, name: String) -> TreeItem {
        TreeItem { mode, id, name }
    }

    /// Serialize to `<mode> SP <name> NUL <raw-id>`.
    pub fn to_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(self.mode.to_bytes());
        data.push(b' ');
        data.extend(self.name.as_bytes());
        data.push(b'\x00');
        data.extend(self.id.as_ref());
        data
    }

    /// Sort key: subtree names compare as if they had a trailing `/`.
    fn canonical_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.mode == TreeItemMode::Tree {
            key.push(b'/');
        }
        key
    }
}

/// Canonical ordering between two entries.
fn canonical_cmp(a: &TreeItem, b: &TreeItem) -> Ordering {
    a.canonical_key().cmp(&b.canonical_key())
}

/// A directory snapshot: the ordered entries plus the id of their
/// canonical serialization.
#[derive(Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub id: ObjectHash,
    pub tree_items: Vec<TreeItem>,
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Type: Tree: {}", self.id)?;
        for item in &self.tree_items {
            writeln!(f, "{} {} {}", item.mode, item.id, item.name)?;
        }
        Ok(())
    }
}

impl Tree {
    /// Build a tree from entries, sorting them canonically and rejecting
    /// duplicate names. The resulting id is insertion-order independent.
    pub fn from_tree_items(mut tree_items: Vec<TreeItem>) -> Result<Tree, GitError> {
        tree_items.sort_by(canonical_cmp);
        let mut seen = std::collections::HashSet::with_capacity(tree_items.len());
        for item in &tree_items {
            if !seen.insert(item.name.as_str()) {
                return Err(GitError::InvalidTreeItem(format!(
                    "duplicate entry name `{}`",
                    item.name
                )));
            }
        }

        let mut data = Vec::new();
        for item in &tree_items {
            data.extend(item.to_data());
        }

        let id = ObjectHash::from_type_and_data(ObjectType::Tree, &data);
        Ok(Tree { id, tree_items })
    }

    /// The empty tree (a commit of an empty index records this).
    pub fn empty() -> Tree {
        let id = ObjectHash::from_type_and_data(ObjectType::Tree, &[]);
        Tree {
            id,
            tree_items: Vec::new(),
        }
    }

    /// Look up a direct child entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeItem> {
        self.tree_items.iter().find(|item| item.name == name)
    }
}

impl ObjectTrait for Tree {
    /// Parse a tree payload, enforcing canonical order and name uniqueness.
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError>
    where
        Self: Sized,
    {
        let mut tree_items = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            let mode_end = rest
                .find_byte(b' ')
                .ok_or_else(|| GitError::InvalidTreeObject("entry missing mode".to_string()))?;
            let mode = TreeItemMode::tree_item_type_from_bytes(&rest[..mode_end])?;

            let name_end = rest[mode_end + 1..]
                .find_byte(b'\x00')
                .map(|pos| mode_end + 1 + pos)
                .ok_or_else(|| {
                    GitError::InvalidTreeObject("entry missing name terminator".to_string())
                })?;
            let name = rest[mode_end + 1..name_end]
                .to_str()
                .map_err(|e| GitError::ConversionError(e.to_string()))?
                .to_string();
            if name.is_empty() || name.contains('/') {
                return Err(GitError::InvalidTreeItem(name));
            }

            let id_size = hash.size();
            if rest.len() < name_end + 1 + id_size {
                return Err(GitError::InvalidTreeObject(
                    "entry truncated before id".to_string(),
                ));
            }
            let id = match hash {
                ObjectHash::Sha1(_) => {
                    let mut raw = [0u8; 20];
                    raw.copy_from_slice(&rest[name_end + 1..name_end + 1 + 20]);
                    ObjectHash::Sha1(raw)
                }
                ObjectHash::Sha256(_) => {
                    let mut raw = [0u8; 32];
                    raw.copy_from_slice(&rest[name_end + 1..name_end + 1 + 32]);
                    ObjectHash::Sha256(raw)
                }
            };

            tree_items.push(TreeItem::new(mode, id, name));
            rest = &rest[name_end + 1 + id_size..];
        }

        for pair in tree_items.windows(2) {
            match canonical_cmp(&pair[0], &pair[1]) {
                Ordering::Less => {}
                Ordering::Equal => {
                    return Err(GitError::InvalidTreeObject(format!(
                        "duplicate entry name `{}`",
                        pair[1].name
                    )));
                }
                Ordering::Greater => {
                    return Err(GitError::InvalidTreeObject(format!(
                        "entries out of order at `{}`",
                        pair[1].name
                    )));
                }
            }
        }

        Ok(Tree {
            id: hash,
            tree_items,
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn get_size(&self) -> usize {
        self.tree_items.len()
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();
        for item in &self.tree_items {
            data.extend(item.to_data());
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::hash::{HashKind, set_hash_kind_for_test};

    fn blob_item(name: &str) -> TreeItem {
        TreeItem::new(
            TreeItemMode::Blob,
            ObjectHash::from_str("ce013625030ba8dba906f756967f9e9ca394464a").unwrap(),
            name.to_string(),
        )
    }

    /// Entries come out in canonical order regardless of insertion order.
    #[test]
    fn test_canonical_order_is_insertion_independent() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let forward = Tree::from_tree_items(vec![
            blob_item("a"),
            blob_item("a.txt"),
            blob_item("b"),
        ])
        .unwrap();
        let shuffled = Tree::from_tree_items(vec![
            blob_item("b"),
            blob_item("a"),
            blob_item("a.txt"),
        ])
        .unwrap();

        let names: Vec<&str> = forward
            .tree_items
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "a.txt", "b"]);
        assert_eq!(forward.id, shuffled.id);
    }

    /// A subtree named `a` sorts after a blob named `a.txt` (trailing-slash rule).
    #[test]
    fn test_subtree_sorts_with_trailing_slash() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let sub = TreeItem::new(
            TreeItemMode::Tree,
            ObjectHash::from_str("4b825dc642cb6eb9a060e54bf8d69288fbee4904").unwrap(),
            "a".to_string(),
        );
        let tree = Tree::from_tree_items(vec![blob_item("a.txt"), sub, blob_item("a0")]).unwrap();
        let names: Vec<&str> = tree.tree_items.iter().map(|i| i.name.as_str()).collect();
        // "a.txt" < "a/" < "a0" byte-wise ('.' = 0x2e, '/' = 0x2f, '0' = 0x30)
        assert_eq!(names, vec!["a.txt", "a", "a0"]);
    }

    /// Duplicate names are rejected at build and at decode.
    #[test]
    fn test_duplicate_names_rejected() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let result = Tree::from_tree_items(vec![blob_item("x"), blob_item("x")]);
        assert!(result.is_err());
    }

    /// Serialized form round-trips and re-hashes to the same id.
    #[test]
    fn test_round_trip() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let tree =
            Tree::from_tree_items(vec![blob_item("README"), blob_item("Cargo.toml")]).unwrap();
        let data = tree.to_data().unwrap();
        let parsed = Tree::from_bytes(&data, tree.id).unwrap();
        assert_eq!(parsed, tree);
        assert_eq!(parsed.object_hash().unwrap(), tree.id);
    }

    /// Out-of-order payloads fail decoding.
    #[test]
    fn test_unsorted_payload_rejected() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let mut data = Vec::new();
        data.extend(blob_item("b").to_data());
        data.extend(blob_item("a").to_data());
        let id = ObjectHash::from_type_and_data(ObjectType::Tree, &data);
        assert!(Tree::from_bytes(&data, id).is_err());
    }

    /// The empty tree has Git's well-known id.
    #[test]
    fn test_empty_tree_id() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        assert_eq!(
            Tree::empty().id.to_string(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
    }
}
