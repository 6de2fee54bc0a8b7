//! Commit creation: build the tree recorded by the index, assemble the
//! commit object with its parent chain, and advance the current branch
//! under compare-and-swap.

use std::{
    collections::HashSet,
    fs,
    path::PathBuf,
};

use tracing::debug;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::{
        index::Index,
        object::{
            commit::Commit,
            signature::{Signature, SignatureType},
            tree::{Tree, TreeItem, TreeItemMode},
        },
        refs::{Head, RefExpectation},
    },
    repo::Repository,
};

/// Optional knobs for [`Repository::commit`].
#[derive(Debug, Default, Clone)]
pub struct CommitOptions {
    /// Author override; defaults to env/config identity.
    pub author: Option<Signature>,
    /// Committer override; defaults to env/config identity.
    pub committer: Option<Signature>,
    /// Permit a commit whose tree equals its parent's.
    pub allow_empty: bool,
}

impl Repository {
    /// Build (and store) the tree hierarchy recorded by the index's
    /// stage-0 entries, returning the root tree.
    ///
    /// Deterministic and insertion-order independent: every level is
    /// emitted in canonical entry order, and all subtrees are persisted
    /// before the root is returned.
    pub fn build_tree(&self, index: &Index) -> Result<Tree, GitError> {
        self.create_tree(index, PathBuf::new())
    }

    /// recursively create tree from index's tracked entries
    fn create_tree(&self, index: &Index, current_root: PathBuf) -> Result<Tree, GitError> {
        // blob created when add file to index
        let get_blob_entry = |path: &PathBuf| -> Result<TreeItem, GitError> {
            let name = path.to_str().ok_or_else(|| {
                GitError::ConversionError(format!("non-UTF8 path: {path:?}"))
            })?;
            let meta = index
                .get(name, 0)
                .ok_or_else(|| GitError::NotFound(name.to_string()))?;
            let filename = path
                .file_name()
                .and_then(|f| f.to_str())
                .ok_or_else(|| GitError::ConversionError(format!("bad file name: {path:?}")))?
                .to_string();

            Ok(TreeItem {
                name: filename,
                mode: TreeItemMode::from_unix_mode(meta.mode)?,
                id: meta.hash,
            })
        };

        let mut tree_items: Vec<TreeItem> = Vec::new();
        let mut processed_path: HashSet<String> = HashSet::new();
        let path_entries: Vec<PathBuf> = index
            .tracked_entries(0)
            .iter()
            .map(|file| PathBuf::from(&file.name))
            .filter(|path| path.starts_with(&current_root))
            .collect();
        for path in path_entries.iter() {
            let in_current_path = path.parent() == Some(current_root.as_path());
            if in_current_path {
                tree_items.push(get_blob_entry(path)?);
            } else {
                if path.components().count() == 1 {
                    continue;
                }
                // next level tree
                let process_path = path
                    .components()
                    .nth(current_root.components().count())
                    .and_then(|c| c.as_os_str().to_str())
                    .ok_or_else(|| {
                        GitError::ConversionError(format!("non-UTF8 path: {path:?}"))
                    })?;

                if processed_path.contains(process_path) {
                    continue;
                }
                processed_path.insert(process_path.to_string());

                let sub_tree =
                    self.create_tree(index, current_root.clone().join(process_path))?;
                tree_items.push(TreeItem {
                    name: process_path.to_string(),
                    mode: TreeItemMode::Tree,
                    id: sub_tree.id,
                });
            }
        }

        let tree = if tree_items.is_empty() {
            // `from_tree_items` can't create an empty tree
            Tree::empty()
        } else {
            Tree::from_tree_items(tree_items)?
        };
        self.storage.save(&tree)?;
        Ok(tree)
    }

    /// Record the staged tree as a new commit and advance HEAD.
    ///
    /// A `MERGE_HEAD` left behind by a conflicted merge contributes the
    /// second parent and is consumed on success.
    pub fn commit(&self, message: &str, opts: CommitOptions) -> Result<ObjectHash, GitError> {
        let mut index = self.load_index()?;
        if index.has_conflicts() {
            return Err(GitError::MergeConflict(index.conflicted_paths().len()));
        }
        index.refresh(self.work_dir());

        let tree = self.build_tree(&index)?;

        let head_commit = self.refs.head_commit()?;
        let mut parents: Vec<ObjectHash> = head_commit.into_iter().collect();
        let merge_head = self.read_merge_head()?;
        if let Some(merge_parent) = merge_head {
            parents.push(merge_parent);
        }

        if !opts.allow_empty && merge_head.is_none() {
            let parent_tree = match parents.first() {
                Some(parent) => Some(self.storage.load::<Commit>(parent)?.tree_id),
                None => None,
            };
            let unchanged = match parent_tree {
                Some(parent_tree) => parent_tree == tree.id,
                None => index.tracked_entries(0).is_empty(),
            };
            if unchanged {
                return Err(GitError::NothingToCommit);
            }
        }

        let author = opts
            .author
            .unwrap_or_else(|| self.default_signature(SignatureType::Author));
        let committer = opts
            .committer
            .unwrap_or_else(|| self.default_signature(SignatureType::Committer));

        // A blank line separates headers from the message on disk; the
        // stored message carries it.
        let stored_message = format!("\n{message}");
        let commit = Commit::new(author, committer, tree.id, parents, &stored_message)?;
        self.storage.save(&commit)?;

        self.advance_head(&commit.id, head_commit)?;
        self.save_index(&index)?;
        self.clear_merge_state()?;

        debug!(id = %commit.id, "created commit");
        Ok(commit.id)
    }

    /// Move the current branch (CAS against the previous tip) or, when
    /// detached, HEAD itself.
    fn advance_head(
        &self,
        new_commit: &ObjectHash,
        old_head: Option<ObjectHash>,
    ) -> Result<(), GitError> {
        match self.refs.head()? {
            Head::Branch(name) => {
                let expectation = match old_head {
                    Some(old) => RefExpectation::Exactly(old),
                    None => RefExpectation::Absent,
                };
                self.refs
                    .update(&format!("refs/heads/{name}"), new_commit, expectation)
            }
            Head::Detached(_) => self.refs.set_head(Head::Detached(*new_commit)),
        }
    }

    pub(crate) fn merge_head_path(&self) -> PathBuf {
        self.git_dir().join("MERGE_HEAD")
    }

    pub(crate) fn merge_msg_path(&self) -> PathBuf {
        self.git_dir().join("MERGE_MSG")
    }

    pub(crate) fn read_merge_head(&self) -> Result<Option<ObjectHash>, GitError> {
        use std::str::FromStr;
        match fs::read_to_string(self.merge_head_path()) {
            Ok(content) => {
                let line = content.trim();
                ObjectHash::from_str(line)
                    .map(Some)
                    .map_err(|_| GitError::InvalidHashValue(line.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GitError::IOError(e)),
        }
    }

    pub(crate) fn clear_merge_state(&self) -> Result<(), GitError> {
        for path in [self.merge_head_path(), self.merge_msg_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(GitError::IOError(e)),
            }
        }
        Ok(())
    }
}
