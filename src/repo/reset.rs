//! Reset: move HEAD (and the current branch tip) to a target commit,
//! optionally rewriting the index and the working tree to match.

use tracing::debug;

use crate::{
    errors::GitError,
    internal::{
        index::{Index, IndexEntry},
        object::blob::Blob,
        refs::{Head, RefExpectation},
    },
    repo::Repository,
};

/// How much state a reset rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetMode {
    /// Move HEAD only.
    Soft,
    /// Move HEAD and rewrite the index.
    #[default]
    Mixed,
    /// Move HEAD, rewrite the index and the working tree.
    Hard,
}

impl Repository {
    /// Reset to `target` (any revision expression) in the given mode.
    pub fn reset(&self, target: &str, mode: ResetMode) -> Result<(), GitError> {
        let commit_id = self.resolve_commit(target)?;

        // move HEAD first: branch tip when on a branch, HEAD itself when detached
        match self.refs.head()? {
            Head::Branch(name) => {
                self.refs
                    .update(&format!("refs/heads/{name}"), &commit_id, RefExpectation::Any)?;
            }
            Head::Detached(_) => self.refs.set_head(Head::Detached(commit_id))?,
        }

        match mode {
            ResetMode::Soft => {}
            ResetMode::Mixed => self.reset_index_to(&commit_id)?,
            ResetMode::Hard => {
                // worktree rewrite also rebuilds the index with fresh stat caches
                self.materialize_commit(&commit_id)?;
                self.clear_merge_state()?;
            }
        }

        debug!(target, ?mode, %commit_id, "reset complete");
        Ok(())
    }

    /// Rewrite the index to exactly the target tree, leaving the working
    /// tree untouched. Entries carry no stat cache, so the next status
    /// re-hashes them against the worktree.
    fn reset_index_to(&self, commit_id: &crate::hash::ObjectHash) -> Result<(), GitError> {
        let mut index = Index::new();
        for (path, hash, mode) in self.commit_plain_items(commit_id)? {
            let name = path
                .to_str()
                .ok_or_else(|| GitError::ConversionError(format!("non-UTF8 path: {path:?}")))?
                .to_string();
            let blob: Blob = self.storage.load(&hash)?;
            let mut entry = IndexEntry::new_from_blob(name, hash, blob.data.len() as u32);
            entry.mode = mode.to_unix_mode();
            index.add(entry);
        }
        self.save_index(&index)?;
        Ok(())
    }
}
