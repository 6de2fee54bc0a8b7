//! Checkout: replace the working tree and index with the content of a
//! target commit, then repoint HEAD — symbolically for branch targets,
//! detached for bare commit ids.

use std::{fs, path::PathBuf};

use tracing::debug;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::{
        index::{Index, IndexEntry},
        object::{
            blob::Blob,
            tree::TreeItemMode,
        },
        refs::Head,
    },
    repo::Repository,
    utils,
};

impl Repository {
    /// Check out a branch name or a revision resolving to a commit.
    ///
    /// Without `force`, uncommitted changes to tracked files abort the
    /// operation before anything is touched.
    pub fn checkout(&self, target: &str, force: bool) -> Result<(), GitError> {
        let branch_ref = format!("refs/heads/{target}");
        let (commit_id, new_head) = if self.refs.exists(&branch_ref) {
            let id = self.refs.resolve(&branch_ref)?;
            (id, Head::Branch(target.to_string()))
        } else {
            let id = self.resolve_commit(target)?;
            (id, Head::Detached(id))
        };

        if !force {
            let report = self.status()?;
            if report.has_uncommitted_changes() {
                let path = report
                    .staged
                    .first()
                    .map(|(p, _)| p.clone())
                    .or_else(|| report.unstaged.first().map(|(p, _)| p.clone()))
                    .or_else(|| report.conflicted.first().map(PathBuf::from))
                    .unwrap_or_default();
                return Err(GitError::LocalChangesWouldBeLost(
                    path.display().to_string(),
                ));
            }
        }

        self.materialize_commit(&commit_id)?;
        self.refs.set_head(new_head)?;
        if force {
            // a forced checkout abandons any interrupted merge
            self.clear_merge_state()?;
        }
        debug!(target, %commit_id, "checkout complete");
        Ok(())
    }

    /// Create a branch at the current HEAD commit and check it out.
    pub fn checkout_new_branch(&self, name: &str, force: bool) -> Result<(), GitError> {
        let head = self
            .refs
            .head_commit()?
            .ok_or_else(|| GitError::NotFound("HEAD is unborn".to_string()))?;
        self.refs.create_branch(name, &head)?;
        self.checkout(name, force)
    }

    /// Replace working tree and index with the tree of `commit_id`.
    ///
    /// Files tracked by the index but absent from the target are removed
    /// (with now-empty directories pruned); everything else is written
    /// out with the executable bit restored, and the index is rebuilt
    /// with fresh stat caches.
    pub(crate) fn materialize_commit(&self, commit_id: &ObjectHash) -> Result<(), GitError> {
        let target_items = self.commit_plain_items(commit_id)?;
        let target_paths: std::collections::HashSet<&PathBuf> =
            target_items.iter().map(|(path, _, _)| path).collect();

        // remove tracked files that the target does not contain
        let old_index = self.load_index()?;
        for tracked in old_index.tracked_files() {
            if !target_paths.contains(&tracked) {
                let abs = self.work_dir().join(&tracked);
                match fs::remove_file(&abs) {
                    Ok(()) => utils::clear_empty_dir(&abs, self.work_dir()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(GitError::IOError(e)),
                }
            }
        }

        let mut index = Index::new();
        for (path, hash, mode) in &target_items {
            self.write_blob_to_worktree(hash, path, *mode)?;
            index.add(IndexEntry::new_from_file(path, *hash, self.work_dir())?);
        }
        self.save_index(&index)?;
        Ok(())
    }

    /// Extract one blob to the working tree, restoring its file kind.
    pub(crate) fn write_blob_to_worktree(
        &self,
        hash: &ObjectHash,
        path: &PathBuf,
        mode: TreeItemMode,
    ) -> Result<(), GitError> {
        let blob: Blob = self.storage.load(hash)?;
        let abs = self.work_dir().join(path);

        if mode == TreeItemMode::Link {
            #[cfg(unix)]
            {
                if let Some(parent) = abs.parent() {
                    fs::create_dir_all(parent)?;
                }
                match fs::remove_file(&abs) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(GitError::IOError(e)),
                }
                let target = String::from_utf8_lossy(&blob.data).into_owned();
                std::os::unix::fs::symlink(target, &abs)?;
                return Ok(());
            }
        }

        utils::write_file(&blob.data, &abs)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let executable = mode == TreeItemMode::BlobExecutable;
            let mode_bits = if executable { 0o755 } else { 0o644 };
            fs::set_permissions(&abs, fs::Permissions::from_mode(mode_bits))?;
        }

        Ok(())
    }
}
