//! The three diff shapes: working tree vs index, index vs commit
//! (`cached`), and commit vs commit. Each produces per-file unified
//! diffs through the Myers machinery in [`crate::diff`].

use std::path::PathBuf;

use crate::{
    diff::{Diff, DiffItem},
    errors::GitError,
    hash::ObjectHash,
    repo::Repository,
};

/// Default unified-diff context width.
pub const DEFAULT_CONTEXT: usize = 3;

impl Repository {
    /// Working tree vs index.
    pub fn diff_worktree(
        &self,
        pathspec: Vec<PathBuf>,
        context: usize,
    ) -> Result<Vec<DiffItem>, GitError> {
        let old_blobs = self.index_blobs()?;
        let new_blobs = self.worktree_blobs()?;
        Ok(self.run_diff(old_blobs, new_blobs, pathspec, context))
    }

    /// Index vs a commit (HEAD when `commit` is `None`).
    pub fn diff_cached(
        &self,
        commit: Option<&str>,
        pathspec: Vec<PathBuf>,
        context: usize,
    ) -> Result<Vec<DiffItem>, GitError> {
        let old_blobs = match commit {
            Some(revision) => self.commit_blobs(&self.resolve_commit(revision)?)?,
            None => match self.refs.head_commit()? {
                Some(head) => self.commit_blobs(&head)?,
                None => Vec::new(),
            },
        };
        let new_blobs = self.index_blobs()?;
        Ok(self.run_diff(old_blobs, new_blobs, pathspec, context))
    }

    /// One commit vs another.
    pub fn diff_commits(
        &self,
        old: &str,
        new: &str,
        pathspec: Vec<PathBuf>,
        context: usize,
    ) -> Result<Vec<DiffItem>, GitError> {
        let old_blobs = self.commit_blobs(&self.resolve_commit(old)?)?;
        let new_blobs = self.commit_blobs(&self.resolve_commit(new)?)?;
        Ok(self.run_diff(old_blobs, new_blobs, pathspec, context))
    }

    fn run_diff(
        &self,
        old_blobs: Vec<(PathBuf, ObjectHash)>,
        new_blobs: Vec<(PathBuf, ObjectHash)>,
        pathspec: Vec<PathBuf>,
        context: usize,
    ) -> Vec<DiffItem> {
        Diff::diff(old_blobs, new_blobs, context, pathspec, |path, hash| {
            // worktree-side hashes may not be stored; fall back to the file
            match self.storage.get(hash) {
                Ok(data) => data,
                Err(_) => self
                    .read_workfile(&self.work_dir().join(path))
                    .unwrap_or_default(),
            }
        })
    }

    fn commit_blobs(
        &self,
        commit_id: &ObjectHash,
    ) -> Result<Vec<(PathBuf, ObjectHash)>, GitError> {
        Ok(self
            .commit_plain_items(commit_id)?
            .into_iter()
            .map(|(path, hash, _)| (path, hash))
            .collect())
    }

    fn index_blobs(&self) -> Result<Vec<(PathBuf, ObjectHash)>, GitError> {
        let index = self.load_index()?;
        Ok(index
            .tracked_entries(0)
            .into_iter()
            .map(|entry| (PathBuf::from(&entry.name), entry.hash))
            .collect())
    }

    /// The `(path, blob)` view of tracked files as they exist on disk;
    /// vanished files are omitted (they diff as deletions).
    fn worktree_blobs(&self) -> Result<Vec<(PathBuf, ObjectHash)>, GitError> {
        let index = self.load_index()?;
        let mut blobs = Vec::new();
        for entry in index.tracked_entries(0) {
            let path = PathBuf::from(&entry.name);
            let abs = self.work_dir().join(&path);
            if !abs.exists() && !abs.is_symlink() {
                continue;
            }
            let hash = if index.is_modified(&entry.name, 0, self.work_dir()) {
                self.calc_file_blob_hash(&abs)?
            } else {
                entry.hash
            };
            blobs.push((path, hash));
        }
        Ok(blobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{HashKind, set_hash_kind_for_test};
    use crate::internal::object::signature::{Signature, SignatureType};
    use crate::repo::commit::CommitOptions;
    use std::fs;

    fn fixture() -> (tempfile::TempDir, Repository) {
        let tmp = tempfile::tempdir().unwrap();
        let repo = Repository::init(tmp.path()).unwrap();
        (tmp, repo)
    }

    fn opts() -> CommitOptions {
        let sig = |t| {
            Signature::from_parts(t, "Ada".into(), "ada@x".into(), 1700000000, "+0000".into())
        };
        CommitOptions {
            author: Some(sig(SignatureType::Author)),
            committer: Some(sig(SignatureType::Committer)),
            allow_empty: false,
        }
    }

    #[test]
    fn test_worktree_diff_shows_unstaged_edit() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let (tmp, repo) = fixture();
        fs::write(tmp.path().join("f"), "old line\n").unwrap();
        repo.add(&[], false).unwrap();
        repo.commit("init", opts()).unwrap();

        fs::write(tmp.path().join("f"), "a different line\n").unwrap();

        let items = repo.diff_worktree(vec![], DEFAULT_CONTEXT).unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].data.contains("-old line"));
        assert!(items[0].data.contains("+a different line"));

        // staged side unchanged
        let cached = repo.diff_cached(None, vec![], DEFAULT_CONTEXT).unwrap();
        assert!(cached.is_empty());
    }

    #[test]
    fn test_cached_diff_shows_staged_edit() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let (tmp, repo) = fixture();
        fs::write(tmp.path().join("f"), "old\n").unwrap();
        repo.add(&[], false).unwrap();
        repo.commit("init", opts()).unwrap();

        fs::write(tmp.path().join("f"), "staged\n").unwrap();
        repo.add(&[], false).unwrap();

        let cached = repo.diff_cached(None, vec![], DEFAULT_CONTEXT).unwrap();
        assert_eq!(cached.len(), 1);
        assert!(cached[0].data.contains("+staged"));

        let worktree = repo.diff_worktree(vec![], DEFAULT_CONTEXT).unwrap();
        assert!(worktree.is_empty());
    }

    #[test]
    fn test_commit_to_commit_diff() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let (tmp, repo) = fixture();
        fs::write(tmp.path().join("f"), "v1\n").unwrap();
        repo.add(&[], false).unwrap();
        repo.commit("one", opts()).unwrap();
        fs::write(tmp.path().join("f"), "v2\n").unwrap();
        repo.add(&[], false).unwrap();
        repo.commit("two", opts()).unwrap();

        let items = repo
            .diff_commits("HEAD~1", "HEAD", vec![], DEFAULT_CONTEXT)
            .unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].data.contains("-v1"));
        assert!(items[0].data.contains("+v2"));
    }

    #[test]
    fn test_pathspec_filters_output() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let (tmp, repo) = fixture();
        fs::write(tmp.path().join("a"), "1\n").unwrap();
        fs::write(tmp.path().join("b"), "2\n").unwrap();
        repo.add(&[], false).unwrap();
        repo.commit("init", opts()).unwrap();

        fs::write(tmp.path().join("a"), "1!\n").unwrap();
        fs::write(tmp.path().join("b"), "2!\n").unwrap();

        let items = repo
            .diff_worktree(vec![PathBuf::from("a")], DEFAULT_CONTEXT)
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].path, "a");
    }

    #[test]
    fn test_binary_file_reported_without_hunks() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let (tmp, repo) = fixture();
        fs::write(tmp.path().join("bin"), [0u8, 1, 2, 3]).unwrap();
        repo.add(&[], false).unwrap();
        repo.commit("init", opts()).unwrap();

        fs::write(tmp.path().join("bin"), [9u8, 0, 1]).unwrap();

        let items = repo.diff_worktree(vec![], DEFAULT_CONTEXT).unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].data.contains("Binary files differ"));
    }
}
