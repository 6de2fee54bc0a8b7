//! Named, atomic pointers into the object graph: loose ref files under
//! `refs/`, the symbolic `HEAD`, and the update discipline that keeps
//! them consistent.
//!
//! Every mutation goes through the `<refname>.lock` exclusive-create
//! protocol, so writers of the same ref serialize while writers of
//! distinct refs never contend. Readers only ever observe a fully
//! written value because the lockfile is renamed into place.

use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use tracing::debug;

use crate::{errors::GitError, hash::ObjectHash, utils::Lockfile};

/// Maximum symbolic-ref hops before declaring a cycle.
const MAX_SYMREF_DEPTH: usize = 5;

const SYMREF_PREFIX: &str = "ref: ";

/// Where HEAD points: at a branch by name, or directly at a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    Detached(ObjectHash),
    Branch(String),
}

/// Expectation for a compare-and-swap ref update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefExpectation {
    /// Write unconditionally.
    Any,
    /// The ref must not exist yet.
    Absent,
    /// The ref must currently equal this id.
    Exactly(ObjectHash),
}

/// Loose-ref store rooted at a repository's git directory.
#[derive(Debug, Clone)]
pub struct RefStore {
    git_dir: PathBuf,
}

impl RefStore {
    pub fn new(git_dir: PathBuf) -> RefStore {
        RefStore { git_dir }
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        self.git_dir.join(name)
    }

    /// Validate a ref name against Git's rules.
    pub fn validate_name(name: &str) -> Result<(), GitError> {
        let bad = |why: &str| Err(GitError::InvalidRef(name.to_string(), why.to_string()));

        if name.is_empty() {
            return bad("empty name");
        }
        if name.starts_with('-') {
            return bad("starts with `-`");
        }
        if name.ends_with('.') || name.ends_with('/') {
            return bad("bad trailing character");
        }
        if name.ends_with(".lock") {
            return bad("ends with `.lock`");
        }
        if name.contains("..") {
            return bad("contains `..`");
        }
        for c in name.chars() {
            if c.is_ascii_control() || matches!(c, ' ' | '~' | '^' | ':' | '\\' | '?' | '*' | '[')
            {
                return bad("contains a forbidden character");
            }
        }
        for segment in name.split('/') {
            if segment.is_empty() {
                return bad("empty path segment");
            }
            if segment.starts_with('.') {
                return bad("segment starts with `.`");
            }
        }
        Ok(())
    }

    /// Raw single-line content of a ref file, if present.
    fn read_raw(&self, name: &str) -> Result<Option<String>, GitError> {
        match fs::read_to_string(self.ref_path(name)) {
            Ok(content) => Ok(Some(content.trim_end().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GitError::IOError(e)),
        }
    }

    /// Follow symbolic refs until a direct target is reached.
    ///
    /// Fails with `NotFound` for a missing ref and `InvalidRef` when the
    /// chase exceeds the depth limit (a cycle, in practice).
    pub fn resolve(&self, name: &str) -> Result<ObjectHash, GitError> {
        let mut current = name.to_string();
        for _ in 0..=MAX_SYMREF_DEPTH {
            let content = self
                .read_raw(&current)?
                .ok_or_else(|| GitError::NotFound(current.clone()))?;
            if let Some(target) = content.strip_prefix(SYMREF_PREFIX) {
                current = target.to_string();
                continue;
            }
            return ObjectHash::from_str(&content)
                .map_err(|_| GitError::InvalidRef(current.clone(), "malformed target".into()));
        }
        Err(GitError::InvalidRef(
            name.to_string(),
            format!("symbolic chain deeper than {MAX_SYMREF_DEPTH}"),
        ))
    }

    /// Like [`RefStore::resolve`], but absence is `None` instead of an error.
    pub fn try_resolve(&self, name: &str) -> Result<Option<ObjectHash>, GitError> {
        match self.resolve(name) {
            Ok(id) => Ok(Some(id)),
            Err(GitError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether the ref file itself exists (symbolic or direct).
    pub fn exists(&self, name: &str) -> bool {
        self.ref_path(name).exists()
    }

    /// Compare-and-swap update of a direct ref.
    ///
    /// The current value is read under `<refname>.lock`, checked against
    /// `expected`, and the new value is published by rename. A mismatch
    /// surfaces as `StaleRef` and leaves the ref untouched.
    pub fn update(
        &self,
        name: &str,
        new_id: &ObjectHash,
        expected: RefExpectation,
    ) -> Result<(), GitError> {
        Self::validate_name(name)?;
        let path = self.ref_path(name);
        let mut lock = Lockfile::acquire(&path)?;

        let current = self.read_raw(name)?;
        match (&expected, &current) {
            (RefExpectation::Any, _) => {}
            (RefExpectation::Absent, None) => {}
            (RefExpectation::Absent, Some(found)) => {
                let err = GitError::StaleRef(name.to_string(), "<absent>".into(), found.clone());
                lock.rollback()?;
                return Err(err);
            }
            (RefExpectation::Exactly(want), Some(found)) if found == &want.to_string() => {}
            (RefExpectation::Exactly(want), found) => {
                let err = GitError::StaleRef(
                    name.to_string(),
                    want.to_string(),
                    found.clone().unwrap_or_else(|| "<absent>".into()),
                );
                lock.rollback()?;
                return Err(err);
            }
        }

        lock.write_all(format!("{new_id}\n").as_bytes())?;
        lock.commit()?;
        debug!(name, id = %new_id, "ref updated");
        Ok(())
    }

    /// Delete a ref. The lock is taken so a concurrent updater can't race
    /// the removal.
    pub fn delete(&self, name: &str) -> Result<(), GitError> {
        let path = self.ref_path(name);
        let lock = Lockfile::acquire(&path)?;
        if !path.exists() {
            lock.rollback()?;
            return Err(GitError::NotFound(name.to_string()));
        }
        fs::remove_file(&path)?;
        lock.rollback()?;
        Ok(())
    }

    /// All direct refs under a name prefix (e.g. `refs/heads/`), sorted.
    pub fn list(&self, prefix: &str) -> Result<Vec<(String, ObjectHash)>, GitError> {
        let mut result = Vec::new();
        let root = self.ref_path(prefix);
        if root.is_dir() {
            self.walk_refs(&root, prefix.trim_end_matches('/'), &mut result)?;
        } else if root.is_file()
            && let Some(id) = self.try_resolve(prefix)?
        {
            result.push((prefix.to_string(), id));
        }
        result.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(result)
    }

    fn walk_refs(
        &self,
        dir: &Path,
        prefix: &str,
        out: &mut Vec<(String, ObjectHash)>,
    ) -> Result<(), GitError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.ends_with(".lock") {
                continue;
            }
            let name = format!("{prefix}/{file_name}");
            if entry.file_type()?.is_dir() {
                self.walk_refs(&entry.path(), &name, out)?;
            } else if let Some(id) = self.try_resolve(&name)? {
                out.push((name, id));
            }
        }
        Ok(())
    }

    /// Current HEAD, symbolic or detached.
    pub fn head(&self) -> Result<Head, GitError> {
        let content = self
            .read_raw("HEAD")?
            .ok_or(GitError::RepoNotFound)?;
        if let Some(target) = content.strip_prefix(SYMREF_PREFIX) {
            let branch = target
                .strip_prefix("refs/heads/")
                .unwrap_or(target)
                .to_string();
            Ok(Head::Branch(branch))
        } else {
            let id = ObjectHash::from_str(&content)
                .map_err(|_| GitError::InvalidRef("HEAD".into(), "malformed target".into()))?;
            Ok(Head::Detached(id))
        }
    }

    /// The commit HEAD resolves to; `None` on an unborn branch.
    pub fn head_commit(&self) -> Result<Option<ObjectHash>, GitError> {
        match self.head()? {
            Head::Detached(id) => Ok(Some(id)),
            Head::Branch(name) => self.try_resolve(&format!("refs/heads/{name}")),
        }
    }

    /// Branch name when HEAD is symbolic.
    pub fn current_branch(&self) -> Result<Option<String>, GitError> {
        match self.head()? {
            Head::Branch(name) => Ok(Some(name)),
            Head::Detached(_) => Ok(None),
        }
    }

    /// Point HEAD at a branch or directly at a commit, atomically.
    pub fn set_head(&self, new_head: Head) -> Result<(), GitError> {
        let content = match &new_head {
            Head::Branch(name) => {
                Self::validate_name(&format!("refs/heads/{name}"))?;
                format!("{SYMREF_PREFIX}refs/heads/{name}\n")
            }
            Head::Detached(id) => format!("{id}\n"),
        };
        let mut lock = Lockfile::acquire(self.git_dir.join("HEAD"))?;
        lock.write_all(content.as_bytes())?;
        lock.commit()?;
        debug!(?new_head, "HEAD moved");
        Ok(())
    }

    /// Create `refs/heads/<name>` at the given commit; the branch must
    /// not already exist.
    pub fn create_branch(&self, name: &str, id: &ObjectHash) -> Result<(), GitError> {
        self.update(
            &format!("refs/heads/{name}"),
            id,
            RefExpectation::Absent,
        )
    }
}
