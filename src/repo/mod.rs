//! The `Repository` value ties the object storage, staging index,
//! reference store and configuration of one repository together. All
//! operations take it explicitly; the crate keeps no global repository
//! state.

pub mod add;
pub mod ancestry;
pub mod checkout;
pub mod commit;
pub mod diff;
pub mod merge;
pub mod reset;
pub mod status;
pub mod tag;

use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use tracing::debug;

use crate::{
    config::Config,
    errors::GitError,
    hash::{HashKind, ObjectHash, set_hash_kind},
    internal::{
        index::Index,
        object::{
            GitObject,
            signature::{Signature, SignatureType},
            types::ObjectType,
        },
        refs::{Head, RefStore},
    },
    storage::ObjectStorage,
};

const DEFAULT_BRANCH: &str = "main";

/// One open repository: working tree plus git directory.
#[derive(Debug, Clone)]
pub struct Repository {
    work_dir: PathBuf,
    git_dir: PathBuf,
    pub storage: ObjectStorage,
    pub refs: RefStore,
    pub config: Config,
}

impl Repository {
    /// Create the on-disk layout and open the new repository.
    ///
    /// HEAD starts as a symbolic ref to an unborn `main` branch.
    pub fn init(path: impl AsRef<Path>) -> Result<Repository, GitError> {
        let work_dir = path.as_ref().to_path_buf();
        let git_dir = work_dir.join(".git");
        if git_dir.join("HEAD").exists() {
            return Err(GitError::CustomError(format!(
                "repository already exists at {}",
                git_dir.display()
            )));
        }

        fs::create_dir_all(git_dir.join("objects"))?;
        fs::create_dir_all(git_dir.join("refs").join("heads"))?;
        fs::create_dir_all(git_dir.join("refs").join("tags"))?;
        fs::create_dir_all(git_dir.join("info"))?;
        fs::create_dir_all(git_dir.join("hooks"))?;
        fs::write(
            git_dir.join("HEAD"),
            format!("ref: refs/heads/{DEFAULT_BRANCH}\n"),
        )?;
        fs::write(
            git_dir.join("description"),
            "Unnamed repository; edit this file to name the repository.\n",
        )?;
        fs::write(git_dir.join("info").join("exclude"), "")?;

        let mut config = Config::new();
        config.set("core", None, "repositoryformatversion", "0");
        config.set("core", None, "filemode", "true");
        config.set("core", None, "bare", "false");
        config.save(git_dir.join("config"))?;

        debug!(path = %work_dir.display(), "initialized empty repository");
        Self::open(&work_dir)
    }

    /// Open an existing repository.
    ///
    /// `GIT_DIR` / `GIT_WORK_TREE` override discovery; otherwise the git
    /// directory is searched for as `.git` from `path` upward.
    pub fn open(path: impl AsRef<Path>) -> Result<Repository, GitError> {
        let (work_dir, git_dir) = match env::var_os("GIT_DIR") {
            Some(dir) => {
                let git_dir = PathBuf::from(dir);
                let work_dir = env::var_os("GIT_WORK_TREE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| path.as_ref().to_path_buf());
                (work_dir, git_dir)
            }
            None => {
                let mut current = Some(path.as_ref().to_path_buf());
                let mut found = None;
                while let Some(dir) = current {
                    let candidate = dir.join(".git");
                    if candidate.join("HEAD").exists() {
                        found = Some((dir.clone(), candidate));
                        break;
                    }
                    current = dir.parent().map(Path::to_path_buf);
                }
                found.ok_or(GitError::RepoNotFound)?
            }
        };

        if !git_dir.join("HEAD").exists() {
            return Err(GitError::RepoNotFound);
        }

        let config = Config::load(git_dir.join("config"))?;
        if let Some(version) = config.get("core", None, "repositoryformatversion")
            && version != "0"
        {
            return Err(GitError::CustomError(format!(
                "unsupported repositoryformatversion {version}"
            )));
        }
        // SHA-256 repositories declare themselves via the objectformat extension.
        let kind = config
            .get("extensions", None, "objectformat")
            .and_then(|v| HashKind::from_str(&v).ok())
            .unwrap_or(HashKind::Sha1);
        set_hash_kind(kind);

        let storage = ObjectStorage::init(git_dir.join("objects"));
        let refs = RefStore::new(git_dir.clone());
        Ok(Repository {
            work_dir,
            git_dir,
            storage,
            refs,
            config,
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.git_dir.join("index")
    }

    pub fn load_index(&self) -> Result<Index, GitError> {
        Index::load(self.index_path())
    }

    pub fn save_index(&self, index: &Index) -> Result<(), GitError> {
        index.save(self.index_path())
    }

    /// Read a working-tree file the way it will be hashed: symlinks
    /// contribute their target path as content.
    pub fn read_workfile(&self, abs: &Path) -> Result<Vec<u8>, GitError> {
        let meta = fs::symlink_metadata(abs)
            .map_err(|_| GitError::NotFound(abs.display().to_string()))?;
        if meta.file_type().is_symlink() {
            let target = fs::read_link(abs)?;
            Ok(target.to_string_lossy().into_owned().into_bytes())
        } else {
            Ok(fs::read(abs)?)
        }
    }

    /// Blob hash a working-tree file without storing it.
    pub fn calc_file_blob_hash(&self, abs: &Path) -> Result<ObjectHash, GitError> {
        let content = self.read_workfile(abs)?;
        Ok(ObjectHash::from_type_and_data(ObjectType::Blob, &content))
    }

    /// Resolve a revision expression to an object id.
    ///
    /// Accepted forms: `HEAD`, a branch name, a tag name, a full ref
    /// name, a full or abbreviated (≥4 hex) object id, each optionally
    /// followed by `^N` / `~N` parent navigation.
    pub fn resolve_revision(&self, revision: &str) -> Result<ObjectHash, GitError> {
        let split = revision.find(['~', '^']);
        let (base, navigation) = match split {
            Some(pos) => revision.split_at(pos),
            None => (revision, ""),
        };

        let mut id = self.resolve_base_revision(base)?;
        if !navigation.is_empty() {
            id = self.navigate_commit_path(id, navigation)?;
        }
        Ok(id)
    }

    fn resolve_base_revision(&self, base: &str) -> Result<ObjectHash, GitError> {
        if base == "HEAD" {
            return self
                .refs
                .head_commit()?
                .ok_or_else(|| GitError::NotFound("HEAD is unborn".to_string()));
        }
        for candidate in [
            format!("refs/heads/{base}"),
            format!("refs/tags/{base}"),
            base.to_string(),
        ] {
            if let Some(id) = self.refs.try_resolve(&candidate)? {
                return Ok(id);
            }
        }
        if base.len() == crate::hash::get_hash_kind().hex_len()
            && let Ok(id) = ObjectHash::from_str(base)
        {
            if self.storage.exist(&id) {
                return Ok(id);
            }
            return Err(GitError::ObjectNotFound(base.to_string()));
        }
        self.storage.resolve_prefix(base)
    }

    /// Resolve a revision and peel annotated tags down to a commit id.
    pub fn resolve_commit(&self, revision: &str) -> Result<ObjectHash, GitError> {
        let mut id = self.resolve_revision(revision)?;
        // tags may point at tags; peel a bounded number of times
        for _ in 0..8 {
            match self.storage.load_any(&id)? {
                GitObject::Tag(tag) => id = tag.object_id,
                GitObject::Commit(_) => return Ok(id),
                other => {
                    return Err(GitError::InvalidArgument(format!(
                        "revision `{revision}` names a {}, not a commit",
                        other.get_type()
                    )));
                }
            }
        }
        Err(GitError::InvalidArgument(format!(
            "tag chain too deep resolving `{revision}`"
        )))
    }

    /// `^N` selects the Nth parent; `~N` walks N first parents.
    fn navigate_commit_path(
        &self,
        base_commit: ObjectHash,
        path: &str,
    ) -> Result<ObjectHash, GitError> {
        let mut current = base_commit;
        let mut chars = path.chars().peekable();
        while let Some(symbol) = chars.next() {
            if symbol != '^' && symbol != '~' {
                return Err(GitError::InvalidArgument(format!(
                    "Invalid reference path: {path}"
                )));
            }
            let mut digits = String::new();
            while let Some(c) = chars.peek().filter(|c| c.is_ascii_digit()) {
                digits.push(*c);
                chars.next();
            }
            let num: usize = if digits.is_empty() {
                1
            } else {
                digits
                    .parse()
                    .map_err(|_| GitError::InvalidArgument(path.to_string()))?
            };

            match symbol {
                '^' => current = self.get_parent_commit(&current, num)?,
                '~' => {
                    for _ in 0..num {
                        current = self.get_parent_commit(&current, 1)?;
                    }
                }
                _ => unreachable!(),
            }
        }
        Ok(current)
    }

    fn get_parent_commit(
        &self,
        commit_id: &ObjectHash,
        n: usize,
    ) -> Result<ObjectHash, GitError> {
        let commit: crate::internal::object::commit::Commit = self.storage.load(commit_id)?;
        if n == 0 || n > commit.parent_commit_ids.len() {
            return Err(GitError::ObjectNotFound(format!(
                "Parent {n} does not exist"
            )));
        }
        Ok(commit.parent_commit_ids[n - 1])
    }

    /// Default identity for new commits/tags: environment overrides
    /// (`GIT_AUTHOR_*` / `GIT_COMMITTER_*`) first, then `user.*` config.
    pub fn default_signature(&self, signature_type: SignatureType) -> Signature {
        let (name_var, email_var, date_var) = match signature_type {
            SignatureType::Committer => (
                "GIT_COMMITTER_NAME",
                "GIT_COMMITTER_EMAIL",
                "GIT_COMMITTER_DATE",
            ),
            _ => ("GIT_AUTHOR_NAME", "GIT_AUTHOR_EMAIL", "GIT_AUTHOR_DATE"),
        };

        let name = env::var(name_var)
            .ok()
            .or_else(|| self.config.get("user", None, "name"))
            .unwrap_or_else(|| "unknown".to_string());
        let email = env::var(email_var)
            .ok()
            .or_else(|| self.config.get("user", None, "email"))
            .unwrap_or_else(|| "unknown".to_string());

        // `<unix-seconds> <timezone>` as written by `git var`-style tooling
        if let Ok(date) = env::var(date_var)
            && let Some((seconds, timezone)) = date.split_once(' ')
            && let Ok(seconds) = seconds.parse::<i64>()
        {
            return Signature::from_parts(
                signature_type,
                name,
                email,
                seconds,
                timezone.to_string(),
            );
        }
        Signature::new(signature_type, name, email)
    }

    /// Current HEAD state.
    pub fn head(&self) -> Result<Head, GitError> {
        self.refs.head()
    }

    /// All the items of a tree, recursively, as workdir-relative paths
    /// with their blob ids and modes.
    pub fn tree_plain_items(
        &self,
        tree_id: &ObjectHash,
    ) -> Result<Vec<(PathBuf, ObjectHash, crate::internal::object::tree::TreeItemMode)>, GitError>
    {
        use crate::internal::object::tree::{Tree, TreeItemMode};

        let mut items = Vec::new();
        let tree: Tree = self.storage.load(tree_id)?;
        for item in tree.tree_items.iter() {
            if item.mode != TreeItemMode::Tree {
                items.push((PathBuf::from(item.name.clone()), item.id, item.mode));
            } else {
                let sub_entries = self.tree_plain_items(&item.id)?;
                items.extend(sub_entries.into_iter().map(|(path, hash, mode)| {
                    (PathBuf::from(item.name.clone()).join(path), hash, mode)
                }));
            }
        }
        Ok(items)
    }

    /// The flattened `(path, blob)` view of a commit's tree.
    pub fn commit_plain_items(
        &self,
        commit_id: &ObjectHash,
    ) -> Result<Vec<(PathBuf, ObjectHash, crate::internal::object::tree::TreeItemMode)>, GitError>
    {
        let commit: crate::internal::object::commit::Commit = self.storage.load(commit_id)?;
        self.tree_plain_items(&commit.tree_id)
    }
}
