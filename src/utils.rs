//! Shared I/O utilities for git-engine: streaming hash helpers and the
//! lockfile discipline used by the index and the reference store.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use sha1::{Digest, Sha1};

use crate::{
    errors::GitError,
    hash::{HashKind, get_hash_kind},
};

/// a hash abstraction to support both SHA1 and SHA256
/// which for stream hashing handle use (e.g. Sha1::new())
/// `std::io::Write` trait to update the hash state
#[derive(Clone)]
pub enum HashAlgorithm {
    Sha1(Sha1),
    Sha256(sha2::Sha256),
}
impl HashAlgorithm {
    /// Update hash with data
    pub fn update(&mut self, data: &[u8]) {
        match self {
            HashAlgorithm::Sha1(hasher) => hasher.update(data),
            HashAlgorithm::Sha256(hasher) => hasher.update(data),
        }
    }
    /// Finalize and get hash result
    pub fn finalize(self) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1(hasher) => hasher.finalize().to_vec(),
            HashAlgorithm::Sha256(hasher) => hasher.finalize().to_vec(),
        }
    }
    pub fn new() -> Self {
        match get_hash_kind() {
            HashKind::Sha1 => HashAlgorithm::Sha1(Sha1::new()),
            HashKind::Sha256 => HashAlgorithm::Sha256(sha2::Sha256::new()),
        }
    }
}
impl io::Write for HashAlgorithm {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive-create lockfile guarding a single mutable resource
/// (the index, one ref, HEAD).
///
/// Writers stage the new content into `<path>.lock` and publish it with
/// an atomic rename; a concurrent holder surfaces as `LockBusy`. Dropping
/// an uncommitted lock removes the lockfile.
pub struct Lockfile {
    target: PathBuf,
    lock_path: PathBuf,
    file: Option<fs::File>,
}

impl Lockfile {
    /// Acquire `<target>.lock` with exclusive-create semantics.
    pub fn acquire(target: impl AsRef<Path>) -> Result<Self, GitError> {
        let target = target.as_ref().to_path_buf();
        let lock_path = lock_path_for(&target);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    GitError::LockBusy(lock_path.display().to_string())
                } else {
                    GitError::IOError(e)
                }
            })?;
        Ok(Lockfile {
            target,
            lock_path,
            file: Some(file),
        })
    }

    /// Stage bytes into the lockfile.
    pub fn write_all(&mut self, data: &[u8]) -> Result<(), GitError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| GitError::CustomError("lockfile already committed".to_string()))?;
        file.write_all(data)?;
        Ok(())
    }

    /// Fsync and rename the lockfile over the target, releasing the lock.
    pub fn commit(mut self) -> Result<(), GitError> {
        let file = self
            .file
            .take()
            .ok_or_else(|| GitError::CustomError("lockfile already committed".to_string()))?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.lock_path, &self.target)?;
        Ok(())
    }

    /// Release the lock without publishing anything.
    pub fn rollback(mut self) -> Result<(), GitError> {
        if self.file.take().is_some() {
            fs::remove_file(&self.lock_path)?;
        }
        Ok(())
    }

    /// Path of the guarded resource.
    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

/// Write `data` to `path`, creating parent directories as needed.
pub fn write_file(data: &[u8], path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)
}

/// Remove now-empty parent directories after a file deletion, stopping
/// at `stop` (the working tree root).
pub fn clear_empty_dir(path: &Path, stop: &Path) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == stop || fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lockfile_blocks_second_writer() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");

        let first = Lockfile::acquire(&target).unwrap();
        let second = Lockfile::acquire(&target);
        assert!(matches!(second, Err(GitError::LockBusy(_))));
        drop(first);

        // released on drop, a new writer may take it
        let third = Lockfile::acquire(&target).unwrap();
        third.rollback().unwrap();
    }

    #[test]
    fn lockfile_commit_publishes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("HEAD");

        let mut lock = Lockfile::acquire(&target).unwrap();
        lock.write_all(b"ref: refs/heads/main\n").unwrap();
        lock.commit().unwrap();

        assert_eq!(
            fs::read_to_string(&target).unwrap(),
            "ref: refs/heads/main\n"
        );
        assert!(!target.with_file_name("HEAD.lock").exists());
    }
}
