//! The staging index: the totally-ordered set of files staged for the
//! next commit, with a stat cache to short-circuit unchanged-file
//! detection.
//!
//! On-disk form is the `DIRC` binary format: a 12-byte header, one
//! fixed-layout record per entry (big-endian integers, NUL-padded to an
//! 8-byte multiple), and a trailing checksum over everything before it.
//! Entries are keyed by `(path, stage)`; stage 0 is the normal staged
//! entry, stages 1/2/3 hold base/ours/theirs during a conflicted merge.
//!
//! Writers serialize through `index.lock`: the new file is staged there
//! and renamed over `index`, so a concurrent writer observes `LockBusy`
//! and readers never see a torn file.

use std::{
    collections::BTreeMap,
    fs,
    io::{Cursor, Read},
    path::{Path, PathBuf},
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::{
    errors::GitError,
    hash::{ObjectHash, get_hash_kind},
    internal::object::types::ObjectType,
    utils::{HashAlgorithm, Lockfile},
};

const INDEX_SIGNATURE: &[u8; 4] = b"DIRC";
const INDEX_VERSION: u32 = 2;

/// Seconds/nanoseconds pair as stored in the stat cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Time {
    pub seconds: u32,
    pub nanos: u32,
}

impl Time {
    fn from_system_time(t: std::time::SystemTime) -> Time {
        match t.duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => Time {
                seconds: d.as_secs() as u32,
                nanos: d.subsec_nanos(),
            },
            Err(_) => Time::default(),
        }
    }
}

/// One staged file: `(path, mode, object_id, size)` plus enough cached
/// filesystem metadata to skip re-hashing unchanged files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub ctime: Time,
    pub mtime: Time,
    pub dev: u32,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub hash: ObjectHash,
    pub flags: u16,
    /// workdir-relative path with `/` separators
    pub name: String,
}

impl IndexEntry {
    /// Build an entry from a working-tree file, capturing its stat cache.
    /// - `path`: workdir-relative
    pub fn new_from_file(
        path: &Path,
        hash: ObjectHash,
        workdir: &Path,
    ) -> Result<IndexEntry, GitError> {
        let abs = workdir.join(path);
        let meta = fs::symlink_metadata(&abs)?;

        let mode = mode_from_metadata(&meta);
        let name = path
            .to_str()
            .ok_or_else(|| GitError::ConversionError(format!("non-UTF8 path: {path:?}")))?
            .replace('\\', "/");

        let mut entry = IndexEntry {
            ctime: meta
                .created()
                .map(Time::from_system_time)
                .unwrap_or_default(),
            mtime: meta
                .modified()
                .map(Time::from_system_time)
                .unwrap_or_default(),
            dev: 0,
            ino: 0,
            mode,
            uid: 0,
            gid: 0,
            size: meta.len() as u32,
            hash,
            flags: 0,
            name,
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            entry.ctime = Time {
                seconds: meta.ctime() as u32,
                nanos: meta.ctime_nsec() as u32,
            };
            entry.mtime = Time {
                seconds: meta.mtime() as u32,
                nanos: meta.mtime_nsec() as u32,
            };
            entry.dev = meta.dev() as u32;
            entry.ino = meta.ino() as u32;
            entry.uid = meta.uid();
            entry.gid = meta.gid();
        }

        entry.flags = compose_flags(0, entry.name.len());
        Ok(entry)
    }

    /// Build an entry with no stat cache (content known only by blob).
    pub fn new_from_blob(name: String, hash: ObjectHash, size: u32) -> IndexEntry {
        let flags = compose_flags(0, name.len());
        IndexEntry {
            ctime: Time::default(),
            mtime: Time::default(),
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            size,
            hash,
            flags,
            name,
        }
    }

    /// Conflict stage recorded in the flags (0 normal, 1 base, 2 ours, 3 theirs).
    pub fn stage(&self) -> u8 {
        ((self.flags >> 12) & 0x3) as u8
    }

    pub fn set_stage(&mut self, stage: u8) {
        self.flags = compose_flags(stage, self.name.len());
    }
}

fn compose_flags(stage: u8, name_len: usize) -> u16 {
    let len = name_len.min(0xFFF) as u16;
    ((stage as u16 & 0x3) << 12) | len
}

fn mode_from_metadata(meta: &fs::Metadata) -> u32 {
    if meta.file_type().is_symlink() {
        return 0o120000;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 != 0 {
            return 0o100755;
        }
    }
    0o100644
}

/// The staging index. Entries iterate byte-lexicographically by
/// `(path, stage)`, which is also the persisted order.
#[derive(Debug, Default, Clone)]
pub struct Index {
    entries: BTreeMap<(String, u8), IndexEntry>,
}

impl Index {
    pub fn new() -> Index {
        Index::default()
    }

    /// Number of entries across all stages.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace an entry under its `(name, stage)` key.
    pub fn add(&mut self, entry: IndexEntry) {
        self.entries
            .insert((entry.name.clone(), entry.stage()), entry);
    }

    /// Alias of [`Index::add`]; replaces any existing entry.
    pub fn update(&mut self, entry: IndexEntry) {
        self.add(entry);
    }

    /// Remove one `(name, stage)` entry. Returns whether it existed.
    pub fn remove(&mut self, name: &str, stage: u8) -> bool {
        self.entries.remove(&(name.to_string(), stage)).is_some()
    }

    /// Remove every stage of a path.
    pub fn remove_all_stages(&mut self, name: &str) {
        for stage in 0..=3 {
            self.entries.remove(&(name.to_string(), stage));
        }
    }

    pub fn get(&self, name: &str, stage: u8) -> Option<&IndexEntry> {
        self.entries.get(&(name.to_string(), stage))
    }

    pub fn tracked(&self, name: &str, stage: u8) -> bool {
        self.entries.contains_key(&(name.to_string(), stage))
    }

    /// Every distinct tracked path, any stage, as workdir-relative paths.
    pub fn tracked_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = Vec::with_capacity(self.entries.len());
        let mut last: Option<&str> = None;
        for (name, _) in self.entries.keys() {
            if last != Some(name.as_str()) {
                files.push(PathBuf::from(name));
                last = Some(name.as_str());
            }
        }
        files
    }

    /// All entries at the given stage, in persisted order.
    pub fn tracked_entries(&self, stage: u8) -> Vec<&IndexEntry> {
        self.entries
            .values()
            .filter(|entry| entry.stage() == stage)
            .collect()
    }

    /// Whether the entry's recorded blob equals `hash`.
    pub fn verify_hash(&self, name: &str, stage: u8, hash: &ObjectHash) -> bool {
        self.get(name, stage).map(|e| e.hash == *hash).unwrap_or(false)
    }

    /// Stat-cache staleness check: the working file is considered possibly
    /// modified when mtime, size or inode disagree with the cache. Only a
    /// content re-hash may then mark it actually modified.
    pub fn is_modified(&self, name: &str, stage: u8, workdir: &Path) -> bool {
        let Some(entry) = self.get(name, stage) else {
            return true;
        };
        let abs = workdir.join(name);
        let Ok(meta) = fs::symlink_metadata(&abs) else {
            return true;
        };

        #[cfg(not(unix))]
        let mtime = meta
            .modified()
            .map(Time::from_system_time)
            .unwrap_or_default();
        #[cfg(unix)]
        let mtime = {
            use std::os::unix::fs::MetadataExt;
            Time {
                seconds: meta.mtime() as u32,
                nanos: meta.mtime_nsec() as u32,
            }
        };

        if entry.mtime != mtime || entry.size != meta.len() as u32 {
            return true;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            if entry.ino != 0 && entry.ino != meta.ino() as u32 {
                return true;
            }
        }
        false
    }

    /// Re-capture stat caches for stage-0 entries whose content still
    /// matches; stale caches otherwise stay untouched so the next status
    /// re-hashes them.
    pub fn refresh(&mut self, workdir: &Path) {
        let names: Vec<String> = self
            .tracked_entries(0)
            .iter()
            .map(|e| e.name.clone())
            .collect();
        for name in names {
            if !self.is_modified(&name, 0, workdir) {
                continue;
            }
            let abs = workdir.join(&name);
            let Ok(content) = fs::read(&abs) else { continue };
            let hash = ObjectHash::from_type_and_data(ObjectType::Blob, &content);
            if self.verify_hash(&name, 0, &hash)
                && let Ok(entry) = IndexEntry::new_from_file(Path::new(&name), hash, workdir)
            {
                self.update(entry);
            }
        }
    }

    /// Record a conflict for `name`: stages 1/2/3 for base/ours/theirs,
    /// dropping any stage-0 entry.
    pub fn add_conflict(
        &mut self,
        name: &str,
        base: Option<IndexEntry>,
        ours: Option<IndexEntry>,
        theirs: Option<IndexEntry>,
    ) {
        self.remove(name, 0);
        for (stage, entry) in [(1u8, base), (2, ours), (3, theirs)] {
            if let Some(mut entry) = entry {
                entry.name = name.to_string();
                entry.set_stage(stage);
                self.add(entry);
            }
        }
    }

    /// Resolve a conflict by replacing all stages with one stage-0 entry.
    pub fn resolve_conflict(&mut self, entry: IndexEntry) {
        self.remove_all_stages(&entry.name);
        self.add(entry);
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.values().any(|entry| entry.stage() != 0)
    }

    /// Distinct paths carrying conflict stages, in order.
    pub fn conflicted_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for ((name, stage), _) in self.entries.iter() {
            if *stage != 0 && paths.last().map(String::as_str) != Some(name.as_str()) {
                paths.push(name.clone());
            }
        }
        paths
    }

    /// Load the index from disk; a missing file is an empty index.
    pub fn load(path: impl AsRef<Path>) -> Result<Index, GitError> {
        let path = path.as_ref();
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Index::new()),
            Err(e) => return Err(GitError::IOError(e)),
        };
        Index::from_bytes(&data)
    }

    /// Persist atomically through `index.lock`; a concurrent holder
    /// surfaces as `LockBusy`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), GitError> {
        let mut lock = Lockfile::acquire(path.as_ref())?;
        lock.write_all(&self.to_bytes()?)?;
        lock.commit()?;
        debug!(entries = self.size(), "index saved");
        Ok(())
    }

    fn to_bytes(&self) -> Result<Vec<u8>, GitError> {
        let mut out: Vec<u8> = Vec::with_capacity(64 + self.entries.len() * 80);
        out.extend(INDEX_SIGNATURE);
        out.write_u32::<BigEndian>(INDEX_VERSION)?;
        out.write_u32::<BigEndian>(self.entries.len() as u32)?;

        for entry in self.entries.values() {
            let start = out.len();
            out.write_u32::<BigEndian>(entry.ctime.seconds)?;
            out.write_u32::<BigEndian>(entry.ctime.nanos)?;
            out.write_u32::<BigEndian>(entry.mtime.seconds)?;
            out.write_u32::<BigEndian>(entry.mtime.nanos)?;
            out.write_u32::<BigEndian>(entry.dev)?;
            out.write_u32::<BigEndian>(entry.ino)?;
            out.write_u32::<BigEndian>(entry.mode)?;
            out.write_u32::<BigEndian>(entry.uid)?;
            out.write_u32::<BigEndian>(entry.gid)?;
            out.write_u32::<BigEndian>(entry.size)?;
            out.extend(entry.hash.as_ref());
            out.write_u16::<BigEndian>(entry.flags)?;
            out.extend(entry.name.as_bytes());

            // NUL-pad so the record length is a multiple of 8 (1..=8 NULs).
            let len = out.len() - start;
            let pad = 8 - (len % 8);
            out.extend(std::iter::repeat_n(0u8, pad));
        }

        let mut hasher = HashAlgorithm::new();
        hasher.update(&out);
        out.extend(hasher.finalize());
        Ok(out)
    }

    fn from_bytes(data: &[u8]) -> Result<Index, GitError> {
        let hash_size = get_hash_kind().size();
        if data.len() < 12 + hash_size {
            return Err(GitError::InvalidIndexFile("truncated".to_string()));
        }

        // trailing checksum covers everything before it
        let (body, trailer) = data.split_at(data.len() - hash_size);
        let mut hasher = HashAlgorithm::new();
        hasher.update(body);
        if hasher.finalize() != trailer {
            return Err(GitError::InvalidIndexFile(
                "checksum mismatch".to_string(),
            ));
        }

        let mut cursor = Cursor::new(body);
        let mut signature = [0u8; 4];
        cursor.read_exact(&mut signature)?;
        if &signature != INDEX_SIGNATURE {
            return Err(GitError::InvalidIndexHeader(
                String::from_utf8_lossy(&signature).to_string(),
            ));
        }
        let version = cursor.read_u32::<BigEndian>()?;
        if version != INDEX_VERSION {
            return Err(GitError::InvalidIndexHeader(format!(
                "unsupported version {version}"
            )));
        }
        let count = cursor.read_u32::<BigEndian>()?;

        let mut index = Index::new();
        for _ in 0..count {
            let start = cursor.position() as usize;
            let ctime = Time {
                seconds: cursor.read_u32::<BigEndian>()?,
                nanos: cursor.read_u32::<BigEndian>()?,
            };
            let mtime = Time {
                seconds: cursor.read_u32::<BigEndian>()?,
                nanos: cursor.read_u32::<BigEndian>()?,
            };
            let dev = cursor.read_u32::<BigEndian>()?;
            let ino = cursor.read_u32::<BigEndian>()?;
            let mode = cursor.read_u32::<BigEndian>()?;
            let uid = cursor.read_u32::<BigEndian>()?;
            let gid = cursor.read_u32::<BigEndian>()?;
            let size = cursor.read_u32::<BigEndian>()?;
            let hash = ObjectHash::from_stream(&mut cursor)?;
            let flags = cursor.read_u16::<BigEndian>()?;

            let name_len = (flags & 0xFFF) as usize;
            let name = if name_len < 0xFFF {
                let mut buf = vec![0u8; name_len];
                cursor.read_exact(&mut buf)?;
                String::from_utf8(buf)
                    .map_err(|e| GitError::ConversionError(e.to_string()))?
            } else {
                // long path: scan to the first NUL
                let pos = cursor.position() as usize;
                let end = body[pos..]
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or_else(|| GitError::InvalidIndexFile("unterminated path".to_string()))?;
                let name = String::from_utf8(body[pos..pos + end].to_vec())
                    .map_err(|e| GitError::ConversionError(e.to_string()))?;
                cursor.set_position((pos + end) as u64);
                name
            };

            let len = cursor.position() as usize - start;
            let pad = 8 - (len % 8);
            cursor.set_position(cursor.position() + pad as u64);

            index.add(IndexEntry {
                ctime,
                mtime,
                dev,
                ino,
                mode,
                uid,
                gid,
                size,
                hash,
                flags,
                name,
            });
        }

        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{HashKind, set_hash_kind_for_test};
    use crate::internal::object::blob::Blob;

    fn entry(name: &str, content: &str) -> IndexEntry {
        let blob = Blob::from_content(content);
        IndexEntry::new_from_blob(name.to_string(), blob.id, blob.data.len() as u32)
    }

    #[test]
    fn test_entries_iterate_in_path_order() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let mut index = Index::new();
        index.add(entry("b", "1"));
        index.add(entry("a", "2"));
        index.add(entry("a.txt", "3"));

        let names: Vec<&str> = index
            .tracked_entries(0)
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "a.txt", "b"]);
    }

    #[test]
    fn test_save_load_round_trip() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index");

        let mut index = Index::new();
        index.add(entry("src/main.rs", "fn main() {}\n"));
        index.add(entry("README", "# hi\n"));
        index.save(&path).unwrap();

        let loaded = Index::load(&path).unwrap();
        assert_eq!(loaded.size(), 2);
        let original = index.get("src/main.rs", 0).unwrap();
        let restored = loaded.get("src/main.rs", 0).unwrap();
        assert_eq!(restored, original);
    }

    /// SHA-256 entries persist 32-byte ids and a 32-byte trailer; both
    /// must survive a save/load cycle.
    #[test]
    fn test_sha256_save_load_round_trip() {
        let _guard = set_hash_kind_for_test(HashKind::Sha256);
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index");

        let mut index = Index::new();
        index.add(entry("wide/ids.rs", "fn wide() {}\n"));
        index.add(entry("top", "content\n"));
        index.save(&path).unwrap();

        let loaded = Index::load(&path).unwrap();
        assert_eq!(loaded.size(), 2);
        let original = index.get("wide/ids.rs", 0).unwrap();
        let restored = loaded.get("wide/ids.rs", 0).unwrap();
        assert_eq!(restored, original);
        assert_eq!(restored.hash.kind(), crate::hash::HashKind::Sha256);

        // flipping a byte must break the 32-byte trailer check too
        let mut bytes = fs::read(&path).unwrap();
        bytes[13] ^= 0x01;
        fs::write(&path, bytes).unwrap();
        assert!(Index::load(&path).is_err());
    }

    #[test]
    fn test_checksum_verified_on_load() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index");

        let mut index = Index::new();
        index.add(entry("file", "content"));
        index.save(&path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[13] ^= 0x01;
        fs::write(&path, bytes).unwrap();

        assert!(Index::load(&path).is_err());
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let index = Index::load(tmp.path().join("index")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_save_respects_existing_lock() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index");

        let _lock = Lockfile::acquire(&path).unwrap();
        let index = Index::new();
        assert!(matches!(index.save(&path), Err(GitError::LockBusy(_))));
    }

    #[test]
    fn test_conflict_stages() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let mut index = Index::new();
        index.add(entry("x", "A\n"));
        index.add_conflict(
            "x",
            Some(entry("x", "A\n")),
            Some(entry("x", "B\n")),
            Some(entry("x", "C\n")),
        );

        assert!(index.has_conflicts());
        assert!(!index.tracked("x", 0));
        assert_eq!(index.get("x", 1).unwrap().stage(), 1);
        assert_eq!(index.get("x", 2).unwrap().stage(), 2);
        assert_eq!(index.get("x", 3).unwrap().stage(), 3);
        assert_eq!(index.conflicted_paths(), vec!["x".to_string()]);

        index.resolve_conflict(entry("x", "B\n"));
        assert!(!index.has_conflicts());
        assert!(index.tracked("x", 0));
    }

    #[test]
    fn test_stat_cache_detects_change() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let tmp = tempfile::tempdir().unwrap();
        let workdir = tmp.path();
        fs::write(workdir.join("f"), "one").unwrap();

        let blob = Blob::from_content("one");
        let e = IndexEntry::new_from_file(Path::new("f"), blob.id, workdir).unwrap();
        let mut index = Index::new();
        index.add(e);

        assert!(!index.is_modified("f", 0, workdir));

        // size change is always a cache mismatch
        fs::write(workdir.join("f"), "three").unwrap();
        assert!(index.is_modified("f", 0, workdir));
    }
}
