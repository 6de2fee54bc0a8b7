//! Loose object storage: one zlib-compressed file per object under
//! `objects/<2-hex>/<rest-hex>`, written atomically and verified on read.
//!
//! The store is append-only: writing an id that already exists is a
//! no-op, and a partially written object is never observable because
//! content is staged into a same-directory temporary file and published
//! with a rename.

use std::{
    fs,
    io::{Read, Write},
    path::PathBuf,
};

use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};
use tracing::debug;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::{GitObject, ObjectTrait, types::ObjectType},
};

/// Handle to one repository's `objects/` directory.
#[derive(Debug, Clone)]
pub struct ObjectStorage {
    base_path: PathBuf,
}

impl ObjectStorage {
    pub fn init(base_path: PathBuf) -> ObjectStorage {
        ObjectStorage { base_path }
    }

    /// `objects/<first two hex chars>/<remaining hex chars>`
    fn object_path(&self, object_id: &ObjectHash) -> PathBuf {
        let hex = object_id.to_string();
        self.base_path.join(&hex[..2]).join(&hex[2..])
    }

    /// Read and verify an object, returning its payload bytes.
    ///
    /// The stored frame is decompressed, re-hashed and compared against
    /// `object_id`; a mismatch or a malformed frame surfaces as
    /// `ObjectCorrupted`.
    pub fn get(&self, object_id: &ObjectHash) -> Result<Vec<u8>, GitError> {
        self.get_with_type(object_id).map(|(data, _)| data)
    }

    /// Read and verify an object, returning payload and type.
    pub fn get_with_type(
        &self,
        object_id: &ObjectHash,
    ) -> Result<(Vec<u8>, ObjectType), GitError> {
        let path = self.object_path(object_id);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GitError::ObjectNotFound(object_id.to_string()));
            }
            Err(e) => return Err(GitError::IOError(e)),
        };

        let framed = Self::decompress_zlib(&compressed)
            .map_err(|e| GitError::ObjectCorrupted(object_id.to_string(), e.to_string()))?;

        let actual = ObjectHash::new(&framed);
        if actual != *object_id {
            return Err(GitError::ObjectCorrupted(
                object_id.to_string(),
                format!("content hashes to {actual}"),
            ));
        }

        let (obj_type, data) = Self::split_frame(&framed)
            .ok_or_else(|| {
                GitError::ObjectCorrupted(object_id.to_string(), "malformed frame".to_string())
            })?;
        Ok((data.to_vec(), obj_type))
    }

    /// Persist payload bytes under `obj_id` with the `<type> SP <size> NUL`
    /// frame. Writing an already-present object succeeds without touching
    /// the store.
    pub fn put(
        &self,
        obj_id: &ObjectHash,
        content: &[u8],
        obj_type: ObjectType,
    ) -> Result<(), GitError> {
        if self.exist(obj_id) {
            return Ok(());
        }

        let mut framed = Vec::with_capacity(content.len() + 16);
        framed.extend(obj_type.to_bytes());
        framed.push(b' ');
        framed.extend(content.len().to_string().as_bytes());
        framed.push(b'\x00');
        framed.extend(content);

        let compressed = Self::compress_zlib(&framed)?;

        let path = self.object_path(obj_id);
        let dir = path
            .parent()
            .ok_or_else(|| GitError::CustomError("object path has no parent".to_string()))?;
        fs::create_dir_all(dir)?;

        // Stage into the same directory so the final rename is atomic.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&compressed)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| GitError::IOError(e.error))?;

        debug!(id = %obj_id, kind = %obj_type, size = content.len(), "stored loose object");
        Ok(())
    }

    /// Side-effect-free existence check.
    pub fn exist(&self, obj_id: &ObjectHash) -> bool {
        self.object_path(obj_id).exists()
    }

    /// Stored type of an object.
    pub fn get_object_type(&self, obj_id: &ObjectHash) -> Result<ObjectType, GitError> {
        self.get_with_type(obj_id).map(|(_, t)| t)
    }

    pub fn is_object_type(&self, obj_id: &ObjectHash, obj_type: ObjectType) -> bool {
        match self.get_object_type(obj_id) {
            Ok(t) => t == obj_type,
            Err(_) => false,
        }
    }

    /// All loose ids whose hex form starts with `prefix` (no minimum length).
    pub fn search(&self, prefix: &str) -> Vec<ObjectHash> {
        use std::str::FromStr;

        let mut result = Vec::new();
        if prefix.len() < 2 || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return result;
        }
        let (fan_out, rest_prefix) = prefix.split_at(2);
        let dir = self.base_path.join(fan_out);
        let Ok(entries) = fs::read_dir(&dir) else {
            return result;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(rest_prefix) {
                let hex = format!("{fan_out}{name}");
                if let Ok(hash) = ObjectHash::from_str(&hex) {
                    result.push(hash);
                }
            }
        }
        result.sort();
        result
    }

    /// Resolve a unique hex prefix of at least 4 characters to a full id.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<ObjectHash, GitError> {
        if prefix.len() < 4 {
            return Err(GitError::InvalidArgument(format!(
                "short id `{prefix}` must be at least 4 hex characters"
            )));
        }
        let matches = self.search(prefix);
        match matches.len() {
            0 => Err(GitError::ObjectNotFound(prefix.to_string())),
            1 => Ok(matches[0]),
            _ => Err(GitError::AmbiguousPrefix(prefix.to_string())),
        }
    }

    /// Decode a typed object, verifying the stored type header matches `T`.
    pub fn load<T: ObjectTrait>(&self, obj_id: &ObjectHash) -> Result<T, GitError> {
        let (data, _) = self.get_with_type(obj_id)?;
        T::from_bytes(&data, *obj_id)
    }

    /// Read an object and dispatch on its stored type.
    pub fn load_any(&self, obj_id: &ObjectHash) -> Result<GitObject, GitError> {
        let (data, obj_type) = self.get_with_type(obj_id)?;
        GitObject::from_bytes(obj_type, &data, *obj_id)
    }

    /// Serialize and persist a typed object, returning its id.
    pub fn save<T: ObjectTrait>(&self, object: &T) -> Result<ObjectHash, GitError> {
        let data = object.to_data()?;
        let id = object.object_hash()?;
        self.put(&id, &data, object.get_type())?;
        Ok(id)
    }

    fn split_frame(framed: &[u8]) -> Option<(ObjectType, &[u8])> {
        let nul = framed.iter().position(|&b| b == 0)?;
        let header = std::str::from_utf8(&framed[..nul]).ok()?;
        let (type_name, size) = header.split_once(' ')?;
        let obj_type = ObjectType::from_string(type_name).ok()?;
        let size: usize = size.parse().ok()?;
        let data = &framed[nul + 1..];
        if data.len() != size {
            return None;
        }
        Some((obj_type, data))
    }

    // Helper functions exposed for tests/utils
    pub fn compress_zlib(data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        let compressed_data = encoder.finish()?;
        Ok(compressed_data)
    }

    pub fn decompress_zlib(data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);
        let mut decompressed_data = Vec::new();
        decoder.read_to_end(&mut decompressed_data)?;
        Ok(decompressed_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{HashKind, set_hash_kind_for_test};
    use crate::internal::object::blob::Blob;

    fn storage_in(dir: &std::path::Path) -> ObjectStorage {
        ObjectStorage::init(dir.join("objects"))
    }

    #[test]
    fn test_put_get_round_trip() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage_in(tmp.path());

        let blob = Blob::from_content("hello\n");
        storage.put(&blob.id, &blob.data, ObjectType::Blob).unwrap();

        assert!(storage.exist(&blob.id));
        let (data, obj_type) = storage.get_with_type(&blob.id).unwrap();
        assert_eq!(data, b"hello\n");
        assert_eq!(obj_type, ObjectType::Blob);
    }

    #[test]
    fn test_put_is_idempotent() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage_in(tmp.path());

        let blob = Blob::from_content("same bytes");
        storage.put(&blob.id, &blob.data, ObjectType::Blob).unwrap();
        storage.put(&blob.id, &blob.data, ObjectType::Blob).unwrap();
        assert_eq!(storage.get(&blob.id).unwrap(), blob.data);
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage_in(tmp.path());

        let blob = Blob::from_content("never stored");
        assert!(matches!(
            storage.get(&blob.id),
            Err(GitError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_corruption_detected_on_read() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage_in(tmp.path());

        let blob = Blob::from_content("corrupt me");
        storage.put(&blob.id, &blob.data, ObjectType::Blob).unwrap();

        // flip one byte of the stored file
        let hex = blob.id.to_string();
        let path = tmp.path().join("objects").join(&hex[..2]).join(&hex[2..]);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            storage.get(&blob.id),
            Err(GitError::ObjectCorrupted(_, _))
        ));
    }

    #[test]
    fn test_prefix_resolution() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage_in(tmp.path());

        let blob = Blob::from_content("hello\n");
        storage.put(&blob.id, &blob.data, ObjectType::Blob).unwrap();

        let hex = blob.id.to_string();
        assert_eq!(storage.resolve_prefix(&hex[..4]).unwrap(), blob.id);
        assert!(matches!(
            storage.resolve_prefix(&hex[..3]),
            Err(GitError::InvalidArgument(_))
        ));
        assert!(matches!(
            storage.resolve_prefix("deadbeef"),
            Err(GitError::ObjectNotFound(_))
        ));
    }

    /// SHA-256 objects file under 64-hex fan-out paths and verify on read.
    #[test]
    fn test_sha256_round_trip_and_prefix() {
        let _guard = set_hash_kind_for_test(HashKind::Sha256);
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage_in(tmp.path());

        let blob = Blob::from_content("wide object\n");
        let hex = blob.id.to_string();
        assert_eq!(hex.len(), 64);

        storage.put(&blob.id, &blob.data, ObjectType::Blob).unwrap();
        assert!(storage.exist(&blob.id));
        assert_eq!(storage.get(&blob.id).unwrap(), blob.data);
        assert_eq!(storage.resolve_prefix(&hex[..6]).unwrap(), blob.id);

        let loaded: Blob = storage.load(&blob.id).unwrap();
        assert_eq!(loaded.id.kind(), HashKind::Sha256);
    }

    #[test]
    fn test_typed_load_and_save() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage_in(tmp.path());

        let blob = Blob::from_content("typed");
        let id = storage.save(&blob).unwrap();
        assert_eq!(id, blob.id);

        let loaded: Blob = storage.load(&id).unwrap();
        assert_eq!(loaded, blob);

        match storage.load_any(&id).unwrap() {
            GitObject::Blob(b) => assert_eq!(b.data, blob.data),
            other => panic!("expected blob, got {}", other.get_type()),
        }
    }
}
