//! The local byte area: one file per object under a root directory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Owned byte stream handed across subsystem boundaries.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Usage counters for the local byte area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskStats {
    /// Number of objects stored.
    pub files: u64,
    /// Total bytes stored.
    pub bytes_used: u64,
}

/// Validate an object id at the storage boundary: non-empty, no path
/// separators, no parent references.
pub fn check_object_id(id: &str) -> StorageResult<()> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(StorageError::InvalidId { id: id.to_string() });
    }
    Ok(())
}

/// Byte-addressable object storage local to one node.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    /// Probe the backend for read/write access under `prefix`.
    async fn check_access(&self, prefix: &str) -> StorageResult<()>;
    /// Open the object `id` for reading.
    async fn read(&self, id: &str) -> StorageResult<ByteStream>;
    /// Store the stream under `id`, replacing any previous bytes.
    /// Returns the number of bytes written.
    async fn write(&self, id: &str, body: ByteStream) -> StorageResult<u64>;
    /// Remove the object `id`.
    async fn remove(&self, id: &str) -> StorageResult<()>;
    /// Usage counters for the whole byte area.
    async fn disk_stats(&self) -> StorageResult<DiskStats>;
}

/// Directory-backed implementation: every object is one file named by its
/// id under the root directory.
#[derive(Debug)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    /// Create a byte area rooted at `root`. The directory is created on
    /// the first access probe, not here.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, id: &str) -> StorageResult<PathBuf> {
        check_object_id(id)?;
        Ok(self.root.join(id))
    }
}

#[async_trait]
impl LocalStorage for DirStorage {
    async fn check_access(&self, prefix: &str) -> StorageResult<()> {
        let dir = if prefix.is_empty() {
            self.root.clone()
        } else {
            check_object_id(prefix)?;
            self.root.join(prefix)
        };
        tokio::fs::create_dir_all(&dir).await?;
        let probe = dir.join(".touch");
        tokio::fs::write(&probe, b"ok").await?;
        tokio::fs::remove_file(&probe).await?;
        Ok(())
    }

    async fn read(&self, id: &str) -> StorageResult<ByteStream> {
        let path = self.object_path(id)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound { id: id.to_string() })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, id: &str, mut body: ByteStream) -> StorageResult<u64> {
        let path = self.object_path(id)?;
        let mut file = tokio::fs::File::create(&path).await?;
        let written = tokio::io::copy(&mut body, &mut file).await?;
        file.sync_all().await?;
        debug!(id = %id, written, "object stored");
        Ok(written)
    }

    async fn remove(&self, id: &str) -> StorageResult<()> {
        let path = self.object_path(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound { id: id.to_string() })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn disk_stats(&self) -> StorageResult<DiskStats> {
        let mut stats = DiskStats::default();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() {
                stats.files += 1;
                stats.bytes_used += meta.len();
            }
        }
        Ok(stats)
    }
}

/// In-memory byte area for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    removed: Mutex<Vec<String>>,
}

impl MemoryStorage {
    /// Create an empty in-memory byte area.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly, bypassing the write path.
    pub fn insert(&self, id: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(id.to_string(), bytes.to_vec());
    }

    /// Bytes currently stored for `id`, if any.
    pub fn bytes(&self, id: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(id).cloned()
    }

    /// Ids that have been removed, in removal order.
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalStorage for MemoryStorage {
    async fn check_access(&self, _prefix: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn read(&self, id: &str) -> StorageResult<ByteStream> {
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })?;
        Ok(Box::new(std::io::Cursor::new(bytes)))
    }

    async fn write(&self, id: &str, mut body: ByteStream) -> StorageResult<u64> {
        check_object_id(id)?;
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes).await?;
        let written = bytes.len() as u64;
        self.objects.lock().unwrap().insert(id.to_string(), bytes);
        Ok(written)
    }

    async fn remove(&self, id: &str) -> StorageResult<()> {
        self.removed.lock().unwrap().push(id.to_string());
        self.objects
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })
    }

    async fn disk_stats(&self) -> StorageResult<DiskStats> {
        let objects = self.objects.lock().unwrap();
        Ok(DiskStats {
            files: objects.len() as u64,
            bytes_used: objects.values().map(|b| b.len() as u64).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(bytes: &[u8]) -> ByteStream {
        Box::new(std::io::Cursor::new(bytes.to_vec()))
    }

    async fn read_all(mut body: ByteStream) -> Vec<u8> {
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes).await.unwrap();
        bytes
    }

    mod object_ids {
        use super::*;

        #[test]
        fn accepts_plain_ids() {
            assert!(check_object_id("abc-123").is_ok());
            assert!(check_object_id("9f8e7d").is_ok());
        }

        #[test]
        fn rejects_empty_and_traversal() {
            assert!(check_object_id("").is_err());
            assert!(check_object_id("a/b").is_err());
            assert!(check_object_id("a\\b").is_err());
            assert!(check_object_id("..").is_err());
        }
    }

    mod dir_storage {
        use super::*;

        #[tokio::test]
        async fn write_read_remove_roundtrip() {
            let dir = tempfile::tempdir().unwrap();
            let storage = DirStorage::new(dir.path());
            storage.check_access("").await.unwrap();

            let written = storage.write("obj", stream(b"hello")).await.unwrap();
            assert_eq!(written, 5);

            let body = storage.read("obj").await.unwrap();
            assert_eq!(read_all(body).await, b"hello");

            storage.remove("obj").await.unwrap();
            assert!(matches!(
                storage.read("obj").await,
                Err(StorageError::NotFound { .. })
            ));
        }

        #[tokio::test]
        async fn read_missing_is_not_found() {
            let dir = tempfile::tempdir().unwrap();
            let storage = DirStorage::new(dir.path());
            assert!(matches!(
                storage.read("nope").await,
                Err(StorageError::NotFound { .. })
            ));
        }

        #[tokio::test]
        async fn remove_missing_is_not_found() {
            let dir = tempfile::tempdir().unwrap();
            let storage = DirStorage::new(dir.path());
            assert!(matches!(
                storage.remove("nope").await,
                Err(StorageError::NotFound { .. })
            ));
        }

        #[tokio::test]
        async fn traversal_ids_are_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let storage = DirStorage::new(dir.path());
            assert!(matches!(
                storage.write("../escape", stream(b"x")).await,
                Err(StorageError::InvalidId { .. })
            ));
        }

        #[tokio::test]
        async fn disk_stats_counts_files_and_bytes() {
            let dir = tempfile::tempdir().unwrap();
            let storage = DirStorage::new(dir.path());
            storage.check_access("").await.unwrap();
            storage.write("a", stream(b"12345")).await.unwrap();
            storage.write("b", stream(b"678")).await.unwrap();

            let stats = storage.disk_stats().await.unwrap();
            assert_eq!(stats.files, 2);
            assert_eq!(stats.bytes_used, 8);
        }

        #[tokio::test]
        async fn disk_stats_on_missing_root_is_empty() {
            let storage = DirStorage::new("/nonexistent/cairn-test-root");
            assert_eq!(storage.disk_stats().await.unwrap(), DiskStats::default());
        }

        #[tokio::test]
        async fn write_overwrites_previous_bytes() {
            let dir = tempfile::tempdir().unwrap();
            let storage = DirStorage::new(dir.path());
            storage.check_access("").await.unwrap();
            storage.write("obj", stream(b"first")).await.unwrap();
            storage.write("obj", stream(b"second!")).await.unwrap();
            let body = storage.read("obj").await.unwrap();
            assert_eq!(read_all(body).await, b"second!");
        }
    }

    mod memory_storage {
        use super::*;

        #[tokio::test]
        async fn roundtrip_and_stats() {
            let storage = MemoryStorage::new();
            storage.write("obj", stream(b"abc")).await.unwrap();
            let body = storage.read("obj").await.unwrap();
            assert_eq!(read_all(body).await, b"abc");

            let stats = storage.disk_stats().await.unwrap();
            assert_eq!(stats.files, 1);
            assert_eq!(stats.bytes_used, 3);
        }

        #[tokio::test]
        async fn remove_records_the_id() {
            let storage = MemoryStorage::new();
            storage.insert("obj", b"abc");
            storage.remove("obj").await.unwrap();
            assert!(storage.remove("obj").await.is_err());
            assert_eq!(storage.removed(), vec!["obj", "obj"]);
        }
    }
}
