//! The remote bucket objects can be offloaded to.
//!
//! The production deployment points this trait at a cloud object bucket;
//! the in-memory implementation here carries the same observable contract
//! (versions, etags, paginated listing, MIME inference) for everything
//! above it.

use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::local::ByteStream;

/// Listing page size the backend fetches internally.
const LIST_PAGE_SIZE: usize = 100;

/// One object as described by the remote bucket.
pub struct Spec {
    /// Full object path, e.g. `s3://bucket/key`.
    pub path: String,
    /// Object key within the bucket.
    pub key: String,
    /// Object bytes; present on `get_object`, absent on head/list.
    pub body: Option<ByteStream>,
    /// Entity tag of the stored bytes.
    pub etag: String,
    /// Version identifier, when the bucket versions objects.
    pub version: Option<String>,
    /// Last modification time.
    pub updated_at: SystemTime,
    /// Object size in bytes.
    pub size: u64,
    /// User metadata attached to the object.
    pub meta: HashMap<String, String>,
}

impl std::fmt::Debug for Spec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spec")
            .field("path", &self.path)
            .field("key", &self.key)
            .field("body", &self.body.is_some())
            .field("etag", &self.etag)
            .field("version", &self.version)
            .field("size", &self.size)
            .finish()
    }
}

/// Remote object bucket a node can offload objects to.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Probe the bucket by writing a touch object under `prefix`.
    async fn check_access(&self, prefix: &str) -> StorageResult<()>;
    /// Upload an object. The MIME type is inferred from the `name`
    /// metadata field's extension.
    async fn put_object(
        &self,
        key: &str,
        body: ByteStream,
        meta: &HashMap<String, String>,
    ) -> StorageResult<Spec>;
    /// Download an object, optionally at a specific version.
    async fn get_object(&self, key: &str, version: Option<&str>) -> StorageResult<Spec>;
    /// Describe an object without its bytes.
    async fn head_object(&self, key: &str, version: Option<&str>) -> StorageResult<Spec>;
    /// List objects under `prefix`, optionally starting after a key.
    /// Fetches pages of 100 until the bucket reports no more.
    async fn list_objects(&self, prefix: &str, start_after: Option<&str>)
        -> StorageResult<Vec<Spec>>;
    /// Name of the bucket this backend points at.
    fn bucket(&self) -> &str;
}

/// Configuration for a remote bucket backend.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Bucket name.
    pub bucket: String,
    /// Key prefix all objects are stored under.
    pub key_prefix: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            bucket: "cairn".to_string(),
            key_prefix: String::new(),
        }
    }
}

struct StoredObject {
    data: Vec<u8>,
    etag: String,
    version: String,
    updated_at: SystemTime,
    meta: HashMap<String, String>,
    content_type: Option<String>,
}

/// In-memory versioned bucket.
pub struct MemoryRemote {
    config: RemoteConfig,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    versions: AtomicU64,
    access_denied: AtomicBool,
}

impl MemoryRemote {
    /// Create an empty bucket with the given configuration.
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            objects: Mutex::new(BTreeMap::new()),
            versions: AtomicU64::new(0),
            access_denied: AtomicBool::new(false),
        }
    }

    /// Make every access probe fail, for construction-failure tests.
    pub fn set_access_denied(&self, denied: bool) {
        self.access_denied.store(denied, Ordering::SeqCst);
    }

    /// Number of stored objects, touch objects included.
    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Bytes currently stored under `key`, if any.
    pub fn bytes(&self, key: &str) -> Option<Vec<u8>> {
        let key = self.full_key(key);
        self.objects.lock().unwrap().get(&key).map(|o| o.data.clone())
    }

    /// Inferred content type for `key`, if any.
    pub fn content_type(&self, key: &str) -> Option<String> {
        let key = self.full_key(key);
        self.objects
            .lock()
            .unwrap()
            .get(&key)
            .and_then(|o| o.content_type.clone())
    }

    fn full_key(&self, key: &str) -> String {
        join_key(&self.config.key_prefix, key)
    }

    fn spec_for(&self, key: &str, stored: &StoredObject, with_body: bool) -> Spec {
        let mut meta = stored.meta.clone();
        if let Some(ctype) = &stored.content_type {
            meta.insert("content-type".to_string(), ctype.clone());
        }
        Spec {
            path: format!("s3://{}/{}", self.config.bucket, key),
            key: key.to_string(),
            body: with_body.then(|| {
                Box::new(std::io::Cursor::new(stored.data.clone())) as ByteStream
            }),
            etag: stored.etag.clone(),
            version: Some(stored.version.clone()),
            updated_at: stored.updated_at,
            size: stored.data.len() as u64,
            meta,
        }
    }

    fn lookup(&self, key: &str, version: Option<&str>, with_body: bool) -> StorageResult<Spec> {
        let full = self.full_key(key);
        let objects = self.objects.lock().unwrap();
        let stored = objects
            .get(&full)
            .ok_or_else(|| StorageError::NotFound { id: key.to_string() })?;
        if let Some(wanted) = version {
            if stored.version != wanted {
                return Err(StorageError::NotFound { id: key.to_string() });
            }
        }
        Ok(self.spec_for(&full, stored, with_body))
    }

    /// One listing page: keys under `prefix` strictly after `after`.
    fn list_page(&self, prefix: &str, after: Option<&str>, limit: usize) -> Vec<Spec> {
        let objects = self.objects.lock().unwrap();
        objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| after.map_or(true, |a| key.as_str() > a))
            .take(limit)
            .map(|(key, stored)| self.spec_for(key, stored, false))
            .collect()
    }
}

#[async_trait]
impl RemoteStorage for MemoryRemote {
    async fn check_access(&self, prefix: &str) -> StorageResult<()> {
        if self.access_denied.load(Ordering::SeqCst) {
            return Err(StorageError::AccessDenied {
                reason: format!("bucket {} refused the probe", self.config.bucket),
            });
        }
        let key = join_key(prefix, "_touch");
        let body: ByteStream = Box::new(std::io::Cursor::new(b"ok".to_vec()));
        self.put_object(&key, body, &HashMap::new()).await?;
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        mut body: ByteStream,
        meta: &HashMap<String, String>,
    ) -> StorageResult<Spec> {
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;

        let content_type = meta
            .get("name")
            .and_then(|name| mime_guess::from_path(name).first_raw())
            .map(str::to_string);
        let version = format!("v{}", self.versions.fetch_add(1, Ordering::SeqCst) + 1);
        let full = self.full_key(key);
        debug!(key = %full, size = data.len(), version = %version, "object uploaded");

        let stored = StoredObject {
            etag: etag_of(&data),
            version,
            updated_at: SystemTime::now(),
            meta: meta.clone(),
            content_type,
            data,
        };
        let spec = self.spec_for(&full, &stored, false);
        self.objects.lock().unwrap().insert(full, stored);
        Ok(spec)
    }

    async fn get_object(&self, key: &str, version: Option<&str>) -> StorageResult<Spec> {
        self.lookup(key, version, true)
    }

    async fn head_object(&self, key: &str, version: Option<&str>) -> StorageResult<Spec> {
        self.lookup(key, version, false)
    }

    async fn list_objects(
        &self,
        prefix: &str,
        start_after: Option<&str>,
    ) -> StorageResult<Vec<Spec>> {
        let prefix = self.full_key(prefix);
        let mut specs: Vec<Spec> = Vec::new();
        let mut after = start_after.map(|a| join_key(&self.config.key_prefix, a));
        loop {
            let page = self.list_page(&prefix, after.as_deref(), LIST_PAGE_SIZE);
            let exhausted = page.len() < LIST_PAGE_SIZE;
            if let Some(last) = page.last() {
                after = Some(last.key.clone());
            }
            specs.extend(page);
            if exhausted {
                return Ok(specs);
            }
        }
    }

    fn bucket(&self) -> &str {
        &self.config.bucket
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), key)
    }
}

fn etag_of(data: &[u8]) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
