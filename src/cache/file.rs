//! File Backend
//!
//! Durable storage: one directory per partition, one file per entry.
//!
//! An entry file holds a single JSON metadata line followed by the raw body.
//! Writes go to a temporary file that is renamed over the target, so a reader
//! sees either the previous entry or the new one, never a partial write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, Fingerprint, StorageBackend};
use crate::error::{StorageError, StorageResult};

const ENTRY_EXTENSION: &str = "entry";
const TEMP_EXTENSION: &str = "tmp";

// == File Backend ==
/// Persists partitions under a root directory.
///
/// Partition directory names are the hex encoding of the partition name so
/// any name maps to a safe path. Writers to the same partition are
/// serialized to keep quota accounting exact; readers never block.
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    quota_bytes: Option<u64>,
    used_bytes: AtomicU64,
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    temp_counter: AtomicU64,
}

impl FileBackend {
    /// Opens (creating if needed) a store rooted at `root`.
    ///
    /// Existing entry files are scanned to seed quota accounting and
    /// leftover temporary files from interrupted writes are removed.
    pub async fn open(root: impl AsRef<Path>, quota_bytes: Option<u64>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;

        let backend = Self {
            root,
            quota_bytes,
            used_bytes: AtomicU64::new(0),
            write_locks: Mutex::new(HashMap::new()),
            temp_counter: AtomicU64::new(0),
        };

        let mut used = 0;
        for partition in backend.list_partitions().await? {
            let dir = backend.partition_dir(&partition);
            let mut reader = fs::read_dir(&dir).await?;
            while let Some(item) = reader.next_entry().await? {
                let path = item.path();
                match path.extension().and_then(|e| e.to_str()) {
                    Some(ENTRY_EXTENSION) => match read_entry(&path).await {
                        Ok(Some(entry)) => used += entry.size_bytes(),
                        Ok(None) => {}
                        Err(e) => warn!("Skipping unreadable cache file {}: {}", path.display(), e),
                    },
                    Some(TEMP_EXTENSION) => {
                        debug!("Removing leftover temp file {}", path.display());
                        let _ = fs::remove_file(&path).await;
                    }
                    _ => {}
                }
            }
        }
        backend.used_bytes.store(used, Ordering::Release);

        Ok(backend)
    }

    /// Bytes currently accounted against the quota.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Acquire)
    }

    fn partition_dir(&self, partition: &str) -> PathBuf {
        self.root.join(hex::encode(partition))
    }

    fn entry_path(&self, partition: &str, fingerprint: &Fingerprint) -> PathBuf {
        self.partition_dir(partition)
            .join(format!("{}.{}", fingerprint, ENTRY_EXTENSION))
    }

    async fn write_lock(&self, partition: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().await;
        locks.entry(partition.to_string()).or_default().clone()
    }

    /// Reserves `added - removed` bytes, failing if the quota would be exceeded.
    fn reserve(&self, added: u64, removed: u64) -> StorageResult<()> {
        let quota = self.quota_bytes;
        self.used_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                let next = used.saturating_sub(removed) + added;
                match quota {
                    Some(limit) if added > removed && next > limit => None,
                    _ => Some(next),
                }
            })
            .map(|_| ())
            .map_err(|used| StorageError::QuotaExceeded {
                needed: added,
                available: quota.unwrap_or(u64::MAX).saturating_sub(used.saturating_sub(removed)),
            })
    }

    fn release(&self, bytes: u64) {
        let _ = self
            .used_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }
}

// == Entry Encoding ==
fn encode_entry(entry: &CacheEntry) -> StorageResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec(entry).map_err(|e| StorageError::Corrupt(e.to_string()))?;
    bytes.push(b'\n');
    bytes.extend_from_slice(&entry.body);
    Ok(bytes)
}

fn decode_entry(bytes: &[u8]) -> StorageResult<CacheEntry> {
    let split = bytes
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| StorageError::Corrupt("missing metadata line".to_string()))?;
    let mut entry: CacheEntry = serde_json::from_slice(&bytes[..split])
        .map_err(|e| StorageError::Corrupt(e.to_string()))?;
    entry.body = bytes[split + 1..].to_vec();
    Ok(entry)
}

async fn read_entry(path: &Path) -> StorageResult<Option<CacheEntry>> {
    match fs::read(path).await {
        Ok(bytes) => decode_entry(&bytes).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(
        &self,
        partition: &str,
        fingerprint: &Fingerprint,
    ) -> StorageResult<Option<CacheEntry>> {
        read_entry(&self.entry_path(partition, fingerprint)).await
    }

    async fn put(&self, partition: &str, entry: CacheEntry) -> StorageResult<()> {
        let lock = self.write_lock(partition).await;
        let _guard = lock.lock().await;

        let dir = self.partition_dir(partition);
        fs::create_dir_all(&dir).await?;

        let target = self.entry_path(partition, &entry.fingerprint);
        let removed = read_entry(&target)
            .await
            .ok()
            .flatten()
            .map(|old| old.size_bytes())
            .unwrap_or(0);
        let added = entry.size_bytes();
        self.reserve(added, removed)?;

        let temp = dir.join(format!(
            "{}.{}.{}",
            entry.fingerprint,
            self.temp_counter.fetch_add(1, Ordering::Relaxed),
            TEMP_EXTENSION
        ));

        let result = async {
            let bytes = encode_entry(&entry)?;
            fs::write(&temp, &bytes).await?;
            fs::rename(&temp, &target).await?;
            Ok::<_, StorageError>(())
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp).await;
            // The old entry (if any) is still in place
            let _ = self
                .used_bytes
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                    Some(used.saturating_sub(added) + removed)
                });
            return Err(e);
        }

        Ok(())
    }

    async fn delete(&self, partition: &str, fingerprint: &Fingerprint) -> StorageResult<bool> {
        let lock = self.write_lock(partition).await;
        let _guard = lock.lock().await;

        let path = self.entry_path(partition, fingerprint);
        let size = read_entry(&path)
            .await
            .ok()
            .flatten()
            .map(|entry| entry.size_bytes());

        match fs::remove_file(&path).await {
            Ok(()) => {
                self.release(size.unwrap_or(0));
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_if_current(
        &self,
        partition: &str,
        observed: &CacheEntry,
    ) -> StorageResult<bool> {
        let lock = self.write_lock(partition).await;
        let _guard = lock.lock().await;

        let path = self.entry_path(partition, &observed.fingerprint);
        let Some(current) = read_entry(&path).await? else {
            return Ok(false);
        };
        if current.insertion_key() != observed.insertion_key() {
            return Ok(false);
        }

        match fs::remove_file(&path).await {
            Ok(()) => {
                self.release(current.size_bytes());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_entries(&self, partition: &str) -> StorageResult<Vec<CacheEntry>> {
        let dir = self.partition_dir(partition);
        let mut reader = match fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(item) = reader.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match read_entry(&path).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable cache file {}: {}", path.display(), e),
            }
        }
        Ok(entries)
    }

    async fn list_partitions(&self) -> StorageResult<Vec<String>> {
        let mut reader = fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(item) = reader.next_entry().await? {
            if !item.file_type().await?.is_dir() {
                continue;
            }
            let decoded = item
                .file_name()
                .to_str()
                .and_then(|name| hex::decode(name).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok());
            if let Some(name) = decoded {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_partition(&self, partition: &str) -> StorageResult<bool> {
        let lock = self.write_lock(partition).await;
        let _guard = lock.lock().await;

        let freed: u64 = self
            .list_entries(partition)
            .await?
            .iter()
            .map(CacheEntry::size_bytes)
            .sum();

        match fs::remove_dir_all(self.partition_dir(partition)).await {
            Ok(()) => {
                self.release(freed);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Request, Response};
    use crate::strategy::StrategyKind;

    fn entry(url: &str, body: &[u8]) -> CacheEntry {
        let fp = Fingerprint::compute(&Request::get(url), &[]).unwrap();
        let resp = Response::new(200, body.to_vec()).with_header("content-type", "image/png");
        CacheEntry::from_response(fp, url, &resp, StrategyKind::CacheFirst, Some(60))
    }

    #[tokio::test]
    async fn test_binary_body_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), None).await.unwrap();

        // Body containing newlines and non-UTF-8 bytes
        let e = entry("https://example.com/logo.png", &[0x89, b'P', b'\n', 0xff, 0x00]);
        backend.put("static-v1", e.clone()).await.unwrap();

        let found = backend.get("static-v1", &e.fingerprint).await.unwrap().unwrap();
        assert_eq!(found, e);
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let e = entry("https://example.com/a", b"persisted");
        {
            let backend = FileBackend::open(dir.path(), None).await.unwrap();
            backend.put("api-v1", e.clone()).await.unwrap();
        }

        let reopened = FileBackend::open(dir.path(), None).await.unwrap();
        assert_eq!(reopened.list_partitions().await.unwrap(), vec!["api-v1".to_string()]);
        assert_eq!(reopened.get("api-v1", &e.fingerprint).await.unwrap(), Some(e.clone()));
        assert_eq!(reopened.used_bytes(), e.size_bytes());
    }

    #[tokio::test]
    async fn test_leftover_temp_files_are_removed_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let partition_dir = dir.path().join(hex::encode("p"));
        std::fs::create_dir_all(&partition_dir).unwrap();
        let temp = partition_dir.join("abc.0.tmp");
        std::fs::write(&temp, b"half written").unwrap();

        let backend = FileBackend::open(dir.path(), None).await.unwrap();
        assert!(!temp.exists());
        assert!(backend.list_entries("p").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), None).await.unwrap();
        let e = entry("https://example.com/a", b"x");
        backend.put("p", e.clone()).await.unwrap();

        let path = backend.entry_path("p", &e.fingerprint);
        std::fs::write(&path, b"garbage without newline").unwrap();

        let err = backend.get("p", &e.fingerprint).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_quota_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let small = entry("https://example.com/a", b"x");
        let backend = FileBackend::open(dir.path(), Some(small.size_bytes())).await.unwrap();
        backend.put("p", small.clone()).await.unwrap();

        let other = entry("https://example.com/b", b"y");
        assert!(backend.put("p", other).await.unwrap_err().is_quota_exceeded());

        assert!(backend.delete("p", &small.fingerprint).await.unwrap());
        assert_eq!(backend.used_bytes(), 0);
    }

    #[tokio::test]
    async fn test_delete_if_current_keeps_newer_entry() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), None).await.unwrap();
        let old = entry("https://example.com/a", b"old");
        let new = entry("https://example.com/a", b"new");
        backend.put("p", old.clone()).await.unwrap();
        backend.put("p", new.clone()).await.unwrap();

        assert!(!backend.delete_if_current("p", &old).await.unwrap());
        assert_eq!(backend.get("p", &new.fingerprint).await.unwrap(), Some(new.clone()));

        assert!(backend.delete_if_current("p", &new).await.unwrap());
        assert_eq!(backend.used_bytes(), 0);
    }

    #[tokio::test]
    async fn test_delete_partition() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), None).await.unwrap();
        backend.put("old-v1", entry("https://example.com/a", b"a")).await.unwrap();
        backend.put("new-v2", entry("https://example.com/a", b"a")).await.unwrap();

        assert!(backend.delete_partition("old-v1").await.unwrap());
        assert!(!backend.delete_partition("old-v1").await.unwrap());
        assert_eq!(backend.list_partitions().await.unwrap(), vec!["new-v2".to_string()]);
    }
}
