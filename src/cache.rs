//! Content-addressed cache of converted Markdown.
//!
//! ## On-disk layout
//!
//! ```text
//! <cache dir>/
//!   index.json        resolved source path → CacheEntry
//!   <cache_key>.md    one file per entry
//! ```
//!
//! The index is keyed by the *resolved* source path, and the content file
//! name (`cache_key`) is derived from that path as well, never from the
//! file bytes. Two distinct files with identical bytes therefore get two
//! independent entries. Freshness is decided by `content_hash`: a lookup
//! rehashes the source and only hits when the digest still matches, so any
//! byte change invalidates the entry without explicit action.
//!
//! ## Failure policy
//!
//! The cache is an optimisation. [`ContentCache::get`] degrades to a miss on
//! any I/O error and [`ContentCache::set`] logs and returns on failure.
//! Index updates go through a temp file and a rename, so an interrupted run
//! leaves either the previous index or the new one on disk.

use crate::error::MdConvertError;
use crate::output::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Directory used when the caller does not pick one.
pub const DEFAULT_CACHE_DIR: &str = ".mdconvert_cache";

const INDEX_FILE: &str = "index.json";
const HASH_CHUNK: usize = 64 * 1024;

/// One index record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// blake3 of the source bytes at store time.
    pub content_hash: String,
    /// Derived from the resolved path; names the content file.
    pub cache_key: String,
    pub source_name: String,
    /// Registry name of the converter that produced the content.
    #[serde(default)]
    pub converter: String,
    pub tool_used: String,
    pub cached_at: DateTime<Utc>,
}

/// A fresh cache hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub content: String,
    /// Empty for entries written before converters were recorded.
    pub converter: String,
    pub tool_used: String,
}

/// Best-effort summary of the cache directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size_bytes: u64,
    pub location: PathBuf,
}

/// File-backed cache shared by concurrent conversions.
#[derive(Debug)]
pub struct ContentCache {
    dir: PathBuf,
    index_path: PathBuf,
    index: Mutex<BTreeMap<String, CacheEntry>>,
}

impl ContentCache {
    /// Open (creating if needed) the cache rooted at `dir`.
    ///
    /// A missing index starts empty; an unreadable or corrupt one is logged
    /// and replaced on the next write.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, MdConvertError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| MdConvertError::CacheUnavailable {
            path: dir.clone(),
            source,
        })?;
        let index_path = dir.join(INDEX_FILE);
        let index = load_index(&index_path);
        debug!("Cache opened at {} ({} entries)", dir.display(), index.len());
        Ok(Self {
            dir,
            index_path,
            index: Mutex::new(index),
        })
    }

    pub fn location(&self) -> &Path {
        &self.dir
    }

    /// Cached Markdown for `source` if its bytes are unchanged.
    pub async fn get(&self, source: &Path) -> Option<String> {
        self.lookup(source).await.map(|hit| hit.content)
    }

    /// Like [`get`](Self::get), also returning the tool that produced it.
    pub async fn lookup(&self, source: &Path) -> Option<CacheHit> {
        let resolved = resolve(source).await;
        let hash = match content_hash(&resolved).await {
            Ok(h) => h,
            Err(e) => {
                debug!("Cache miss for {}: {}", source.display(), e);
                return None;
            }
        };

        let entry = {
            let index = self.index.lock().await;
            index.get(&index_key(&resolved))?.clone()
        };
        if entry.content_hash != hash {
            debug!("Cache stale for {}", source.display());
            return None;
        }

        match tokio::fs::read_to_string(self.content_path(&entry.cache_key)).await {
            Ok(content) => Some(CacheHit {
                content,
                converter: entry.converter,
                tool_used: entry.tool_used,
            }),
            Err(e) => {
                warn!("Cache entry for {} unreadable: {}", source.display(), e);
                None
            }
        }
    }

    /// Store `content` for `source`. Failures are logged, never returned.
    ///
    /// The producing converter is taken from the tool id (`"llm/gemini-x"`
    /// records `"llm"`); use [`store`](Self::store) to name it explicitly.
    pub async fn set(&self, source: &Path, content: &str, tool_used: &str) {
        let converter = tool_used.split('/').next().unwrap_or(tool_used);
        self.store(source, content, converter, tool_used).await;
    }

    /// Store `content` produced by `converter` for `source`.
    pub async fn store(&self, source: &Path, content: &str, converter: &str, tool_used: &str) {
        let resolved = resolve(source).await;
        let hash = match content_hash(&resolved).await {
            Ok(h) => h,
            Err(e) => {
                warn!("Not caching {}: {}", source.display(), e);
                return;
            }
        };
        let key = cache_key(&resolved);

        if let Err(e) = write_atomic(&self.content_path(&key), content.as_bytes()).await {
            warn!("Not caching {}: {}", source.display(), e);
            return;
        }

        let mut index = self.index.lock().await;
        index.insert(
            index_key(&resolved),
            CacheEntry {
                content_hash: hash,
                cache_key: key,
                source_name: resolved
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                converter: converter.to_string(),
                tool_used: tool_used.to_string(),
                cached_at: Utc::now(),
            },
        );
        if let Err(e) = self.persist(&index).await {
            warn!("Cache index write failed: {}", e);
        }
    }

    /// Drop the entry for `source`. Returns whether one existed.
    pub async fn invalidate(&self, source: &Path) -> bool {
        let resolved = resolve(source).await;
        let mut index = self.index.lock().await;
        let Some(entry) = index.remove(&index_key(&resolved)) else {
            return false;
        };
        self.remove_content(&entry.cache_key).await;
        if let Err(e) = self.persist(&index).await {
            warn!("Cache index write failed: {}", e);
        }
        true
    }

    /// Drop every entry. Returns how many were removed.
    pub async fn clear(&self) -> usize {
        let mut index = self.index.lock().await;
        let count = index.len();
        for entry in index.values() {
            self.remove_content(&entry.cache_key).await;
        }
        index.clear();
        if let Err(e) = self.persist(&index).await {
            warn!("Cache index write failed: {}", e);
        }
        count
    }

    pub async fn stats(&self) -> CacheStats {
        let keys: Vec<String> = {
            let index = self.index.lock().await;
            index.values().map(|e| e.cache_key.clone()).collect()
        };
        let mut total_size_bytes = 0;
        for key in &keys {
            if let Ok(meta) = tokio::fs::metadata(self.content_path(key)).await {
                total_size_bytes += meta.len();
            }
        }
        CacheStats {
            entries: keys.len(),
            total_size_bytes,
            location: self.dir.clone(),
        }
    }

    fn content_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.md"))
    }

    async fn remove_content(&self, key: &str) {
        match tokio::fs::remove_file(self.content_path(key)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove cached content {}: {}", key, e),
        }
    }

    /// Caller holds the index lock, which serialises index writers.
    async fn persist(&self, index: &BTreeMap<String, CacheEntry>) -> std::io::Result<()> {
        let bytes = serde_json::to_vec(index).map_err(std::io::Error::other)?;
        write_atomic(&self.index_path, &bytes).await
    }
}

fn load_index(path: &Path) -> BTreeMap<String, CacheEntry> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!("Cache index {} unreadable, starting empty: {}", path.display(), e);
            return BTreeMap::new();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!("Cache index {} corrupt, starting empty: {}", path.display(), e);
        BTreeMap::new()
    })
}

/// Absolute, symlink-free form of `path` when it exists; absolute otherwise.
async fn resolve(path: &Path) -> PathBuf {
    match tokio::fs::canonicalize(path).await {
        Ok(p) => p,
        Err(_) => std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
    }
}

fn index_key(resolved: &Path) -> String {
    resolved.to_string_lossy().into_owned()
}

/// Path-derived key; independent of the file bytes.
fn cache_key(resolved: &Path) -> String {
    let mut key = blake3::hash(index_key(resolved).as_bytes()).to_string();
    key.truncate(32);
    key
}

/// Streaming blake3 of the file, read in fixed-size chunks.
async fn content_hash(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn content_hash_matches_one_shot_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let bytes: Vec<u8> = (0..(HASH_CHUNK * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &bytes).unwrap();
        assert_eq!(
            content_hash(&path).await.unwrap(),
            blake3::hash(&bytes).to_string()
        );
    }

    #[test]
    fn cache_key_depends_on_path_only() {
        let a = cache_key(Path::new("/docs/a.pdf"));
        let b = cache_key(Path::new("/docs/b.pdf"));
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert_eq!(a, cache_key(Path::new("/docs/a.pdf")));
    }

    #[tokio::test]
    async fn missing_source_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::open(dir.path().join("cache")).unwrap();
        assert!(cache.get(&dir.path().join("nope.pdf")).await.is_none());
    }

    #[test]
    fn open_under_a_regular_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        match ContentCache::open(blocker.join("cache")) {
            Err(MdConvertError::CacheUnavailable { path, .. }) => {
                assert_eq!(path, blocker.join("cache"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn corrupt_index_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), "{not json").unwrap();
        let cache = ContentCache::open(dir.path()).unwrap();
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn lookup_reports_tool() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.docx");
        std::fs::write(&src, b"doc").unwrap();
        let cache = ContentCache::open(dir.path().join("cache")).unwrap();
        cache.set(&src, "# A", "pandoc").await;
        let hit = cache.lookup(&src).await.unwrap();
        assert_eq!(hit.tool_used, "pandoc");
        assert_eq!(hit.converter, "pandoc");
        assert_eq!(hit.content, "# A");

        cache.set(&src, "# B", "llm/gemini-1.5-flash").await;
        let hit = cache.lookup(&src).await.unwrap();
        assert_eq!(hit.converter, "llm");
        assert_eq!(hit.tool_used, "llm/gemini-1.5-flash");
    }

    #[tokio::test]
    async fn index_without_converter_field_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.docx");
        std::fs::write(&src, b"doc").unwrap();
        let cache_dir = dir.path().join("cache");
        {
            let cache = ContentCache::open(&cache_dir).unwrap();
            cache.store(&src, "# A", "pandoc", "pandoc").await;
        }
        let index_path = cache_dir.join(INDEX_FILE);
        let mut index: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&index_path).unwrap()).unwrap();
        for entry in index.as_object_mut().unwrap().values_mut() {
            entry.as_object_mut().unwrap().remove("converter");
        }
        std::fs::write(&index_path, index.to_string()).unwrap();

        let cache = ContentCache::open(&cache_dir).unwrap();
        let hit = cache.lookup(&src).await.unwrap();
        assert_eq!(hit.converter, "");
        assert_eq!(hit.content, "# A");
    }

    #[tokio::test]
    async fn deleted_content_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.docx");
        std::fs::write(&src, b"doc").unwrap();
        let cache = ContentCache::open(dir.path().join("cache")).unwrap();
        cache.set(&src, "# A", "pandoc").await;

        let resolved = resolve(&src).await;
        std::fs::remove_file(cache.content_path(&cache_key(&resolved))).unwrap();
        assert!(cache.get(&src).await.is_none());
        assert_eq!(cache.stats().await.total_size_bytes, 0);
    }
}
