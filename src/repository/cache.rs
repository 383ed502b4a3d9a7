// src/repository/cache.rs

//! On-disk repository metadata cache
//!
//! Entries are keyed by distribution, architecture and repository
//! fingerprint and laid out as
//!
//! ```text
//! <root>/<distro>/<arch>/<repo-id>-<fingerprint>/metadata.json
//! <root>/<distro>/<arch>/<repo-id>-<fingerprint>/index.json
//! <root>/<distro>/<arch>/<repo-id>-<fingerprint>.lock
//! ```
//!
//! # Concurrency
//!
//! A key is populated at most once at a time: threads of one process
//! serialize on an in-process mutex per key, processes on an exclusive
//! `flock` of the `.lock` file. Files are written to a temporary name and
//! renamed into place, `index.json` last, so a reader never sees a partial
//! entry. Entries never expire on their own; use [`MetadataCache::clear`]
//! or [`MetadataCache::clear_older_than`].

use crate::arch::Arch;
use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::hash::{Checksum, ChecksumType};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::client::MetadataFetcher;
use super::config::RepoConfig;
use super::metadata::RepositoryData;

const METADATA_FILE: &str = "metadata.json";
const INDEX_FILE: &str = "index.json";

/// Identity of one cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub distro: String,
    pub arch: Arch,
    pub repo_id: String,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(distro: impl Into<String>, arch: Arch, repo: &RepoConfig) -> Self {
        Self {
            distro: distro.into(),
            arch,
            repo_id: repo.id.clone(),
            fingerprint: repo.fingerprint(),
        }
    }

    fn entry_name(&self) -> String {
        let id: String = self
            .repo_id
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        format!("{}-{}", id, self.fingerprint)
    }

    fn parent_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.distro).join(self.arch.as_str())
    }

    fn entry_dir(&self, root: &Path) -> PathBuf {
        self.parent_dir(root).join(self.entry_name())
    }

    fn lock_path(&self, root: &Path) -> PathBuf {
        self.parent_dir(root)
            .join(format!("{}.lock", self.entry_name()))
    }
}

/// Bookkeeping written next to the cached metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheIndex {
    pub repo_id: String,
    pub fingerprint: String,
    pub distro: String,
    pub arch: String,
    pub fetched_at: DateTime<Utc>,
    pub packages: usize,
    /// Checksum of `metadata.json`
    pub checksum: Checksum,
}

/// Counters for cache activity since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Fetches from the repository source
    pub fetches: u64,
    /// Requests served from memory or disk
    pub hits: u64,
}

/// Shared metadata cache
///
/// One instance is meant to be shared (through `Arc`) by every solver of a
/// process so concurrent resolutions of the same repository fetch once.
pub struct MetadataCache {
    root: PathBuf,
    key_locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    loaded: RwLock<HashMap<CacheKey, Arc<RepositoryData>>>,
    fetches: AtomicU64,
    hits: AtomicU64,
}

impl MetadataCache {
    /// Open (and create if needed) a cache rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            Error::Cache(format!("Failed to create cache directory {}: {}", root.display(), e))
        })?;
        Ok(Self {
            root,
            key_locks: Mutex::new(HashMap::new()),
            loaded: RwLock::new(HashMap::new()),
            fetches: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            fetches: self.fetches.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        self.key_locks
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn hit(&self, data: Arc<RepositoryData>) -> Arc<RepositoryData> {
        self.hits.fetch_add(1, Ordering::Relaxed);
        data
    }

    /// Return the metadata for `repo`, fetching it on a miss
    pub fn get_or_fetch(
        &self,
        key: &CacheKey,
        repo: &RepoConfig,
        fetcher: &dyn MetadataFetcher,
        cancel: &Cancellation,
    ) -> Result<Arc<RepositoryData>> {
        cancel.check()?;
        if let Some(data) = self.loaded.read().get(key) {
            return Ok(self.hit(data.clone()));
        }

        let lock = self.key_lock(key);
        let _guard = lock.lock();
        let _file_lock = self.lock_file(key)?;

        // Another thread may have filled the entry while we waited
        if let Some(data) = self.loaded.read().get(key) {
            return Ok(self.hit(data.clone()));
        }

        let dir = key.entry_dir(&self.root);
        match self.read_entry(&dir) {
            Ok(Some(data)) => {
                debug!("Cache hit for {} at {}", key.repo_id, dir.display());
                let data = Arc::new(data);
                self.loaded.write().insert(key.clone(), data.clone());
                return Ok(self.hit(data));
            }
            Ok(None) => {}
            Err(e) => warn!("Discarding unreadable cache entry {}: {}", dir.display(), e),
        }

        cancel.check()?;
        let data = fetcher.fetch(repo, cancel)?;
        self.fetches.fetch_add(1, Ordering::Relaxed);

        cancel.check()?;
        self.write_entry(key, &dir, &data)?;

        let data = Arc::new(data);
        self.loaded.write().insert(key.clone(), data.clone());
        Ok(data)
    }

    fn lock_file(&self, key: &CacheKey) -> Result<File> {
        let path = key.lock_path(&self.root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        file.lock_exclusive().map_err(|e| {
            Error::Cache(format!("Failed to lock {}: {}", path.display(), e))
        })?;
        Ok(file)
    }

    /// Load a complete entry, `None` when there is none
    fn read_entry(&self, dir: &Path) -> Result<Option<RepositoryData>> {
        let index_path = dir.join(INDEX_FILE);
        if !index_path.is_file() {
            return Ok(None);
        }
        let index: CacheIndex = serde_json::from_slice(&fs::read(&index_path)?)?;
        let raw = fs::read(dir.join(METADATA_FILE))?;
        if !index.checksum.verify(&raw)? {
            return Err(Error::Cache(format!(
                "cannot verify {} checksum",
                index.checksum.algorithm
            )));
        }
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    fn write_entry(&self, key: &CacheKey, dir: &Path, data: &RepositoryData) -> Result<()> {
        fs::create_dir_all(dir)?;

        let raw = serde_json::to_vec(data)?;
        let digest = ChecksumType::Sha256
            .digest(&raw)
            .ok_or_else(|| Error::Cache("sha256 unavailable".to_string()))?;
        let index = CacheIndex {
            repo_id: key.repo_id.clone(),
            fingerprint: key.fingerprint.clone(),
            distro: key.distro.clone(),
            arch: key.arch.to_string(),
            fetched_at: Utc::now(),
            packages: data.packages.len(),
            checksum: Checksum::new(ChecksumType::Sha256, digest)?,
        };

        write_atomic(dir, METADATA_FILE, &raw)?;
        write_atomic(dir, INDEX_FILE, &serde_json::to_vec_pretty(&index)?)?;

        info!(
            "Cached {} packages of {} for {}/{}",
            index.packages, key.repo_id, key.distro, key.arch
        );
        Ok(())
    }

    /// List every complete entry on disk
    pub fn entries(&self) -> Result<Vec<(PathBuf, CacheIndex)>> {
        let mut entries = Vec::new();
        for distro in read_dirs(&self.root)? {
            for arch in read_dirs(&distro)? {
                for entry in read_dirs(&arch)? {
                    let index_path = entry.join(INDEX_FILE);
                    if !index_path.is_file() {
                        continue;
                    }
                    match fs::read(&index_path)
                        .map_err(Error::from)
                        .and_then(|raw| serde_json::from_slice(&raw).map_err(Error::from))
                    {
                        Ok(index) => entries.push((entry, index)),
                        Err(e) => warn!("Skipping {}: {}", index_path.display(), e),
                    }
                }
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Remove every entry
    pub fn clear(&self) -> Result<()> {
        self.loaded.write().clear();
        for dir in read_dirs(&self.root)? {
            fs::remove_dir_all(&dir)?;
        }
        info!("Cleared metadata cache at {}", self.root.display());
        Ok(())
    }

    /// Remove entries fetched more than `max_age` ago, returning how many
    pub fn clear_older_than(&self, max_age: Duration) -> Result<usize> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| Error::Config(format!("invalid cache age: {}", e)))?;
        let cutoff = Utc::now() - max_age;

        let mut removed = 0;
        for (dir, index) in self.entries()? {
            if index.fetched_at > cutoff {
                continue;
            }
            fs::remove_dir_all(&dir)?;
            self.loaded.write().retain(|k, _| {
                !(k.repo_id == index.repo_id
                    && k.fingerprint == index.fingerprint
                    && k.distro == index.distro
                    && k.arch.as_str() == index.arch)
            });
            debug!("Removed stale cache entry {}", dir.display());
            removed += 1;
        }

        info!("Removed {} cache entries older than {}", removed, max_age);
        Ok(removed)
    }
}

fn read_dirs(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

/// Write `name` inside `dir` through a temporary file and rename
fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(name))
        .map_err(|e| Error::Cache(format!("Failed to persist {}: {}", name, e.error)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::metadata::PackageMetadata;
    use std::sync::atomic::AtomicUsize;

    struct CountingFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingFetcher {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    impl MetadataFetcher for CountingFetcher {
        fn fetch(&self, repo: &RepoConfig, _cancel: &Cancellation) -> Result<RepositoryData> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::RepositoryFetch {
                    repo_id: repo.id.clone(),
                    reason: "unreachable".to_string(),
                });
            }
            let pkg: PackageMetadata = serde_json::from_str(
                r#"{"name": "bash", "version": "5.1.8", "release": "6.el9", "arch": "x86_64",
                    "checksum": "sha256:0b", "location": "Packages/bash.rpm"}"#,
            )
            .unwrap();
            Ok(RepositoryData::new(repo.id.clone(), vec![pkg]))
        }
    }

    fn setup() -> (tempfile::TempDir, MetadataCache, RepoConfig, CacheKey) {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetadataCache::open(dir.path().join("cache")).unwrap();
        let repo = RepoConfig::new("baseos", "https://mirror.example.com/baseos");
        let key = CacheKey::new("centos-9", Arch::X86_64, &repo);
        (dir, cache, repo, key)
    }

    #[test]
    fn test_second_request_is_served_from_cache() {
        let (_dir, cache, repo, key) = setup();
        let fetcher = CountingFetcher::new();
        let cancel = Cancellation::new();

        let first = cache.get_or_fetch(&key, &repo, &fetcher, &cancel).unwrap();
        let second = cache.get_or_fetch(&key, &repo, &fetcher, &cancel).unwrap();
        assert_eq!(first, second);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats(), CacheStats { fetches: 1, hits: 1 });
    }

    #[test]
    fn test_entry_survives_reopen() {
        let (dir, cache, repo, key) = setup();
        let fetcher = CountingFetcher::new();
        cache
            .get_or_fetch(&key, &repo, &fetcher, &Cancellation::new())
            .unwrap();

        let reopened = MetadataCache::open(dir.path().join("cache")).unwrap();
        let data = reopened
            .get_or_fetch(&key, &repo, &fetcher, &Cancellation::new())
            .unwrap();
        assert_eq!(data.packages[0].name, "bash");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        let entries = reopened.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.repo_id, "baseos");
        assert_eq!(entries[0].1.arch, "x86_64");
    }

    #[test]
    fn test_concurrent_requests_fetch_once() {
        let (_dir, cache, repo, key) = setup();
        let fetcher = CountingFetcher::new();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    cache
                        .get_or_fetch(&key, &repo, &fetcher, &Cancellation::new())
                        .unwrap();
                });
            }
        });
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_fetch_leaves_no_entry() {
        let (_dir, cache, repo, key) = setup();
        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        let err = cache
            .get_or_fetch(&key, &repo, &fetcher, &Cancellation::new())
            .unwrap_err();
        assert!(matches!(err, Error::RepositoryFetch { .. }));
        assert!(cache.entries().unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_before_fetch() {
        let (_dir, cache, repo, key) = setup();
        let fetcher = CountingFetcher::new();
        let cancel = Cancellation::new();
        cancel.cancel();
        let err = cache.get_or_fetch(&key, &repo, &fetcher, &cancel).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    /// Fires the signal while the download is in flight
    struct CancellingFetcher {
        inner: CountingFetcher,
        /// Return the fetched data anyway instead of giving up
        complete: bool,
    }

    impl MetadataFetcher for CancellingFetcher {
        fn fetch(&self, repo: &RepoConfig, cancel: &Cancellation) -> Result<RepositoryData> {
            let data = self.inner.fetch(repo, cancel)?;
            cancel.cancel();
            if self.complete {
                return Ok(data);
            }
            cancel.check()?;
            Ok(data)
        }
    }

    #[test]
    fn test_cancelled_during_fetch_leaves_no_entry() {
        let (_dir, cache, repo, key) = setup();
        for complete in [false, true] {
            let fetcher = CancellingFetcher {
                inner: CountingFetcher::new(),
                complete,
            };
            let err = cache
                .get_or_fetch(&key, &repo, &fetcher, &Cancellation::new())
                .unwrap_err();
            assert!(err.is_cancelled());
            assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 1);
            assert!(cache.entries().unwrap().is_empty());
        }

        // A later request fetches again
        let fetcher = CountingFetcher::new();
        cache
            .get_or_fetch(&key, &repo, &fetcher, &Cancellation::new())
            .unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.entries().unwrap().len(), 1);
    }

    /// Takes longer than the caller is willing to wait
    struct SlowFetcher(Duration);

    impl MetadataFetcher for SlowFetcher {
        fn fetch(&self, repo: &RepoConfig, cancel: &Cancellation) -> Result<RepositoryData> {
            std::thread::sleep(self.0);
            cancel.check()?;
            CountingFetcher::new().fetch(repo, cancel)
        }
    }

    #[test]
    fn test_deadline_during_fetch_leaves_no_entry() {
        let (_dir, cache, repo, key) = setup();
        let cancel = Cancellation::with_timeout(Duration::from_millis(20));
        let err = cache
            .get_or_fetch(&key, &repo, &SlowFetcher(Duration::from_millis(100)), &cancel)
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(cache.entries().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_entry_is_refetched() {
        let (dir, cache, repo, key) = setup();
        let fetcher = CountingFetcher::new();
        cache
            .get_or_fetch(&key, &repo, &fetcher, &Cancellation::new())
            .unwrap();

        let entry = key.entry_dir(&dir.path().join("cache"));
        fs::write(entry.join(METADATA_FILE), b"{}").unwrap();

        let reopened = MetadataCache::open(dir.path().join("cache")).unwrap();
        reopened
            .get_or_fetch(&key, &repo, &fetcher, &Cancellation::new())
            .unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_different_arch_is_different_entry() {
        let (_dir, cache, repo, key) = setup();
        let fetcher = CountingFetcher::new();
        let other = CacheKey::new("centos-9", Arch::Aarch64, &repo);
        cache.get_or_fetch(&key, &repo, &fetcher, &Cancellation::new()).unwrap();
        cache.get_or_fetch(&other, &repo, &fetcher, &Cancellation::new()).unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clear_and_clear_older_than() {
        let (_dir, cache, repo, key) = setup();
        let fetcher = CountingFetcher::new();
        cache.get_or_fetch(&key, &repo, &fetcher, &Cancellation::new()).unwrap();

        assert_eq!(cache.clear_older_than(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(cache.clear_older_than(Duration::ZERO).unwrap(), 1);
        assert!(cache.entries().unwrap().is_empty());

        cache.get_or_fetch(&key, &repo, &fetcher, &Cancellation::new()).unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        cache.clear().unwrap();
        assert!(cache.entries().unwrap().is_empty());
    }
}
