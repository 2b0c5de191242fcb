//! Storage backends
//!
//! Opaque byte persistence for chunks, artifacts and stills. The engine
//! never interprets what it stores.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Byte storage used by the recorder and the still capture
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Create `path` and its parents if missing
    async fn ensure_directory(&self, path: &Path) -> io::Result<()>;

    /// Write `bytes` to `path`, replacing any previous content
    async fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Append the content of `source` to `target`, creating `target` if missing
    ///
    /// Returns the number of bytes appended.
    async fn append_file(&self, target: &Path, source: &Path) -> io::Result<u64>;
}

/// Local filesystem storage
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStorage;

#[async_trait]
impl MediaStorage for FsStorage {
    async fn ensure_directory(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, bytes).await
    }

    async fn append_file(&self, target: &Path, source: &Path) -> io::Result<u64> {
        let mut reader = tokio::fs::File::open(source).await?;
        let mut writer = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(target)
            .await?;
        let copied = tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;
        Ok(copied)
    }
}

/// In-memory storage
///
/// Directory and write failures can be switched on to exercise error paths,
/// and writes can be slowed down to widen race windows.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    directories: Mutex<HashSet<PathBuf>>,
    fail_directories: AtomicBool,
    fail_writes: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `ensure_directory` fail until switched off
    pub fn set_fail_directories(&self, fail: bool) {
        self.fail_directories.store(fail, Ordering::SeqCst);
    }

    /// Make `write_file` and `append_file` fail until switched off
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Sleep `delay` before every write
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.lock() = delay;
    }

    /// Content stored at `path`
    pub fn file(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }

    /// All stored paths, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.files.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn has_directory(&self, path: &Path) -> bool {
        self.directories.lock().contains(path)
    }

    async fn before_write(&self) -> io::Result<()> {
        let delay = *self.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "writes disabled"));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaStorage for MemoryStorage {
    async fn ensure_directory(&self, path: &Path) -> io::Result<()> {
        if self.fail_directories.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "directory creation disabled",
            ));
        }
        self.directories.lock().insert(path.to_path_buf());
        Ok(())
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.before_write().await?;
        self.files.lock().insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    async fn append_file(&self, target: &Path, source: &Path) -> io::Result<u64> {
        self.before_write().await?;
        let mut files = self.files.lock();
        let data = files.get(source).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} not found", source.display()))
        })?;
        files.entry(target.to_path_buf()).or_default().extend_from_slice(&data);
        Ok(data.len() as u64)
    }
}
