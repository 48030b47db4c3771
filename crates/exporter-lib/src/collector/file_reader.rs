//! Per-pass file access with glob and read caching
//!
//! One reader belongs to one collection context. Each distinct glob pattern
//! is walked at most once and each path is read at most once until
//! [`FileReader::release`] is called.

use crate::error::CollectError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::debug;

type GlobResult = Result<Arc<Vec<PathBuf>>, CollectError>;

enum GlobSlot {
    Pending(JoinHandle<Result<Vec<PathBuf>, CollectError>>),
    Ready(GlobResult),
}

/// Caching reader for glob resolution and file contents
#[derive(Default)]
pub struct FileReader {
    globs: HashMap<String, GlobSlot>,
    files: HashMap<PathBuf, Result<Arc<String>, CollectError>>,
    disk_reads: usize,
}

impl FileReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start resolving `pattern` on the blocking pool without waiting
    pub fn prefetch(&mut self, pattern: &str) {
        if self.globs.contains_key(pattern) {
            return;
        }
        let owned = pattern.to_string();
        let handle = tokio::task::spawn_blocking(move || resolve_glob(&owned));
        self.globs
            .insert(pattern.to_string(), GlobSlot::Pending(handle));
    }

    /// Wait until every outstanding prefetch has finished
    pub async fn wait(&mut self) {
        let pending: Vec<String> = self
            .globs
            .iter()
            .filter(|(_, slot)| matches!(slot, GlobSlot::Pending(_)))
            .map(|(pattern, _)| pattern.clone())
            .collect();

        for pattern in pending {
            if let Some(GlobSlot::Pending(handle)) = self.globs.remove(&pattern) {
                let result = join_glob(handle).await;
                self.globs.insert(pattern, GlobSlot::Ready(result));
            }
        }
    }

    /// Paths matching `pattern`, sorted as the walk returns them
    ///
    /// A failed resolution is cached too and returned again on the next
    /// call within the same pass.
    pub async fn glob(&mut self, pattern: &str) -> GlobResult {
        let slot = match self.globs.remove(pattern) {
            Some(GlobSlot::Ready(result)) => result,
            Some(GlobSlot::Pending(handle)) => join_glob(handle).await,
            None => {
                let owned = pattern.to_string();
                join_glob(tokio::task::spawn_blocking(move || resolve_glob(&owned))).await
            }
        };
        self.globs
            .insert(pattern.to_string(), GlobSlot::Ready(slot.clone()));
        slot
    }

    /// Contents of `path`, read from disk on first use
    pub async fn read_file(&mut self, path: &Path) -> Result<Arc<String>, CollectError> {
        if let Some(cached) = self.files.get(path) {
            return cached.clone();
        }

        self.disk_reads += 1;
        let result = fs::read(path)
            .await
            .map(|bytes| Arc::new(String::from_utf8_lossy(&bytes).into_owned()))
            .map_err(|e| CollectError::read(path, e));
        self.files.insert(path.to_path_buf(), result.clone());
        result
    }

    /// Number of reads that actually hit the filesystem
    pub fn disk_reads(&self) -> usize {
        self.disk_reads
    }

    /// Drop every cached resolution and buffer
    pub fn release(&mut self) {
        for (_, slot) in self.globs.drain() {
            if let GlobSlot::Pending(handle) = slot {
                handle.abort();
            }
        }
        self.files.clear();
        self.files.shrink_to_fit();
    }
}

async fn join_glob(handle: JoinHandle<Result<Vec<PathBuf>, CollectError>>) -> GlobResult {
    match handle.await {
        Ok(result) => result.map(Arc::new),
        Err(e) => Err(CollectError::Task(e.to_string())),
    }
}

/// Walk the filesystem for `pattern`
///
/// Entries that cannot be read during the walk are skipped.
fn resolve_glob(pattern: &str) -> Result<Vec<PathBuf>, CollectError> {
    let entries = glob::glob(pattern).map_err(|e| CollectError::Pattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => {
                debug!(path = %e.path().display(), error = %e.error(), "Skipping unreadable entry");
            }
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        for target in ["lustrefs-OST0000", "lustrefs-OST0001"] {
            let base = dir.path().join("obdfilter").join(target);
            fs::create_dir_all(&base).await.unwrap();
            fs::write(base.join("blocksize"), "4096\n").await.unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_glob_sorted_and_cached() {
        let dir = tree().await;
        let pattern = format!("{}/obdfilter/*/blocksize", dir.path().display());

        let mut reader = FileReader::new();
        let paths = reader.glob(&pattern).await.unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("lustrefs-OST0000/blocksize"));
        assert!(paths[1].ends_with("lustrefs-OST0001/blocksize"));

        // a new target appearing mid-pass is not seen
        let late = dir.path().join("obdfilter/lustrefs-OST0002");
        fs::create_dir_all(&late).await.unwrap();
        fs::write(late.join("blocksize"), "4096\n").await.unwrap();
        assert_eq!(reader.glob(&pattern).await.unwrap().len(), 2);

        reader.release();
        assert_eq!(reader.glob(&pattern).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_prefetch_then_wait() {
        let dir = tree().await;
        let root = dir.path().display().to_string();

        let mut reader = FileReader::new();
        reader.prefetch(&format!("{root}/obdfilter/*/blocksize"));
        reader.prefetch(&format!("{root}/mdt/*/num_exports"));
        reader.wait().await;

        assert!(reader
            .globs
            .values()
            .all(|slot| matches!(slot, GlobSlot::Ready(_))));
        assert_eq!(
            reader
                .glob(&format!("{root}/obdfilter/*/blocksize"))
                .await
                .unwrap()
                .len(),
            2
        );
        assert!(reader
            .glob(&format!("{root}/mdt/*/num_exports"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_read_file_once() {
        let dir = tree().await;
        let path = dir.path().join("obdfilter/lustrefs-OST0000/blocksize");

        let mut reader = FileReader::new();
        let first = reader.read_file(&path).await.unwrap();
        let second = reader.read_file(&path).await.unwrap();
        assert_eq!(first.as_str(), "4096\n");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(reader.disk_reads(), 1);
    }

    #[tokio::test]
    async fn test_read_error_is_cached() {
        let dir = tree().await;
        let path = dir.path().join("missing");

        let mut reader = FileReader::new();
        assert!(matches!(
            reader.read_file(&path).await,
            Err(CollectError::Read { .. })
        ));
        assert!(reader.read_file(&path).await.is_err());
        assert_eq!(reader.disk_reads(), 1);
    }

    #[tokio::test]
    async fn test_bad_pattern() {
        let mut reader = FileReader::new();
        assert!(matches!(
            reader.glob("/tmp/[").await,
            Err(CollectError::Pattern { .. })
        ));
    }
}
