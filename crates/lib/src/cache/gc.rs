//! Removal of cache namespaces left behind by other toolchains.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache::{BuildCache, CacheError};

#[derive(Debug, Default, Serialize)]
pub struct GcStats {
  pub namespaces_scanned: usize,
  pub namespaces_deleted: usize,
  pub bytes_freed: u64,
  pub deleted_paths: Vec<PathBuf>,
}

/// A namespace directory is named by a full hex SHA-256 fingerprint.
fn is_namespace(name: &str) -> bool {
  name.len() == 64 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

fn dir_size(path: &Path) -> u64 {
  WalkDir::new(path)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}

impl BuildCache {
  /// Delete every namespace except the current fingerprint's.
  ///
  /// Other directories in the cache (such as default work dirs) are left alone.
  pub fn gc(&self, dry_run: bool) -> Result<GcStats, CacheError> {
    let mut stats = GcStats::default();
    if !self.dir().exists() {
      return Ok(stats);
    }

    for entry in fs::read_dir(self.dir()).map_err(CacheError::ReadDir)?.flatten() {
      let path = entry.path();
      if !path.is_dir() {
        continue;
      }
      let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        continue;
      };
      if !is_namespace(name) {
        continue;
      }

      stats.namespaces_scanned += 1;
      if name == self.fingerprint().0 {
        continue;
      }

      let size = dir_size(&path);
      debug!(path = %path.display(), "removing stale cache namespace");

      if !dry_run && let Err(e) = fs::remove_dir_all(&path) {
        warn!(path = %path.display(), error = %e, "failed to delete cache namespace");
        continue;
      }
      stats.namespaces_deleted += 1;
      stats.bytes_freed += size;
      stats.deleted_paths.push(path);
    }

    info!(
      deleted = stats.namespaces_deleted,
      bytes_freed = stats.bytes_freed,
      dry_run,
      "cache garbage collection complete"
    );
    Ok(stats)
  }
}
