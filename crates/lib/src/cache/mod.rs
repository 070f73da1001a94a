//! Persistent record of staged builds.
//!
//! Entries live under `<cache_dir>/<fingerprint>/<name>/<version>-<recipe_hash>.json`,
//! so a toolchain change starts from an empty namespace. An entry only counts as
//! a hit when it parses, matches its key exactly, and every file it recorded is
//! still present in the target root with the recorded content hash. Anything
//! else is treated as a miss and logged; it never fails the run.

pub mod gc;
pub mod lock;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::CACHE_ENTRY_VERSION;
use crate::recipe::RegisteredRecipe;
use crate::stage::resolve_destination;
use crate::toolchain::ToolchainFingerprint;
use crate::util::hash::{ContentHash, HashError, RecipeHash, hash_file};

pub use gc::GcStats;
pub use lock::{CacheLock, CacheLockError};

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("failed to create cache directory {}: {source}", .path.display())]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write cache entry {}: {source}", .path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to serialize cache entry: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("failed to read cache directory: {0}")]
  ReadDir(#[source] std::io::Error),
}

/// Why an existing entry was not accepted as a hit.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheCorruption {
  #[error("entry unreadable: {0}")]
  Unreadable(String),

  #[error("entry malformed: {0}")]
  Malformed(String),

  #[error("entry format version {0} is not supported")]
  FormatVersion(u32),

  #[error("entry key does not match")]
  KeyMismatch,

  #[error("staged file missing: {}", .0.display())]
  MissingFile(PathBuf),

  #[error("staged file changed: {}", .0.display())]
  ContentMismatch(PathBuf),
}

/// Everything that decides whether a previous build can be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
  pub name: String,
  pub version: String,
  pub fingerprint: ToolchainFingerprint,
  pub recipe_hash: RecipeHash,
}

impl CacheKey {
  pub fn new(recipe: &RegisteredRecipe, fingerprint: &ToolchainFingerprint) -> Result<Self, HashError> {
    Ok(Self {
      name: recipe.recipe.name.clone(),
      version: recipe.recipe.version.clone(),
      fingerprint: fingerprint.clone(),
      recipe_hash: recipe.definition_hash()?,
    })
  }
}

/// One file a cached build staged into the target root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
  /// Absolute destination path as declared by the recipe.
  pub destination: String,
  pub hash: ContentHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
  pub format: u32,
  pub key: CacheKey,
  pub files: Vec<CachedFile>,
  pub created_at_unix: u64,
}

impl CacheEntry {
  pub fn new(key: CacheKey, files: Vec<CachedFile>) -> Self {
    Self {
      format: CACHE_ENTRY_VERSION,
      key,
      files,
      created_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    }
  }
}

/// Cache store scoped to one toolchain fingerprint.
#[derive(Debug, Clone)]
pub struct BuildCache {
  dir: PathBuf,
  fingerprint: ToolchainFingerprint,
}

impl BuildCache {
  pub fn new(dir: &Path, fingerprint: ToolchainFingerprint) -> Self {
    Self {
      dir: dir.to_path_buf(),
      fingerprint,
    }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn fingerprint(&self) -> &ToolchainFingerprint {
    &self.fingerprint
  }

  /// `<dir>/<fingerprint>/<name>/<version>-<recipe hash>.json`
  pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
    self
      .dir
      .join(&key.fingerprint.0)
      .join(&key.name)
      .join(format!("{}-{}.json", key.version, key.recipe_hash))
  }

  pub fn key(&self, recipe: &RegisteredRecipe) -> Result<CacheKey, HashError> {
    CacheKey::new(recipe, &self.fingerprint)
  }

  /// Return the entry for `key` if it is a valid hit against `root`.
  ///
  /// Invalid entries are logged at `warn` and reported as a miss.
  pub fn lookup(&self, key: &CacheKey, root: &Path) -> Option<CacheEntry> {
    match self.verify(key, root) {
      Ok(Some(entry)) => {
        debug!(recipe = %key.name, hash = %key.recipe_hash, "cache hit");
        Some(entry)
      }
      Ok(None) => {
        debug!(recipe = %key.name, hash = %key.recipe_hash, "cache miss");
        None
      }
      Err(reason) => {
        warn!(
          recipe = %key.name,
          path = %self.entry_path(key).display(),
          reason = %reason,
          "ignoring invalid cache entry, will rebuild"
        );
        None
      }
    }
  }

  /// Load and check an entry. `Ok(None)` means no entry exists.
  pub fn verify(&self, key: &CacheKey, root: &Path) -> Result<Option<CacheEntry>, CacheCorruption> {
    let path = self.entry_path(key);
    if !path.exists() {
      return Ok(None);
    }

    let content = std::fs::read_to_string(&path).map_err(|e| CacheCorruption::Unreadable(e.to_string()))?;
    let entry: CacheEntry = serde_json::from_str(&content).map_err(|e| CacheCorruption::Malformed(e.to_string()))?;

    if entry.format != CACHE_ENTRY_VERSION {
      return Err(CacheCorruption::FormatVersion(entry.format));
    }
    if &entry.key != key {
      return Err(CacheCorruption::KeyMismatch);
    }

    for file in &entry.files {
      let staged = resolve_destination(root, &file.destination);
      if !staged.is_file() {
        return Err(CacheCorruption::MissingFile(staged));
      }
      match hash_file(&staged) {
        Ok(hash) if hash == file.hash => {}
        _ => return Err(CacheCorruption::ContentMismatch(staged)),
      }
    }

    Ok(Some(entry))
  }

  /// Persist an entry with a temp file and rename, so readers never see a partial write.
  pub fn write(&self, entry: &CacheEntry) -> Result<PathBuf, CacheError> {
    let path = self.entry_path(&entry.key);
    let parent = path.parent().unwrap_or(&self.dir).to_path_buf();
    std::fs::create_dir_all(&parent).map_err(|source| CacheError::CreateDir {
      path: parent.clone(),
      source,
    })?;

    let content = serde_json::to_vec_pretty(entry)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|source| CacheError::Write {
      path: path.clone(),
      source,
    })?;
    tmp
      .write_all(&content)
      .and_then(|()| tmp.as_file().sync_all())
      .map_err(|source| CacheError::Write {
        path: path.clone(),
        source,
      })?;
    tmp.persist(&path).map_err(|e| CacheError::Write {
      path: path.clone(),
      source: e.error,
    })?;

    debug!(recipe = %entry.key.name, path = %path.display(), "cache entry written");
    Ok(path)
  }
}
