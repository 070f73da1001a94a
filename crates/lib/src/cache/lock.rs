//! Exclusive lock over a cache directory.
//!
//! Two orchestrator processes sharing a cache would race on entries and on the
//! target root, so a run holds an `flock` on `<cache_dir>/.lock` for its whole
//! duration. The lock file carries JSON metadata naming the holder.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::CACHE_LOCK_FILENAME;

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub cache_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum CacheLockError {
  #[error(
    "cache is locked by another process: {command} (PID {pid}, started at unix time {started_at_unix})\n\
     If no rootsmith process is running, remove the lock file:\n  {}",
    .lock_path.display()
  )]
  Contention {
    command: String,
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error(
    "cache is locked (could not read lock metadata)\n\
     If no rootsmith process is running, remove the lock file:\n  {}",
    .lock_path.display()
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create cache directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire cache lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// Held for as long as the value lives; dropping it closes the file and releases the lock.
#[derive(Debug)]
pub struct CacheLock {
  file: File,
  lock_path: PathBuf,
}

impl CacheLock {
  /// Take the lock without waiting.
  pub fn acquire(cache_dir: &Path, command: &str) -> Result<Self, CacheLockError> {
    std::fs::create_dir_all(cache_dir).map_err(CacheLockError::CreateDir)?;
    let lock_path = cache_dir.join(CACHE_LOCK_FILENAME);

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(CacheLockError::OpenFile)?;

    if let Err(err) = try_lock_exclusive(&file) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(contention_error(&lock_path));
      }
      return Err(CacheLockError::LockFailed(err));
    }

    write_metadata(&file, command, cache_dir)?;

    Ok(Self { file, lock_path })
  }

  /// Read the metadata back through the held handle.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

fn write_metadata(file: &File, command: &str, cache_dir: &Path) -> Result<(), CacheLockError> {
  let metadata = LockMetadata {
    version: 1,
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
    command: command.to_string(),
    cache_dir: cache_dir.to_path_buf(),
  };

  file.set_len(0).map_err(CacheLockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  writer.seek(SeekFrom::Start(0)).map_err(CacheLockError::WriteMetadata)?;
  serde_json::to_writer_pretty(&mut writer, &metadata)
    .map_err(|e| CacheLockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(CacheLockError::WriteMetadata)?;
  Ok(())
}

fn contention_error(lock_path: &Path) -> CacheLockError {
  if let Ok(contents) = std::fs::read_to_string(lock_path)
    && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
  {
    return CacheLockError::Contention {
      command: metadata.command,
      pid: metadata.pid,
      started_at_unix: metadata.started_at_unix,
      lock_path: lock_path.to_path_buf(),
    };
  }

  CacheLockError::ContentionUnknown {
    lock_path: lock_path.to_path_buf(),
  }
}

fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
    .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}
