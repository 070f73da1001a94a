//! Hashing utilities for cache keys and content verification.
//!
//! This module provides:
//! - `RecipeHash`: a truncated 20-character hash identifying a recipe definition
//! - `ContentHash`: a full 64-character hash for file content verification
//! - `hash_file()`: streaming single file hashing
//! - `hash_bytes()`: arbitrary byte hashing

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::RECIPE_HASH_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// A hash identifying one recipe definition (descriptor plus recorded build plan).
///
/// The hash is a 20-character truncated SHA-256 of the JSON-serialized value,
/// short enough to appear in file names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecipeHash(pub String);

impl std::fmt::Display for RecipeHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<RecipeHash, HashError> {
    let serialized = serde_json::to_string(self)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    Ok(RecipeHash(full[..RECIPE_HASH_PREFIX_LEN].to_string()))
  }
}

/// A full 64-character SHA256 hash for content verification.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Error while hashing a file on disk.
#[derive(Debug, thiserror::Error)]
pub enum FileHashError {
  #[error("failed to read file {path}: {message}")]
  ReadFile { path: String, message: String },
}

/// Stream a file through SHA-256.
pub fn hash_file(path: &Path) -> Result<ContentHash, FileHashError> {
  let read_error = |e: io::Error| FileHashError::ReadFile {
    path: path.display().to_string(),
    message: e.to_string(),
  };

  let mut file = fs::File::open(path).map_err(read_error)?;
  let mut hasher = Sha256::new();
  io::copy(&mut file, &mut hasher).map_err(read_error)?;

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Full SHA-256 of an in-memory buffer.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::tempdir;

  #[derive(Serialize)]
  struct Sample {
    name: String,
    steps: Vec<String>,
  }

  impl Hashable for Sample {}

  #[test]
  fn recipe_hash_is_truncated_and_deterministic() {
    let sample = Sample {
      name: "dropbear".to_string(),
      steps: vec!["make".to_string()],
    };

    let h1 = sample.compute_hash().unwrap();
    let h2 = sample.compute_hash().unwrap();

    assert_eq!(h1, h2);
    assert_eq!(h1.0.len(), RECIPE_HASH_PREFIX_LEN);
  }

  #[test]
  fn recipe_hash_changes_with_content() {
    let a = Sample {
      name: "dropbear".to_string(),
      steps: vec!["make".to_string()],
    };
    let b = Sample {
      name: "dropbear".to_string(),
      steps: vec!["make install".to_string()],
    };

    assert_ne!(a.compute_hash().unwrap(), b.compute_hash().unwrap());
  }

  #[test]
  fn hash_file_matches_hash_bytes() {
    let temp = tempdir().unwrap();
    let file_path = temp.path().join("test.txt");
    fs::write(&file_path, "hello world").unwrap();

    let from_file = hash_file(&file_path).unwrap();
    assert_eq!(from_file.0.len(), 64);
    assert_eq!(from_file, hash_bytes(b"hello world"));
  }

  #[test]
  fn hash_file_streams_large_input() {
    let temp = tempdir().unwrap();
    let file_path = temp.path().join("big.bin");
    let data = vec![7u8; 8192 * 3 + 17];
    fs::write(&file_path, &data).unwrap();

    assert_eq!(hash_file(&file_path).unwrap(), hash_bytes(&data));
  }

  #[test]
  fn hash_file_missing_is_error() {
    let temp = tempdir().unwrap();
    let result = hash_file(&temp.path().join("nope"));
    assert!(matches!(result, Err(FileHashError::ReadFile { .. })));
  }
}
