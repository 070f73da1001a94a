//! Error taxonomy for a build run.
//!
//! Two tiers:
//! - [`ConfigError`]: the recipe set or environment is unusable; the run aborts
//!   before any build starts.
//! - [`NodeError`]: one recipe failed; recorded against that node, propagated to
//!   its dependents, and reported in the run summary.

use std::path::PathBuf;

use thiserror::Error;

use crate::cache::lock::CacheLockError;
use crate::recipe::file::RecipeFileError;
use crate::toolchain::ToolchainError;
use crate::util::hash::{FileHashError, HashError};

/// Fatal, run-level errors detected before any build is dispatched.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("duplicate recipe name: {0}")]
  DuplicateRecipe(String),

  #[error("unresolved dependency: recipe '{recipe}' depends on '{missing}', which is not registered")]
  UnresolvedDependency { recipe: String, missing: String },

  #[error("recipe '{0}' depends on itself")]
  SelfDependency(String),

  #[error("dependency cycle detected: {}", .path.join(" -> "))]
  Cycle { path: Vec<String> },

  #[error("recipe '{recipe}' has invalid destination path '{path}': {reason}")]
  InvalidDestination {
    recipe: String,
    path: String,
    reason: &'static str,
  },

  #[error("recipe '{recipe}' has invalid artifact name '{artifact}': {reason}")]
  InvalidArtifact {
    recipe: String,
    artifact: String,
    reason: &'static str,
  },

  #[error("recipe '{recipe}' has invalid auxiliary file path '{path}': {reason}")]
  InvalidAuxFile {
    recipe: String,
    path: String,
    reason: &'static str,
  },

  #[error("unknown recipe requested: {0}")]
  UnknownRecipe(String),

  #[error(transparent)]
  RecipeFile(#[from] RecipeFileError),

  #[error("failed to load config {}: {message}", .path.display())]
  ConfigFile { path: PathBuf, message: String },

  #[error(transparent)]
  Toolchain(#[from] ToolchainError),

  #[error("failed to hash recipe definition: {0}")]
  Hash(#[from] HashError),

  #[error(transparent)]
  CacheLock(#[from] CacheLockError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Failure of a single build node.
#[derive(Debug, Error)]
pub enum NodeError {
  /// A build step exited non-zero.
  #[error("build step failed with exit code {code:?}: {step}")]
  StepFailed {
    step: String,
    code: Option<i32>,
    output: String,
  },

  /// A build step exceeded the configured timeout and was killed.
  #[error("build step timed out after {timeout_ms}ms: {step}")]
  StepTimedOut {
    step: String,
    timeout_ms: u64,
    output: String,
  },

  /// The shell for a build step could not be started.
  #[error("failed to spawn build step '{step}': {message}")]
  Spawn { step: String, message: String },

  /// A declared file was not produced by the build.
  #[error("artifact not produced: '{artifact}' (expected at {})", .path.display())]
  ArtifactMissing { artifact: String, path: PathBuf },

  /// Two recipes claim the same destination path.
  #[error("staging collision at {}: claimed by '{claimed_by}' and '{claimant}'", .path.display())]
  StagingCollision {
    path: PathBuf,
    claimed_by: String,
    claimant: String,
  },

  /// A staged copy does not hash to the same value as its source.
  #[error("copy verification failed for {}: expected {expected}, got {actual}", .path.display())]
  CopyVerification {
    path: PathBuf,
    expected: String,
    actual: String,
  },

  /// A dependency failed, so this node was never built.
  #[error("dependency failed: {dependency}")]
  DependencyFailed { dependency: String },

  /// The task building this node panicked or was cancelled.
  #[error("build task aborted: {0}")]
  Aborted(String),

  /// The cache entry for a successful build could not be written.
  #[error("failed to write cache entry: {0}")]
  Cache(String),

  #[error("failed to hash recipe definition: {0}")]
  Hash(#[from] HashError),

  #[error(transparent)]
  FileHash(#[from] FileHashError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl NodeError {
  /// Captured diagnostic output associated with this failure, if any.
  pub fn output(&self) -> &str {
    match self {
      NodeError::StepFailed { output, .. } | NodeError::StepTimedOut { output, .. } => output,
      _ => "",
    }
  }

  /// Returns true if this node never ran because something upstream failed.
  pub fn is_dependency_failure(&self) -> bool {
    matches!(self, NodeError::DependencyFailed { .. })
  }
}
