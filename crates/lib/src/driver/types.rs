//! Inputs and outputs of a build run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::config::Config;
use crate::consts::APP_NAME;
use crate::error::NodeError;
use crate::sandbox::{NoSources, SandboxConfig, SourceProvider, SourceTree};
use crate::stage::StagingManifest;
use crate::toolchain::{Toolchain, ToolchainFingerprint};

/// Lifecycle of one recipe within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
  Pending,
  Building,
  Built,
  /// Built in an earlier run; outputs already staged and verified.
  Cached,
  Failed,
}

#[derive(Clone)]
pub struct BuildOptions {
  /// Target root, working directories and step environment.
  pub sandbox: SandboxConfig,
  pub cache_dir: PathBuf,
  pub toolchain: Toolchain,
  pub sources: Arc<dyn SourceProvider>,
  /// Maximum number of recipes building at once.
  pub jobs: usize,
  /// Build only these recipes and their dependencies; empty means all.
  pub only: Vec<String>,
  /// Consult the cache before building. Entries are written either way.
  pub use_cache: bool,
  /// Recorded in the cache lock so a blocked run can name the holder.
  pub command: String,
}

impl BuildOptions {
  pub fn new(root: &Path, cache_dir: &Path, work_dir: &Path) -> Self {
    Self {
      sandbox: SandboxConfig::new(root, work_dir),
      cache_dir: cache_dir.to_path_buf(),
      toolchain: Toolchain::default(),
      sources: Arc::new(NoSources),
      jobs: 1,
      only: Vec::new(),
      use_cache: true,
      command: APP_NAME.to_string(),
    }
  }

  pub fn from_config(config: &Config, root: &Path) -> Self {
    let sources: Arc<dyn SourceProvider> = match &config.build.sources_dir {
      Some(dir) => Arc::new(SourceTree::new(dir)),
      None => Arc::new(NoSources),
    };

    Self {
      sandbox: config.sandbox_config(root),
      cache_dir: config.cache_dir(),
      toolchain: config.toolchain.clone(),
      sources,
      jobs: config.jobs(),
      only: Vec::new(),
      use_cache: true,
      command: APP_NAME.to_string(),
    }
  }

  pub fn root(&self) -> &Path {
    &self.sandbox.root
  }
}

impl std::fmt::Debug for BuildOptions {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BuildOptions")
      .field("sandbox", &self.sandbox)
      .field("cache_dir", &self.cache_dir)
      .field("toolchain", &self.toolchain)
      .field("jobs", &self.jobs)
      .field("only", &self.only)
      .field("use_cache", &self.use_cache)
      .finish_non_exhaustive()
  }
}

/// A recipe that did not end up built, with the reason.
#[derive(Debug)]
pub struct FailedRecipe {
  pub name: String,
  pub error: NodeError,
}

impl FailedRecipe {
  pub fn output(&self) -> &str {
    self.error.output()
  }
}

impl Serialize for FailedRecipe {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut s = serializer.serialize_struct("FailedRecipe", 4)?;
    s.serialize_field("name", &self.name)?;
    s.serialize_field("error", &self.error.to_string())?;
    s.serialize_field("output", self.error.output())?;
    s.serialize_field("dependency_failure", &self.error.is_dependency_failure())?;
    s.end()
  }
}

/// Outcome of [`run`](crate::driver::run). Recipe lists follow registration order.
#[derive(Debug, Serialize)]
pub struct RunSummary {
  pub fingerprint: ToolchainFingerprint,
  pub built: Vec<String>,
  pub cached: Vec<String>,
  pub failed: Vec<FailedRecipe>,
  pub steps_executed: usize,
  pub manifest: StagingManifest,
}

impl RunSummary {
  pub fn success(&self) -> bool {
    self.failed.is_empty()
  }

  pub fn failure(&self, name: &str) -> Option<&NodeError> {
    self.failed.iter().find(|f| f.name == name).map(|f| &f.error)
  }

  /// Final state of a recipe, or `None` if it was not part of the run.
  pub fn state(&self, name: &str) -> Option<NodeState> {
    if self.built.iter().any(|n| n == name) {
      Some(NodeState::Built)
    } else if self.cached.iter().any(|n| n == name) {
      Some(NodeState::Cached)
    } else if self.failed.iter().any(|f| f.name == name) {
      Some(NodeState::Failed)
    } else {
      None
    }
  }
}
