//! Orchestrator settings.
//!
//! Loaded in layers: built-in defaults, then the TOML file, then environment
//! variables (`ROOTSMITH_CACHE_DIR`, `ROOTSMITH_WORK_DIR`, `ROOTSMITH_JOBS`).
//! Command-line flags are applied last by the caller.
//!
//! ```toml
//! [build]
//! jobs = 8
//! cache_dir = "/var/cache/rootsmith"
//! sources_dir = "/srv/sources"
//!
//! [toolchain]
//! cc = "musl-gcc"
//! bin_dir = "/opt/musl/bin"
//! cflags = "-Os -pipe"
//!
//! [sandbox]
//! isolate_network = true
//! step_timeout_secs = 3600
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::consts::DEFAULT_SHELL;
use crate::error::ConfigError;
use crate::paths::{self, CACHE_DIR_ENV, JOBS_ENV, WORK_DIR_ENV};
use crate::sandbox::SandboxConfig;
use crate::toolchain::Toolchain;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub build: BuildSection,
  pub toolchain: Toolchain,
  pub sandbox: SandboxSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
  /// Parallel recipe builds; unset or 0 means the number of CPUs.
  pub jobs: Option<usize>,
  pub cache_dir: Option<PathBuf>,
  pub work_dir: Option<PathBuf>,
  /// Directory of pre-extracted source trees, one `<name>-<version>/` per recipe.
  pub sources_dir: Option<PathBuf>,
  pub keep_work_dirs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
  pub shell: String,
  /// System directories appended to `PATH` inside the sandbox.
  pub path: Vec<PathBuf>,
  pub isolate_network: bool,
  pub step_timeout_secs: Option<u64>,
}

impl Default for SandboxSection {
  fn default() -> Self {
    Self {
      shell: DEFAULT_SHELL.to_string(),
      path: vec![PathBuf::from("/usr/bin"), PathBuf::from("/bin")],
      isolate_network: true,
      step_timeout_secs: None,
    }
  }
}

impl Config {
  pub fn parse(content: &str, origin: &Path) -> Result<Self, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ConfigFile {
      path: origin.to_path_buf(),
      message: e.to_string(),
    })
  }

  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ConfigFile {
      path: path.to_path_buf(),
      message: e.to_string(),
    })?;
    debug!(path = %path.display(), "loaded config");
    Self::parse(&content, path)
  }

  /// Load an explicit file, else the user's config file if present, else defaults.
  /// Environment overrides are applied in every case.
  pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
    let mut config = match explicit {
      Some(path) => Self::load(path)?,
      None => {
        let default_path = paths::config_file();
        if default_path.is_file() {
          Self::load(&default_path)?
        } else {
          Self::default()
        }
      }
    };
    config.apply_env();
    Ok(config)
  }

  pub fn apply_env(&mut self) {
    if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
      self.build.cache_dir = Some(PathBuf::from(dir));
    }
    if let Ok(dir) = std::env::var(WORK_DIR_ENV) {
      self.build.work_dir = Some(PathBuf::from(dir));
    }
    if let Ok(jobs) = std::env::var(JOBS_ENV) {
      match jobs.parse::<usize>() {
        Ok(n) => self.build.jobs = Some(n),
        Err(e) => warn!(value = %jobs, error = %e, "ignoring invalid {JOBS_ENV}"),
      }
    }
  }

  pub fn jobs(&self) -> usize {
    match self.build.jobs {
      Some(n) if n > 0 => n,
      _ => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
    }
  }

  pub fn cache_dir(&self) -> PathBuf {
    self.build.cache_dir.clone().unwrap_or_else(paths::cache_dir)
  }

  pub fn work_dir(&self) -> PathBuf {
    self
      .build
      .work_dir
      .clone()
      .unwrap_or_else(|| self.cache_dir().join("work"))
  }

  /// Executor settings for a run targeting `root`.
  pub fn sandbox_config(&self, root: &Path) -> SandboxConfig {
    let mut sandbox = SandboxConfig::new(root, &self.work_dir());
    sandbox.shell = self.sandbox.shell.clone();
    sandbox.system_path = self.sandbox.path.clone();
    sandbox.isolate_network = self.sandbox.isolate_network;
    sandbox.step_timeout = self.sandbox.step_timeout_secs.map(Duration::from_secs);
    sandbox.keep_work_dirs = self.build.keep_work_dirs;
    sandbox.jobs = self.jobs();
    sandbox
  }
}
