//! Sandboxed build executor.
//!
//! Runs one recipe's [`BuildPlan`](crate::recipe::BuildPlan) so that the build
//! observes only a fixed environment:
//! - a private working directory, wiped and re-seeded for every attempt
//! - auxiliary files written before the first step
//! - a cleared environment with toolchain variables, `HOME=/homeless-shelter`,
//!   a private temp dir, `LANG=C` and a fixed `SOURCE_DATE_EPOCH`
//! - `PATH` limited to host-dependency tool dirs, the toolchain and the system dirs
//! - optionally no network
//!
//! Steps run sequentially; the first non-zero exit aborts the build.

pub mod cmd;
mod isolate;
pub mod sources;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::consts::{DEFAULT_SHELL, SANDBOX_HOME, SOURCE_DATE_EPOCH, WORK_TMP_DIR};
use crate::error::NodeError;
use crate::recipe::RegisteredRecipe;
use crate::toolchain::Toolchain;

pub use cmd::{StepCommand, StepOutcome, run_step};
pub use sources::{NoSources, SourceProvider, SourceTree};

#[derive(Debug, Clone)]
pub struct SandboxConfig {
  /// Target root; exported to steps as `ROOTSMITH_ROOT`.
  pub root: PathBuf,
  /// Parent of the per-build working directories.
  pub work_root: PathBuf,
  pub shell: String,
  /// System directories appended to every `PATH`.
  pub system_path: Vec<PathBuf>,
  pub isolate_network: bool,
  pub step_timeout: Option<Duration>,
  /// Keep working directories after the build instead of deleting them.
  pub keep_work_dirs: bool,
  /// Exported as `MAKEFLAGS=-j<jobs>`.
  pub jobs: usize,
}

impl SandboxConfig {
  pub fn new(root: &Path, work_root: &Path) -> Self {
    Self {
      root: root.to_path_buf(),
      work_root: work_root.to_path_buf(),
      shell: DEFAULT_SHELL.to_string(),
      system_path: vec![PathBuf::from("/usr/bin"), PathBuf::from("/bin")],
      isolate_network: true,
      step_timeout: None,
      keep_work_dirs: false,
      jobs: 1,
    }
  }
}

/// A declared output resolved inside the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
  pub name: String,
  /// Absolute destination in the target root.
  pub destination: String,
  pub source: PathBuf,
}

/// Outcome of a successful build, consumed by the stager.
#[derive(Debug, Serialize)]
pub struct BuildResult {
  pub recipe: String,
  pub work_dir: PathBuf,
  pub steps: Vec<StepOutcome>,
  pub artifacts: Vec<Artifact>,
}

/// A failed build and how many of its steps were started.
#[derive(Debug)]
pub struct BuildFailure {
  pub error: NodeError,
  pub steps_run: usize,
}

impl From<NodeError> for BuildFailure {
  fn from(error: NodeError) -> Self {
    Self { error, steps_run: 0 }
  }
}

impl From<std::io::Error> for BuildFailure {
  fn from(error: std::io::Error) -> Self {
    NodeError::from(error).into()
  }
}

#[derive(Clone)]
pub struct Sandbox {
  config: SandboxConfig,
  toolchain: Arc<Toolchain>,
  sources: Arc<dyn SourceProvider>,
}

impl Sandbox {
  pub fn new(config: SandboxConfig, toolchain: Arc<Toolchain>, sources: Arc<dyn SourceProvider>) -> Self {
    Self {
      config,
      toolchain,
      sources,
    }
  }

  pub fn config(&self) -> &SandboxConfig {
    &self.config
  }

  pub fn work_dir(&self, entry: &RegisteredRecipe, tag: &str) -> PathBuf {
    self.config.work_root.join(format!("{}-{}", entry.recipe.id(), tag))
  }

  /// Environment shared by every step of one build, before per-step overrides.
  pub fn environment(&self, dep_files: &[PathBuf], work_dir: &Path) -> BTreeMap<String, String> {
    let mut dirs: Vec<&Path> = Vec::new();
    for file in dep_files {
      if let Some(parent) = file.parent()
        && !dirs.contains(&parent)
      {
        dirs.push(parent);
      }
    }
    if let Some(bin) = self.toolchain.bin_dir()
      && !dirs.contains(&bin)
    {
      dirs.push(bin);
    }
    for dir in &self.config.system_path {
      if !dirs.contains(&dir.as_path()) {
        dirs.push(dir);
      }
    }
    let path = dirs.iter().map(|d| d.display().to_string()).collect::<Vec<_>>().join(":");
    let tmp = work_dir.join(WORK_TMP_DIR).display().to_string();

    let mut env = BTreeMap::new();
    env.insert("PATH".to_string(), path);
    env.insert("HOME".to_string(), SANDBOX_HOME.to_string());
    env.insert("TMPDIR".to_string(), tmp.clone());
    env.insert("TMP".to_string(), tmp.clone());
    env.insert("TEMP".to_string(), tmp);
    env.insert("LANG".to_string(), "C".to_string());
    env.insert("LC_ALL".to_string(), "C".to_string());
    env.insert("SOURCE_DATE_EPOCH".to_string(), SOURCE_DATE_EPOCH.to_string());
    env.insert("MAKEFLAGS".to_string(), format!("-j{}", self.config.jobs.max(1)));
    env.insert("ROOTSMITH_ROOT".to_string(), self.config.root.display().to_string());
    env.extend(self.toolchain.env_vars());
    env
  }

  /// Build one recipe.
  ///
  /// `tag` distinguishes working directories of different definitions of the
  /// same recipe; `dep_files` are the staged files of its host dependencies.
  pub async fn build(
    &self,
    entry: &RegisteredRecipe,
    tag: &str,
    dep_files: &[PathBuf],
  ) -> Result<BuildResult, BuildFailure> {
    let work_dir = self.work_dir(entry, tag);
    let result = self.build_in(entry, &work_dir, dep_files).await;

    if result.is_err() && !self.config.keep_work_dirs {
      self.discard(&work_dir).await;
    }
    result
  }

  async fn build_in(
    &self,
    entry: &RegisteredRecipe,
    work_dir: &Path,
    dep_files: &[PathBuf],
  ) -> Result<BuildResult, BuildFailure> {
    let recipe = &entry.recipe;

    if fs::try_exists(work_dir).await? {
      fs::remove_dir_all(work_dir).await?;
    }
    fs::create_dir_all(work_dir).await?;

    let sources = self.sources.clone();
    let seed_recipe = recipe.clone();
    let seed_dir = work_dir.to_path_buf();
    tokio::task::spawn_blocking(move || sources.seed(&seed_recipe, &seed_dir))
      .await
      .map_err(std::io::Error::other)??;

    fs::create_dir_all(work_dir.join(WORK_TMP_DIR)).await?;

    for file in &entry.plan.files {
      let path = work_dir.join(&file.path);
      if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
      }
      fs::write(&path, &file.content).await?;
      debug!(recipe = %recipe.name, path = %file.path, "wrote auxiliary file");
    }

    let base_env = self.environment(dep_files, work_dir);
    let mut steps = Vec::with_capacity(entry.plan.steps.len());

    for step in &entry.plan.steps {
      let mut env = base_env.clone();
      env.extend(step.env.iter().map(|(k, v)| (k.clone(), v.clone())));
      let env: Vec<(String, String)> = env.into_iter().collect();
      let cwd = match &step.cwd {
        Some(dir) => work_dir.join(dir),
        None => work_dir.to_path_buf(),
      };

      let command = StepCommand {
        shell: &self.config.shell,
        cmd: &step.cmd,
        cwd: &cwd,
        env: &env,
        isolate_network: self.config.isolate_network,
        timeout: self.config.step_timeout,
      };

      let steps_run = steps.len() + 1;
      let outcome = run_step(&command)
        .await
        .map_err(|error| BuildFailure { error, steps_run })?;

      if !outcome.success() {
        return Err(BuildFailure {
          error: NodeError::StepFailed {
            step: outcome.cmd.clone(),
            code: outcome.code,
            output: outcome.output(),
          },
          steps_run,
        });
      }
      steps.push(outcome);
    }

    let mut artifacts = Vec::with_capacity(recipe.files.len());
    for (destination, name) in &recipe.files {
      let source = work_dir.join(name);
      if !source.is_file() {
        return Err(BuildFailure {
          error: NodeError::ArtifactMissing {
            artifact: name.clone(),
            path: source,
          },
          steps_run: steps.len(),
        });
      }
      artifacts.push(Artifact {
        name: name.clone(),
        destination: destination.clone(),
        source,
      });
    }

    Ok(BuildResult {
      recipe: recipe.name.clone(),
      work_dir: work_dir.to_path_buf(),
      steps,
      artifacts,
    })
  }

  /// Remove a finished build's working directory unless configured to keep it.
  pub async fn finish(&self, result: &BuildResult) {
    if !self.config.keep_work_dirs {
      self.discard(&result.work_dir).await;
    }
  }

  async fn discard(&self, work_dir: &Path) {
    if let Err(e) = fs::remove_dir_all(work_dir).await
      && e.kind() != std::io::ErrorKind::NotFound
    {
      warn!(path = %work_dir.display(), error = %e, "failed to remove working directory");
    }
  }
}
