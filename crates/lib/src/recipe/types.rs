use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::recipe::BuildCtx;

/// Immutable description of one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
  pub name: String,
  pub version: String,
  #[serde(default)]
  pub source_url: String,
  /// Recipes whose outputs must be staged before this one is built.
  #[serde(default)]
  pub host_deps: Vec<String>,
  /// Absolute destination path in the target root -> artifact name in the working directory.
  #[serde(default)]
  pub files: BTreeMap<String, String>,
}

impl Recipe {
  pub fn new(name: &str, version: &str) -> Self {
    Self {
      name: name.to_string(),
      version: version.to_string(),
      source_url: String::new(),
      host_deps: Vec::new(),
      files: BTreeMap::new(),
    }
  }

  pub fn with_source_url(mut self, url: &str) -> Self {
    self.source_url = url.to_string();
    self
  }

  pub fn with_host_dep(mut self, name: &str) -> Self {
    self.host_deps.push(name.to_string());
    self
  }

  pub fn with_file(mut self, destination: &str, artifact: &str) -> Self {
    self.files.insert(destination.to_string(), artifact.to_string());
    self
  }

  /// `name-version`, used in logs and directory names.
  pub fn id(&self) -> String {
    format!("{}-{}", self.name, self.version)
  }

  /// Rewrite every destination into normal form, so `/bin//sh`, `/bin/./sh`
  /// and `/bin/sh/` all become `/bin/sh`.
  ///
  /// Two destinations of one recipe that collapse onto the same path are an error.
  pub fn normalize_destinations(&mut self) -> Result<(), ConfigError> {
    let mut files = BTreeMap::new();
    for (destination, artifact) in std::mem::take(&mut self.files) {
      let normal = normal_form(&destination);
      if files.insert(normal, artifact).is_some() {
        return Err(ConfigError::InvalidDestination {
          recipe: self.name.clone(),
          path: destination,
          reason: "destination is declared more than once",
        });
      }
    }
    self.files = files;
    Ok(())
  }

  /// Check the descriptor's own invariants (not those relating it to other recipes).
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.host_deps.iter().any(|dep| dep == &self.name) {
      return Err(ConfigError::SelfDependency(self.name.clone()));
    }

    for (destination, artifact) in &self.files {
      let dest = Path::new(destination);
      if !dest.is_absolute() {
        return Err(ConfigError::InvalidDestination {
          recipe: self.name.clone(),
          path: destination.clone(),
          reason: "destination must be absolute",
        });
      }
      if dest.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ConfigError::InvalidDestination {
          recipe: self.name.clone(),
          path: destination.clone(),
          reason: "destination must not contain '..'",
        });
      }
      if dest.components().all(|c| matches!(c, Component::RootDir)) {
        return Err(ConfigError::InvalidDestination {
          recipe: self.name.clone(),
          path: destination.clone(),
          reason: "destination must name a file",
        });
      }
      if normal_form(destination) != *destination {
        return Err(ConfigError::InvalidDestination {
          recipe: self.name.clone(),
          path: destination.clone(),
          reason: "destination must be in normal form",
        });
      }

      let art = Path::new(artifact);
      if artifact.is_empty() || art.is_absolute() {
        return Err(ConfigError::InvalidArtifact {
          recipe: self.name.clone(),
          artifact: artifact.clone(),
          reason: "artifact must be a non-empty relative path",
        });
      }
      if art.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ConfigError::InvalidArtifact {
          recipe: self.name.clone(),
          artifact: artifact.clone(),
          reason: "artifact must not contain '..'",
        });
      }
    }

    Ok(())
  }
}

fn normal_form(path: &str) -> String {
  Path::new(path)
    .components()
    .collect::<PathBuf>()
    .to_string_lossy()
    .into_owned()
}

/// One shell-level build step. The executor does not interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
  pub cmd: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
  /// Working directory relative to the build's working directory.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cwd: Option<String>,
}

impl BuildStep {
  pub fn new(cmd: &str) -> Self {
    Self {
      cmd: cmd.to_string(),
      env: BTreeMap::new(),
      cwd: None,
    }
  }

  pub fn with_env(mut self, key: &str, value: &str) -> Self {
    self.env.insert(key.to_string(), value.to_string());
    self
  }

  pub fn with_cwd(mut self, cwd: &str) -> Self {
    self.cwd = Some(cwd.to_string());
    self
  }
}

impl From<&str> for BuildStep {
  fn from(cmd: &str) -> Self {
    BuildStep::new(cmd)
  }
}

impl From<String> for BuildStep {
  fn from(cmd: String) -> Self {
    BuildStep::new(&cmd)
  }
}

/// An auxiliary source file placed in the working directory before the first step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxFile {
  pub path: String,
  pub content: String,
}

/// Everything a recipe's `build()` recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
  pub files: Vec<AuxFile>,
  pub steps: Vec<BuildStep>,
}

/// The capability surface every package recipe implements.
pub trait Package: Send + Sync {
  /// Metadata: name, version, source, host dependencies and produced files.
  fn descriptor(&self) -> Recipe;

  /// Record the build procedure.
  fn build(&self, ctx: &mut BuildCtx);

  /// Run `build()` against a fresh context and return what it recorded.
  fn plan(&self) -> BuildPlan {
    let mut ctx = BuildCtx::new();
    self.build(&mut ctx);
    ctx.into_plan()
  }
}
