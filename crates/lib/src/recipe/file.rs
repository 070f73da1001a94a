//! Recipes declared in TOML files.
//!
//! ```toml
//! [[recipe]]
//! name = "dropbear"
//! version = "2020.81"
//! source_url = "https://matt.ucc.asn.au/dropbear/releases/dropbear-2020.81.tar.bz2"
//! host_deps = ["musl-tools"]
//! steps = [
//!   "./configure CC=musl-gcc --enable-static",
//!   { run = "make", env = { V = "1" } },
//! ]
//!
//! [recipe.files]
//! "/bin/dropbear" = "dropbear"
//!
//! [recipe.aux_files]
//! "localoptions.h" = "#define DEBUG_TRACE 1\n"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::recipe::{BuildCtx, BuildStep, Package, Recipe};

#[derive(Debug, Error)]
pub enum RecipeFileError {
  #[error("failed to read recipe file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse recipe file {path}: {message}")]
  Parse { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum StepSpec {
  Command(String),
  Detailed {
    run: String,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    cwd: Option<String>,
  },
}

/// A recipe whose metadata and build procedure come from a TOML table.
#[derive(Debug, Clone, Deserialize)]
pub struct FileRecipe {
  name: String,
  version: String,
  #[serde(default)]
  source_url: String,
  #[serde(default)]
  host_deps: Vec<String>,
  #[serde(default)]
  files: BTreeMap<String, String>,
  #[serde(default)]
  aux_files: BTreeMap<String, String>,
  /// Environment applied to every step; per-step `env` wins on conflict.
  #[serde(default)]
  env: BTreeMap<String, String>,
  #[serde(default)]
  steps: Vec<StepSpec>,
}

#[derive(Debug, Deserialize)]
struct RecipeFile {
  #[serde(default)]
  recipe: Vec<FileRecipe>,
}

impl Package for FileRecipe {
  fn descriptor(&self) -> Recipe {
    Recipe {
      name: self.name.clone(),
      version: self.version.clone(),
      source_url: self.source_url.clone(),
      host_deps: self.host_deps.clone(),
      files: self.files.clone(),
    }
  }

  fn build(&self, ctx: &mut BuildCtx) {
    for (path, content) in &self.aux_files {
      ctx.add_file(path, content);
    }

    for spec in &self.steps {
      let (run, env, cwd) = match spec {
        StepSpec::Command(cmd) => (cmd, None, None),
        StepSpec::Detailed { run, env, cwd } => (run, Some(env), cwd.as_deref()),
      };

      let mut step = BuildStep::new(run);
      step.env = self.env.clone();
      if let Some(env) = env {
        step.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
      }
      step.cwd = cwd.map(str::to_string);
      ctx.run(step);
    }
  }
}

/// Parse recipes from TOML text. `origin` is only used in error messages.
pub fn parse_recipes(content: &str, origin: &Path) -> Result<Vec<FileRecipe>, RecipeFileError> {
  let file: RecipeFile = toml::from_str(content).map_err(|e| RecipeFileError::Parse {
    path: origin.to_path_buf(),
    message: e.to_string(),
  })?;
  Ok(file.recipe)
}

/// Load every `[[recipe]]` table from a TOML file, in file order.
pub fn load_recipe_file(path: &Path) -> Result<Vec<FileRecipe>, RecipeFileError> {
  let content = std::fs::read_to_string(path).map_err(|source| RecipeFileError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  parse_recipes(&content, path)
}
