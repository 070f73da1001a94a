//! Shared helpers for library integration tests.

use std::path::{Path, PathBuf};

use rootsmith_lib::recipe::{BuildCtx, Package, Recipe, RecipeSet};
use rootsmith_lib::sandbox::SandboxConfig;
use rootsmith_lib::BuildOptions;
use tempfile::TempDir;

/// A recipe assembled from shell steps.
#[derive(Debug, Clone)]
pub struct ShellRecipe {
  name: String,
  version: String,
  deps: Vec<String>,
  files: Vec<(String, String)>,
  aux: Vec<(String, String)>,
  steps: Vec<String>,
}

impl ShellRecipe {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      version: "1.0".to_string(),
      deps: Vec::new(),
      files: Vec::new(),
      aux: Vec::new(),
      steps: Vec::new(),
    }
  }

  pub fn dep(mut self, name: &str) -> Self {
    self.deps.push(name.to_string());
    self
  }

  pub fn file(mut self, destination: &str, artifact: &str) -> Self {
    self.files.push((destination.to_string(), artifact.to_string()));
    self
  }

  pub fn aux(mut self, path: &str, content: &str) -> Self {
    self.aux.push((path.to_string(), content.to_string()));
    self
  }

  pub fn step(mut self, cmd: &str) -> Self {
    self.steps.push(cmd.to_string());
    self
  }

  /// Produce `artifact` containing `content`, and install it at `destination`.
  pub fn produces(self, destination: &str, artifact: &str, content: &str) -> Self {
    let cmd = format!("printf '%s' '{content}' > {artifact}");
    self.file(destination, artifact).step(&cmd)
  }
}

impl Package for ShellRecipe {
  fn descriptor(&self) -> Recipe {
    let mut recipe = Recipe::new(&self.name, &self.version);
    for dep in &self.deps {
      recipe = recipe.with_host_dep(dep);
    }
    for (destination, artifact) in &self.files {
      recipe = recipe.with_file(destination, artifact);
    }
    recipe
  }

  fn build(&self, ctx: &mut BuildCtx) {
    for (path, content) in &self.aux {
      ctx.add_file(path, content);
    }
    for step in &self.steps {
      ctx.run(step.as_str());
    }
  }
}

pub fn recipe_set(recipes: &[ShellRecipe]) -> RecipeSet {
  RecipeSet::from_packages(recipes.iter().map(|r| r as &dyn Package)).unwrap()
}

/// Temporary root, cache and work directories for one test.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn root(&self) -> PathBuf {
    self.temp.path().join("root")
  }

  /// A file outside every sandbox that steps can append to.
  pub fn log_path(&self) -> PathBuf {
    self.temp.path().join("build.log")
  }

  pub fn log(&self) -> Vec<String> {
    std::fs::read_to_string(self.log_path())
      .unwrap_or_default()
      .lines()
      .map(str::to_string)
      .collect()
  }

  pub fn options(&self) -> BuildOptions {
    let base = self.temp.path();
    let mut options = BuildOptions::new(&self.root(), &base.join("cache"), &base.join("work"));
    options.sandbox = sandbox_config(base);
    options.jobs = 4;
    options
  }

  pub fn staged(&self, destination: &str) -> PathBuf {
    self.root().join(destination.trim_start_matches('/'))
  }

  pub fn read_staged(&self, destination: &str) -> String {
    std::fs::read_to_string(self.staged(destination)).unwrap()
  }
}

fn sandbox_config(base: &Path) -> SandboxConfig {
  let mut config = SandboxConfig::new(&base.join("root"), &base.join("work"));
  config.isolate_network = false;
  config
}
