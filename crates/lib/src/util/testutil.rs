//! Shared fixtures for unit tests.

use std::path::Path;

use crate::recipe::{BuildPlan, BuildStep, Recipe, RegisteredRecipe};
use crate::sandbox::SandboxConfig;

/// A registered recipe with the given files and shell steps, no dependencies.
pub fn registered(name: &str, version: &str, files: &[(&str, &str)], steps: &[&str]) -> RegisteredRecipe {
  let mut recipe = Recipe::new(name, version);
  for (destination, artifact) in files {
    recipe = recipe.with_file(destination, artifact);
  }
  RegisteredRecipe {
    recipe,
    plan: BuildPlan {
      files: Vec::new(),
      steps: steps.iter().map(|s| BuildStep::new(s)).collect(),
    },
  }
}

/// Sandbox settings rooted in a temp dir: target root at `<base>/root`, work dirs
/// at `<base>/work`, no network namespace (unavailable in many CI containers).
pub fn sandbox_config(base: &Path) -> SandboxConfig {
  let mut config = SandboxConfig::new(&base.join("root"), &base.join("work"));
  config.isolate_network = false;
  config.jobs = 2;
  config
}
