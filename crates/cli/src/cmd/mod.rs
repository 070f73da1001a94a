mod build;
mod gc;
mod graph;

pub use build::{BuildArgs, cmd_build};
pub use gc::cmd_gc;
pub use graph::cmd_graph;

use std::path::Path;

use rootsmith_lib::cache::CacheLockError;
use rootsmith_lib::recipe::file::{RecipeFileError, load_recipe_file};
use rootsmith_lib::recipe::packages;
use rootsmith_lib::toolchain::ToolchainError;
use rootsmith_lib::{ConfigError, Package, RecipeSet};

/// Some recipes failed to build.
pub const EXIT_BUILD_FAILED: u8 = 1;
/// The recipe set, configuration or environment is unusable.
pub const EXIT_CONFIG: u8 = 2;

/// Recipes from `path`, or the built-in set when no file is given.
pub fn load_recipes(path: Option<&Path>) -> Result<RecipeSet, ConfigError> {
  match path {
    Some(path) => {
      let recipes = load_recipe_file(path)?;
      RecipeSet::from_packages(recipes.iter().map(|r| r as &dyn Package))
    }
    None => packages::builtin(),
  }
}

/// Exit status for an error that ended a command early.
pub fn exit_status(err: &anyhow::Error) -> u8 {
  let config = err.chain().any(|cause| {
    cause.is::<ConfigError>()
      || cause.is::<RecipeFileError>()
      || cause.is::<CacheLockError>()
      || cause.is::<ToolchainError>()
  });
  if config { EXIT_CONFIG } else { EXIT_BUILD_FAILED }
}
