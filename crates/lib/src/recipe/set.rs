//! The explicit registry of recipes for one run.

use std::collections::HashMap;
use std::path::{Component, Path};

use serde::Serialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::recipe::{BuildPlan, Package, Recipe};
use crate::util::hash::{HashError, Hashable, RecipeHash};

/// A recipe after registration: its descriptor plus the plan its `build()` recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredRecipe {
  pub recipe: Recipe,
  pub plan: BuildPlan,
}

impl Hashable for RegisteredRecipe {}

impl RegisteredRecipe {
  /// Hash of the recipe's own definition: descriptor and recorded build plan.
  pub fn definition_hash(&self) -> Result<RecipeHash, HashError> {
    self.compute_hash()
  }

  pub fn name(&self) -> &str {
    &self.recipe.name
  }
}

/// Auxiliary files must stay inside the working directory.
fn validate_aux_files(entry: &RegisteredRecipe) -> Result<(), ConfigError> {
  for file in &entry.plan.files {
    let path = Path::new(&file.path);
    let reason = if file.path.is_empty() || path.is_absolute() {
      "path must be a non-empty relative path"
    } else if path.components().any(|c| matches!(c, Component::ParentDir)) {
      "path must not contain '..'"
    } else {
      continue;
    };
    return Err(ConfigError::InvalidAuxFile {
      recipe: entry.recipe.name.clone(),
      path: file.path.clone(),
      reason,
    });
  }
  Ok(())
}

/// Ordered set of uniquely named recipes.
///
/// Registration order is preserved and breaks ties when ordering builds.
#[derive(Debug, Clone, Default)]
pub struct RecipeSet {
  entries: Vec<RegisteredRecipe>,
  index: HashMap<String, usize>,
}

impl RecipeSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Evaluate and register one package.
  pub fn register(&mut self, package: &dyn Package) -> Result<(), ConfigError> {
    self.insert(RegisteredRecipe {
      recipe: package.descriptor(),
      plan: package.plan(),
    })
  }

  /// Register an already evaluated recipe.
  pub fn insert(&mut self, mut entry: RegisteredRecipe) -> Result<(), ConfigError> {
    entry.recipe.normalize_destinations()?;
    entry.recipe.validate()?;
    validate_aux_files(&entry)?;

    if self.index.contains_key(&entry.recipe.name) {
      return Err(ConfigError::DuplicateRecipe(entry.recipe.name.clone()));
    }

    debug!(
      recipe = %entry.recipe.name,
      version = %entry.recipe.version,
      steps = entry.plan.steps.len(),
      "registered recipe"
    );

    self.index.insert(entry.recipe.name.clone(), self.entries.len());
    self.entries.push(entry);
    Ok(())
  }

  /// Build a set from packages, failing on the first invalid or duplicate recipe.
  pub fn from_packages<'a, I>(packages: I) -> Result<Self, ConfigError>
  where
    I: IntoIterator<Item = &'a dyn Package>,
  {
    let mut set = Self::new();
    for package in packages {
      set.register(package)?;
    }
    Ok(set)
  }

  pub fn get(&self, name: &str) -> Option<&RegisteredRecipe> {
    self.index.get(name).map(|&i| &self.entries[i])
  }

  /// Registration index of a recipe.
  pub fn position(&self, name: &str) -> Option<usize> {
    self.index.get(name).copied()
  }

  pub fn iter(&self) -> impl Iterator<Item = &RegisteredRecipe> {
    self.entries.iter()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|e| e.recipe.name.as_str())
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl std::ops::Index<usize> for RecipeSet {
  type Output = RegisteredRecipe;

  fn index(&self, index: usize) -> &Self::Output {
    &self.entries[index]
  }
}
