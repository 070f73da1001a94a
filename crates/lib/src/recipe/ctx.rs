//! Build context handed to a recipe's `build()`.
//!
//! The context records, it does not execute: auxiliary files and steps are
//! collected into a [`BuildPlan`] that the sandbox runs later. Auxiliary files are
//! always written before the first step, whatever order `build()` called them in.

use std::collections::BTreeMap;

use crate::recipe::{AuxFile, BuildPlan, BuildStep};

#[derive(Debug, Default)]
pub struct BuildCtx {
  files: Vec<AuxFile>,
  steps: Vec<BuildStep>,
  env: BTreeMap<String, String>,
}

impl BuildCtx {
  pub fn new() -> Self {
    Self::default()
  }

  /// Place an extra source file (e.g. a local options header) in the working directory.
  ///
  /// A later call for the same path replaces the earlier content.
  pub fn add_file(&mut self, path: &str, content: &str) {
    if let Some(existing) = self.files.iter_mut().find(|f| f.path == path) {
      existing.content = content.to_string();
      return;
    }
    self.files.push(AuxFile {
      path: path.to_string(),
      content: content.to_string(),
    });
  }

  /// Set a variable for every step recorded after this call.
  pub fn env(&mut self, key: &str, value: &str) {
    self.env.insert(key.to_string(), value.to_string());
  }

  /// Append one shell-level step.
  pub fn run(&mut self, step: impl Into<BuildStep>) {
    self.run_with(step.into());
  }

  /// Append a fully specified step. Its own `env` wins over [`BuildCtx::env`].
  pub fn run_with(&mut self, mut step: BuildStep) {
    for (key, value) in &self.env {
      step.env.entry(key.clone()).or_insert_with(|| value.clone());
    }
    self.steps.push(step);
  }

  /// Append a plain `make` step. Parallelism comes from `MAKEFLAGS` in the sandbox.
  pub fn make(&mut self) {
    self.run("make");
  }

  /// Append `make <args>`.
  pub fn make_args(&mut self, args: &str) {
    self.run(format!("make {}", args));
  }

  pub fn steps(&self) -> &[BuildStep] {
    &self.steps
  }

  pub fn into_plan(self) -> BuildPlan {
    BuildPlan {
      files: self.files,
      steps: self.steps,
    }
  }
}
