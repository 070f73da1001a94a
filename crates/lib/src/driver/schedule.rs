//! Bookkeeping for dynamic dispatch over the build graph.
//!
//! Tracks each node's state, how many of its dependencies are still unbuilt, and
//! which nodes are ready. A node becomes ready the moment its last dependency is
//! built or cached; among ready nodes the lowest registration index goes first.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use tracing::warn;

use crate::driver::NodeState;
use crate::error::NodeError;
use crate::graph::BuildGraph;

pub(crate) struct Scheduler<'g> {
  graph: &'g BuildGraph,
  selected: BTreeSet<usize>,
  states: Vec<NodeState>,
  waiting: Vec<usize>,
  ready: BTreeSet<usize>,
  errors: BTreeMap<usize, NodeError>,
  staged: Vec<Vec<PathBuf>>,
}

impl<'g> Scheduler<'g> {
  pub fn new(graph: &'g BuildGraph, selected: BTreeSet<usize>) -> Self {
    let waiting: Vec<usize> = (0..graph.len())
      .map(|idx| {
        graph
          .dependencies(idx)
          .into_iter()
          .filter(|dep| selected.contains(dep))
          .count()
      })
      .collect();
    let ready = selected.iter().copied().filter(|&idx| waiting[idx] == 0).collect();

    Self {
      graph,
      states: vec![NodeState::Pending; graph.len()],
      waiting,
      ready,
      errors: BTreeMap::new(),
      staged: vec![Vec::new(); graph.len()],
      selected,
    }
  }

  pub fn selected(&self) -> &BTreeSet<usize> {
    &self.selected
  }

  pub fn next_ready(&self) -> Option<usize> {
    self.ready.first().copied()
  }

  pub fn start(&mut self, idx: usize) {
    self.ready.remove(&idx);
    self.states[idx] = NodeState::Building;
  }

  pub fn state(&self, idx: usize) -> NodeState {
    self.states[idx]
  }

  /// Record a built or cached node and release its dependents.
  pub fn complete(&mut self, idx: usize, state: NodeState, files: Vec<PathBuf>) {
    self.states[idx] = state;
    self.staged[idx] = files;

    for dependent in self.graph.dependents(idx) {
      if !self.selected.contains(&dependent) {
        continue;
      }
      self.waiting[dependent] = self.waiting[dependent].saturating_sub(1);
      if self.waiting[dependent] == 0 && self.states[dependent] == NodeState::Pending {
        self.ready.insert(dependent);
      }
    }
  }

  /// Record a failure and fail every pending transitive dependent without building it.
  ///
  /// Returns the dependents that were skipped.
  pub fn fail(&mut self, idx: usize, error: NodeError) -> Vec<usize> {
    self.states[idx] = NodeState::Failed;
    self.ready.remove(&idx);
    self.errors.insert(idx, error);

    let origin = self.graph.name(idx).to_string();
    let mut skipped = Vec::new();
    for dependent in self.graph.transitive_dependents(idx) {
      if !self.selected.contains(&dependent) || self.states[dependent] != NodeState::Pending {
        continue;
      }
      warn!(recipe = %self.graph.name(dependent), dependency = %origin, "skipping recipe, dependency failed");
      self.states[dependent] = NodeState::Failed;
      self.ready.remove(&dependent);
      self.errors.insert(
        dependent,
        NodeError::DependencyFailed {
          dependency: origin.clone(),
        },
      );
      skipped.push(dependent);
    }
    skipped
  }

  /// Files staged by the direct dependencies of `idx`.
  pub fn dep_files(&self, idx: usize) -> Vec<PathBuf> {
    self
      .graph
      .dependencies(idx)
      .into_iter()
      .flat_map(|dep| self.staged[dep].iter().cloned())
      .collect()
  }

  pub fn into_errors(self) -> BTreeMap<usize, NodeError> {
    self.errors
  }
}
