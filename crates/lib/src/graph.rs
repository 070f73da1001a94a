//! Dependency graph over registered recipes.
//!
//! Edges run from a host dependency to its dependent. Construction validates the
//! graph (every `host_deps` name resolves, no cycles) and computes a deterministic
//! build order: a recipe becomes eligible once all its dependencies are ordered,
//! and ties among eligible recipes go to the one registered first.

use std::collections::{BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::ConfigError;
use crate::recipe::RecipeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
  Unvisited,
  InProgress,
  Done,
}

/// A validated, acyclic dependency graph.
///
/// Node indices equal registration indices in the originating [`RecipeSet`].
#[derive(Debug)]
pub struct BuildGraph {
  graph: DiGraph<String, ()>,
  order: Vec<usize>,
}

impl BuildGraph {
  /// Build the graph for a recipe set.
  ///
  /// # Errors
  ///
  /// - `SelfDependency` if a recipe lists itself in `host_deps`
  /// - `UnresolvedDependency` if a `host_deps` name is not registered
  /// - `Cycle` with the full cycle path if the dependencies loop
  pub fn new(recipes: &RecipeSet) -> Result<Self, ConfigError> {
    let mut graph = DiGraph::with_capacity(recipes.len(), recipes.len());

    for entry in recipes.iter() {
      graph.add_node(entry.recipe.name.clone());
    }

    for (idx, entry) in recipes.iter().enumerate() {
      for dep in &entry.recipe.host_deps {
        if dep == &entry.recipe.name {
          return Err(ConfigError::SelfDependency(dep.clone()));
        }
        let dep_idx = recipes
          .position(dep)
          .ok_or_else(|| ConfigError::UnresolvedDependency {
            recipe: entry.recipe.name.clone(),
            missing: dep.clone(),
          })?;
        // Edge from dependency to dependent
        graph.update_edge(NodeIndex::new(dep_idx), NodeIndex::new(idx), ());
      }
    }

    let mut dag = Self {
      graph,
      order: Vec::new(),
    };
    dag.detect_cycle(recipes)?;
    dag.order = dag.compute_order();
    Ok(dag)
  }

  /// Depth-first search along `host_deps` with three-colour marking.
  fn detect_cycle(&self, recipes: &RecipeSet) -> Result<(), ConfigError> {
    let mut marks = vec![Mark::Unvisited; self.graph.node_count()];
    let mut path = Vec::new();

    for start in 0..self.graph.node_count() {
      if marks[start] == Mark::Unvisited {
        self.visit(start, recipes, &mut marks, &mut path)?;
      }
    }
    Ok(())
  }

  fn visit(
    &self,
    idx: usize,
    recipes: &RecipeSet,
    marks: &mut [Mark],
    path: &mut Vec<usize>,
  ) -> Result<(), ConfigError> {
    marks[idx] = Mark::InProgress;
    path.push(idx);

    // Declared order keeps the reported cycle stable.
    for dep in &recipes[idx].recipe.host_deps {
      let Some(dep_idx) = recipes.position(dep) else {
        continue;
      };
      match marks[dep_idx] {
        Mark::InProgress => {
          let start = path.iter().position(|&i| i == dep_idx).unwrap_or(0);
          let mut cycle: Vec<String> = path[start..].iter().map(|&i| self.graph[NodeIndex::new(i)].clone()).collect();
          cycle.push(self.graph[NodeIndex::new(dep_idx)].clone());
          return Err(ConfigError::Cycle { path: cycle });
        }
        Mark::Unvisited => self.visit(dep_idx, recipes, marks, path)?,
        Mark::Done => {}
      }
    }

    path.pop();
    marks[idx] = Mark::Done;
    Ok(())
  }

  /// Kahn's algorithm with the lowest registration index always taken first.
  fn compute_order(&self) -> Vec<usize> {
    let mut in_degree: Vec<usize> = (0..self.graph.node_count())
      .map(|i| self.graph.neighbors_directed(NodeIndex::new(i), Direction::Incoming).count())
      .collect();

    let mut ready: BTreeSet<usize> = (0..in_degree.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(in_degree.len());

    while let Some(idx) = ready.pop_first() {
      order.push(idx);
      for next in self.graph.neighbors_directed(NodeIndex::new(idx), Direction::Outgoing) {
        let deg = &mut in_degree[next.index()];
        *deg = deg.saturating_sub(1);
        if *deg == 0 {
          ready.insert(next.index());
        }
      }
    }

    order
  }

  /// Recipes in build order (registration indices).
  pub fn order(&self) -> &[usize] {
    &self.order
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn name(&self, idx: usize) -> &str {
    &self.graph[NodeIndex::new(idx)]
  }

  /// Direct dependencies of a recipe, in registration order.
  pub fn dependencies(&self, idx: usize) -> Vec<usize> {
    self.neighbors(idx, Direction::Incoming)
  }

  /// Direct dependents of a recipe, in registration order.
  pub fn dependents(&self, idx: usize) -> Vec<usize> {
    self.neighbors(idx, Direction::Outgoing)
  }

  fn neighbors(&self, idx: usize, direction: Direction) -> Vec<usize> {
    let mut out: Vec<usize> = self
      .graph
      .neighbors_directed(NodeIndex::new(idx), direction)
      .map(|n| n.index())
      .collect();
    out.sort_unstable();
    out.dedup();
    out
  }

  /// Every recipe that directly or indirectly depends on `idx`.
  pub fn transitive_dependents(&self, idx: usize) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut stack = self.dependents(idx);
    while let Some(next) = stack.pop() {
      if seen.insert(next) {
        stack.extend(self.dependents(next));
      }
    }
    seen
  }

  /// The named recipes plus everything they need.
  pub fn closure<S: AsRef<str>>(&self, names: &[S]) -> Result<BTreeSet<usize>, ConfigError> {
    let by_name: HashMap<&str, usize> = self
      .graph
      .node_indices()
      .map(|n| (self.graph[n].as_str(), n.index()))
      .collect();

    let mut keep = BTreeSet::new();
    let mut stack = Vec::new();
    for name in names {
      let name = name.as_ref();
      let idx = by_name
        .get(name)
        .copied()
        .ok_or_else(|| ConfigError::UnknownRecipe(name.to_string()))?;
      stack.push(idx);
    }
    while let Some(idx) = stack.pop() {
      if keep.insert(idx) {
        stack.extend(self.dependencies(idx));
      }
    }
    Ok(keep)
  }

  /// Group recipes into levels: every recipe's dependencies sit in earlier levels.
  pub fn waves(&self) -> Vec<Vec<usize>> {
    let mut level = vec![0usize; self.len()];
    for &idx in &self.order {
      level[idx] = self
        .dependencies(idx)
        .into_iter()
        .map(|dep| level[dep] + 1)
        .max()
        .unwrap_or(0);
    }

    let max_level = level.iter().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<usize>> = vec![Vec::new(); max_level + 1];
    for idx in 0..self.len() {
      waves[level[idx]].push(idx);
    }
    waves.retain(|w| !w.is_empty());
    waves
  }
}
