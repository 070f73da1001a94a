//! Orchestration driver.
//!
//! [`run`] turns a [`RecipeSet`] into a populated target root:
//!
//! 1. Build and validate the dependency graph (configuration errors abort here)
//! 2. Restrict it to the requested recipes and their dependencies
//! 3. Fingerprint the toolchain and lock the cache
//! 4. Fail every recipe whose declared destinations collide with another's
//! 5. Dispatch recipes as their dependencies finish, up to `jobs` at once
//!
//! A failed recipe fails all of its transitive dependents without building
//! them; independent recipes carry on. The target root, the staging manifest
//! and the cache are only touched while holding one mutex.

mod schedule;
mod types;

pub use types::{BuildOptions, FailedRecipe, NodeState, RunSummary};

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cache::{BuildCache, CacheEntry, CacheKey, CacheLock, CachedFile};
use crate::error::{ConfigError, NodeError};
use crate::graph::BuildGraph;
use crate::recipe::{RecipeSet, RegisteredRecipe};
use crate::sandbox::{BuildFailure, Sandbox};
use crate::stage::{Stager, StagingManifest, find_collisions, resolve_destination};
use crate::util::hash::HashError;

use schedule::Scheduler;

enum NodeOutcome {
  Built { steps: usize, files: Vec<PathBuf> },
  Cached { files: Vec<PathBuf> },
  Failed { error: NodeError, steps: usize },
}

/// Shared by every build task of one run.
struct NodeContext {
  sandbox: Sandbox,
  stager: Stager,
  cache: BuildCache,
  use_cache: bool,
  manifest: Mutex<StagingManifest>,
}

/// Build every selected recipe and stage its outputs.
///
/// Returns `Err` only for configuration problems found before any build starts;
/// per-recipe failures are reported in the [`RunSummary`].
pub async fn run(recipes: &RecipeSet, options: &BuildOptions) -> Result<RunSummary, ConfigError> {
  let graph = BuildGraph::new(recipes)?;
  let selected: BTreeSet<usize> = if options.only.is_empty() {
    (0..recipes.len()).collect()
  } else {
    graph.closure(&options.only)?
  };

  let fingerprint = options.toolchain.fingerprint()?;
  let keys = selected
    .iter()
    .map(|&idx| Ok((idx, CacheKey::new(&recipes[idx], &fingerprint)?)))
    .collect::<Result<HashMap<usize, CacheKey>, HashError>>()?;

  let jobs = options.jobs.max(1);
  let mut sandbox_config = options.sandbox.clone();
  sandbox_config.root = std::path::absolute(&sandbox_config.root)?;
  sandbox_config.work_root = std::path::absolute(&sandbox_config.work_root)?;
  sandbox_config.jobs = jobs;
  let cache_dir = std::path::absolute(&options.cache_dir)?;

  let _lock = CacheLock::acquire(&cache_dir, &options.command)?;
  std::fs::create_dir_all(&sandbox_config.root)?;
  std::fs::create_dir_all(&sandbox_config.work_root)?;

  info!(
    recipes = selected.len(),
    jobs,
    fingerprint = %fingerprint.short(),
    root = %sandbox_config.root.display(),
    "starting build run"
  );

  let mut scheduler = Scheduler::new(&graph, selected);

  let collisions = find_collisions(scheduler.selected().iter().map(|&idx| &recipes[idx].recipe));
  for (destination, owners) in collisions {
    for (pos, owner) in owners.iter().enumerate() {
      let other = if pos == 0 { &owners[1] } else { &owners[0] };
      let Some(idx) = recipes.position(owner) else {
        continue;
      };
      error!(recipe = %owner, path = %destination, other = %other, "staging collision");
      scheduler.fail(
        idx,
        NodeError::StagingCollision {
          path: PathBuf::from(&destination),
          claimed_by: other.clone(),
          claimant: owner.clone(),
        },
      );
    }
  }

  let ctx = Arc::new(NodeContext {
    stager: Stager::new(&sandbox_config.root),
    sandbox: Sandbox::new(
      sandbox_config,
      Arc::new(options.toolchain.clone()),
      options.sources.clone(),
    ),
    cache: BuildCache::new(&cache_dir, fingerprint.clone()),
    use_cache: options.use_cache,
    manifest: Mutex::new(StagingManifest::new()),
  });

  let semaphore = Arc::new(Semaphore::new(jobs));
  let mut tasks = JoinSet::new();
  let mut running = HashMap::new();
  let mut steps_executed = 0;

  loop {
    while let Some(idx) = scheduler.next_ready() {
      let Ok(permit) = semaphore.clone().try_acquire_owned() else {
        break;
      };
      scheduler.start(idx);

      let entry = recipes[idx].clone();
      let key = keys[&idx].clone();
      let dep_files = scheduler.dep_files(idx);
      let ctx = ctx.clone();
      debug!(recipe = %entry.name(), "dispatching");

      let handle = tasks.spawn(async move {
        let _permit = permit;
        build_node(&ctx, &entry, key, &dep_files).await
      });
      running.insert(handle.id(), idx);
    }

    let Some(joined) = tasks.join_next_with_id().await else {
      break;
    };
    let (id, outcome) = match joined {
      Ok((id, outcome)) => (id, outcome),
      Err(e) => (
        e.id(),
        NodeOutcome::Failed {
          error: NodeError::Aborted(e.to_string()),
          steps: 0,
        },
      ),
    };
    let Some(idx) = running.remove(&id) else {
      continue;
    };
    let name = recipes[idx].name();

    match outcome {
      NodeOutcome::Built { steps, files } => {
        steps_executed += steps;
        info!(recipe = %name, steps, files = files.len(), "recipe built");
        scheduler.complete(idx, NodeState::Built, files);
      }
      NodeOutcome::Cached { files } => {
        info!(recipe = %name, files = files.len(), "recipe cached");
        scheduler.complete(idx, NodeState::Cached, files);
      }
      NodeOutcome::Failed { error, steps } => {
        steps_executed += steps;
        error!(recipe = %name, error = %error, "recipe failed");
        let skipped = scheduler.fail(idx, error);
        if !skipped.is_empty() {
          warn!(recipe = %name, dependents = skipped.len(), "dependents will not be built");
        }
      }
    }
  }

  let mut summary = RunSummary {
    fingerprint,
    built: Vec::new(),
    cached: Vec::new(),
    failed: Vec::new(),
    steps_executed,
    manifest: ctx.manifest.lock().await.clone(),
  };

  let selected: Vec<usize> = scheduler.selected().iter().copied().collect();
  let states: Vec<NodeState> = selected.iter().map(|&idx| scheduler.state(idx)).collect();
  let mut errors = scheduler.into_errors();

  for (idx, state) in selected.into_iter().zip(states) {
    let name = recipes[idx].name().to_string();
    match state {
      NodeState::Built => summary.built.push(name),
      NodeState::Cached => summary.cached.push(name),
      _ => {
        let error = errors
          .remove(&idx)
          .unwrap_or_else(|| NodeError::Aborted("never scheduled".to_string()));
        summary.failed.push(FailedRecipe { name, error });
      }
    }
  }

  info!(
    built = summary.built.len(),
    cached = summary.cached.len(),
    failed = summary.failed.len(),
    steps = summary.steps_executed,
    "build run finished"
  );

  Ok(summary)
}

async fn build_node(ctx: &NodeContext, entry: &RegisteredRecipe, key: CacheKey, dep_files: &[PathBuf]) -> NodeOutcome {
  let name = entry.name();

  if ctx.use_cache {
    let mut manifest = ctx.manifest.lock().await;
    if let Some(cached) = ctx.cache.lookup(&key, ctx.stager.root()) {
      return match claim_cached(ctx, name, &cached, &mut manifest) {
        Ok(files) => NodeOutcome::Cached { files },
        Err(error) => NodeOutcome::Failed { error, steps: 0 },
      };
    }
  }

  info!(recipe = %name, version = %entry.recipe.version, "building recipe");

  let result = match ctx.sandbox.build(entry, &key.recipe_hash.0, dep_files).await {
    Ok(result) => result,
    Err(BuildFailure { error, steps_run }) => {
      return NodeOutcome::Failed {
        error,
        steps: steps_run,
      };
    }
  };
  let steps = result.steps.len();

  let staged = {
    let mut manifest = ctx.manifest.lock().await;
    ctx
      .stager
      .stage(name, &result.artifacts, &mut manifest)
      .and_then(|staged| {
        let files = staged
          .iter()
          .map(|f| CachedFile {
            destination: f.destination.clone(),
            hash: f.hash.clone(),
          })
          .collect();
        ctx
          .cache
          .write(&CacheEntry::new(key, files))
          .map_err(|e| NodeError::Cache(e.to_string()))?;
        Ok(staged)
      })
  };

  ctx.sandbox.finish(&result).await;

  match staged {
    Ok(staged) => NodeOutcome::Built {
      steps,
      files: staged.into_iter().map(|f| f.path).collect(),
    },
    Err(error) => NodeOutcome::Failed { error, steps },
  }
}

/// Claim a cache hit's files in the manifest, all or nothing.
fn claim_cached(
  ctx: &NodeContext,
  name: &str,
  entry: &CacheEntry,
  manifest: &mut StagingManifest,
) -> Result<Vec<PathBuf>, NodeError> {
  for file in &entry.files {
    manifest.check(&file.destination, name)?;
  }
  let mut files = Vec::with_capacity(entry.files.len());
  for file in &entry.files {
    manifest.claim(&file.destination, name)?;
    files.push(resolve_destination(ctx.stager.root(), &file.destination));
  }
  Ok(files)
}
