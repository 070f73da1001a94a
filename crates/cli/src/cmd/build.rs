//! `rootsmith build`: build recipes and stage them into a target root.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use rootsmith_lib::config::Config;
use rootsmith_lib::{BuildOptions, ConfigError, RunSummary, run};

use crate::cmd::{EXIT_BUILD_FAILED, load_recipes};
use crate::output::{
  OutputFormat, format_duration, print_error, print_json, print_stat, print_success, print_warning, symbols,
  truncate_hash,
};

/// Failure output lines shown per recipe in text mode.
const OUTPUT_TAIL_LINES: usize = 20;

pub struct BuildArgs {
  pub root: PathBuf,
  pub recipes: Option<PathBuf>,
  pub config: Option<PathBuf>,
  pub only: Vec<String>,
  pub jobs: Option<usize>,
  pub no_cache: bool,
  pub keep_work_dirs: bool,
  pub step_timeout: Option<Duration>,
  pub format: OutputFormat,
}

#[derive(Serialize)]
struct BuildReport<'a> {
  root: PathBuf,
  duration_ms: u128,
  #[serde(flatten)]
  summary: &'a RunSummary,
}

pub fn cmd_build(args: BuildArgs) -> Result<ExitCode> {
  let start = Instant::now();
  let config = Config::discover(args.config.as_deref())?;
  let recipes = load_recipes(args.recipes.as_deref())?;
  let root = std::path::absolute(&args.root).with_context(|| format!("Invalid root {}", args.root.display()))?;

  let mut options = BuildOptions::from_config(&config, &root);
  if let Some(jobs) = args.jobs {
    options.jobs = jobs.max(1);
  }
  if args.step_timeout.is_some() {
    options.sandbox.step_timeout = args.step_timeout;
  }
  options.sandbox.keep_work_dirs |= args.keep_work_dirs;
  options.use_cache = !args.no_cache;
  options.only = args.only;
  options.command = "rootsmith build".to_string();

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let summary = rt.block_on(async {
    let compiler = options.toolchain.probe().await.map_err(ConfigError::from)?;
    info!(compiler = %compiler, "probed toolchain");
    run(&recipes, &options).await
  })?;

  if args.format.is_json() {
    print_json(&BuildReport {
      root,
      duration_ms: start.elapsed().as_millis(),
      summary: &summary,
    })?;
  } else {
    print_text(&summary, &root, start.elapsed());
  }

  if summary.success() {
    Ok(ExitCode::SUCCESS)
  } else {
    Ok(ExitCode::from(EXIT_BUILD_FAILED))
  }
}

fn print_text(summary: &RunSummary, root: &std::path::Path, elapsed: Duration) {
  for name in &summary.built {
    println!("  {} {name}", symbols::ADD);
  }
  for name in &summary.cached {
    println!("  {} {name} (cached)", symbols::INFO);
  }

  for failed in &summary.failed {
    if failed.error.is_dependency_failure() {
      print_warning(&format!("{}: {}", failed.name, failed.error));
      continue;
    }
    print_error(&format!("{}: {}", failed.name, failed.error));
    let lines: Vec<&str> = failed.output().lines().collect();
    let skip = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    for line in &lines[skip..] {
      eprintln!("    {line}");
    }
  }

  println!();
  if summary.success() {
    print_success("Build complete!");
  } else {
    print_error(&format!("{} recipe(s) failed", summary.failed.len()));
  }
  print_stat("Root", &root.display().to_string());
  print_stat("Toolchain", truncate_hash(&summary.fingerprint.0));
  print_stat("Built", &summary.built.len().to_string());
  print_stat("Cached", &summary.cached.len().to_string());
  print_stat("Failed", &summary.failed.len().to_string());
  print_stat("Steps run", &summary.steps_executed.to_string());
  print_stat("Files staged", &summary.manifest.len().to_string());
  print_stat("Duration", &format_duration(elapsed));
}
