mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::{BuildArgs, cmd_build, cmd_gc, cmd_graph, exit_status};
use crate::output::{OutputFormat, print_error};

/// rootsmith - cross-compile package recipes into a root filesystem tree
#[derive(Parser)]
#[command(name = "rootsmith", author, version, about, long_about = None)]
struct Cli {
  /// Increase log output (-v for info, -vv for debug). RUST_LOG overrides.
  #[arg(short, long, global = true, action = ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build recipes and stage their outputs into ROOT
  Build {
    /// Target root directory
    root: PathBuf,

    /// TOML recipe file (default: the built-in recipes)
    #[arg(long)]
    recipes: Option<PathBuf>,

    /// Configuration file (default: $XDG_CONFIG_HOME/rootsmith/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Build only this recipe and its dependencies (repeatable)
    #[arg(long, value_name = "NAME")]
    only: Vec<String>,

    /// Maximum number of recipes building at once
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Ignore cached results and rebuild everything
    #[arg(long)]
    no_cache: bool,

    /// Keep per-recipe working directories after building
    #[arg(long)]
    keep_work_dirs: bool,

    /// Kill any build step running longer than this (e.g. "20m")
    #[arg(long, value_parser = humantime::parse_duration)]
    step_timeout: Option<Duration>,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Show the build order and the recipes that can build in parallel
  Graph {
    /// TOML recipe file (default: the built-in recipes)
    #[arg(long)]
    recipes: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Remove cache entries built with other toolchains
  Gc {
    /// Configuration file (default: $XDG_CONFIG_HOME/rootsmith/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Report what would be removed without deleting anything
    #[arg(long)]
    dry_run: bool,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },
}

fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Build {
      root,
      recipes,
      config,
      only,
      jobs,
      no_cache,
      keep_work_dirs,
      step_timeout,
      format,
    } => cmd_build(BuildArgs {
      root,
      recipes,
      config,
      only,
      jobs,
      no_cache,
      keep_work_dirs,
      step_timeout,
      format,
    }),
    Commands::Graph { recipes, format } => cmd_graph(recipes.as_deref(), format),
    Commands::Gc {
      config,
      dry_run,
      format,
    } => cmd_gc(config.as_deref(), dry_run, format),
  };

  match result {
    Ok(code) => code,
    Err(err) => {
      print_error(&format!("{err:#}"));
      ExitCode::from(exit_status(&err))
    }
  }
}
