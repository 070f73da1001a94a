//! rootsmith-lib: a cross-compilation package-build orchestrator.
//!
//! This crate turns a set of package recipes into a populated root filesystem tree:
//! - `Recipe` / `Package`: what a package is and how it is built
//! - `BuildGraph`: dependency order across recipes and their host tools
//! - `sandbox`: runs one recipe's build steps in a fixed toolchain environment
//! - `stage`: copies verified artifacts into the target root
//! - `cache`: skips rebuilds when nothing relevant changed
//! - `driver`: schedules everything and reports the outcome

pub mod cache;
pub mod config;
pub mod consts;
pub mod driver;
pub mod error;
pub mod graph;
pub mod paths;
pub mod recipe;
pub mod sandbox;
pub mod stage;
pub mod toolchain;
pub mod util;

pub use driver::{BuildOptions, RunSummary, run};
pub use error::{ConfigError, NodeError};
pub use graph::BuildGraph;
pub use recipe::{BuildCtx, BuildPlan, BuildStep, Package, Recipe, RecipeSet};
pub use toolchain::{Toolchain, ToolchainFingerprint};
