//! Recipe contract.
//!
//! A recipe describes how to fetch, configure and compile one package. Recipes are
//! an open set behind the [`Package`] trait: anything that can describe itself
//! (a [`Recipe`] descriptor) and record its build procedure into a [`BuildCtx`]
//! can be registered in a [`RecipeSet`].
//!
//! # Submodules
//!
//! - [`ctx`] - `BuildCtx`, the primitives a recipe's `build()` may call
//! - [`file`] - recipes declared in TOML files
//! - [`packages`] - recipes shipped with the crate

pub mod ctx;
pub mod file;
pub mod packages;
mod set;
mod types;

pub use ctx::BuildCtx;
pub use set::{RecipeSet, RegisteredRecipe};
pub use types::*;
