//! Seeding a working directory with a recipe's source tree.
//!
//! Downloading and unpacking sources happens outside the orchestrator; a
//! [`SourceProvider`] only places an already extracted tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::recipe::Recipe;

pub trait SourceProvider: Send + Sync {
  /// Populate `work_dir` (which exists and is empty) with the sources for `recipe`.
  fn seed(&self, recipe: &Recipe, work_dir: &Path) -> io::Result<()>;
}

/// Leaves the working directory empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSources;

impl SourceProvider for NoSources {
  fn seed(&self, _recipe: &Recipe, _work_dir: &Path) -> io::Result<()> {
    Ok(())
  }
}

/// Copies `<dir>/<name>-<version>/` when it exists.
#[derive(Debug, Clone)]
pub struct SourceTree {
  dir: PathBuf,
}

impl SourceTree {
  pub fn new(dir: &Path) -> Self {
    Self { dir: dir.to_path_buf() }
  }

  pub fn source_dir(&self, recipe: &Recipe) -> PathBuf {
    self.dir.join(recipe.id())
  }
}

impl SourceProvider for SourceTree {
  fn seed(&self, recipe: &Recipe, work_dir: &Path) -> io::Result<()> {
    let src = self.source_dir(recipe);
    if !src.is_dir() {
      debug!(recipe = %recipe.name, path = %src.display(), "no extracted sources, starting empty");
      return Ok(());
    }

    copy_tree(&src, work_dir)?;
    debug!(recipe = %recipe.name, from = %src.display(), "seeded sources");
    Ok(())
  }
}

/// Recursive copy keeping permissions and symlinks.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
  for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
    let entry = entry.map_err(io::Error::other)?;
    let relative = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    let target = dst.join(relative);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_symlink() {
      let link = fs::read_link(entry.path())?;
      std::os::unix::fs::symlink(link, &target)?;
    } else {
      fs::copy(entry.path(), &target)?;
    }
  }
  Ok(())
}
