//! Default locations, following the XDG base directory layout.

use std::path::PathBuf;

use crate::consts::APP_NAME;

pub const CACHE_DIR_ENV: &str = "ROOTSMITH_CACHE_DIR";
pub const WORK_DIR_ENV: &str = "ROOTSMITH_WORK_DIR";
pub const JOBS_ENV: &str = "ROOTSMITH_JOBS";

/// The user's home directory, or the system temp dir when `HOME` is unset.
pub fn home_dir() -> PathBuf {
  std::env::var_os("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(std::env::temp_dir)
}

pub fn config_dir() -> PathBuf {
  let config_home = std::env::var("XDG_CONFIG_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".config"));
  config_home.join(APP_NAME)
}

/// Configuration file read when none is given on the command line.
pub fn config_file() -> PathBuf {
  config_dir().join("config.toml")
}

/// Default root of the build cache.
///
/// `ROOTSMITH_CACHE_DIR` is not consulted here; `Config::apply_env` layers it on top.
pub fn cache_dir() -> PathBuf {
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}
