//! Names and fixed values shared across the crate.

pub const APP_NAME: &str = "rootsmith";

/// Length of the truncated recipe hash used in cache file and work directory names.
pub const RECIPE_HASH_PREFIX_LEN: usize = 20;

/// Lock file guarding a cache directory against concurrent runs.
pub const CACHE_LOCK_FILENAME: &str = ".lock";

/// Format version written into every cache entry.
pub const CACHE_ENTRY_VERSION: u32 = 1;

/// 1980-01-01T00:00:00Z, the ZIP epoch, for reproducible timestamps.
pub const SOURCE_DATE_EPOCH: &str = "315532800";

/// Suffix for in-flight staged copies before they are renamed into place.
pub const STAGING_TMP_SUFFIX: &str = ".rootsmith-staging";

/// Shell that runs build steps unless configured otherwise.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// `HOME` inside the sandbox; does not exist, so builds cannot read user config.
pub const SANDBOX_HOME: &str = "/homeless-shelter";

/// Per-build temp directory, relative to the working directory.
pub const WORK_TMP_DIR: &str = ".tmp";
