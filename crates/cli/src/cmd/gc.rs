use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};

use rootsmith_lib::cache::{BuildCache, CacheLock};
use rootsmith_lib::config::Config;

use crate::output::{
  OutputFormat, format_bytes, format_duration, print_info, print_json, print_stat, print_success, truncate_hash,
};

pub fn cmd_gc(config: Option<&Path>, dry_run: bool, format: OutputFormat) -> Result<ExitCode> {
  let start = Instant::now();
  let mut config = Config::discover(config)?;
  let cache_dir = config.cache_dir();

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(config.toolchain.probe())?;
  let fingerprint = config.toolchain.fingerprint()?;

  let _lock = CacheLock::acquire(&cache_dir, "rootsmith gc").context("Failed to acquire cache lock")?;
  let cache = BuildCache::new(&cache_dir, fingerprint);
  let stats = cache.gc(dry_run)?;

  if format.is_json() {
    print_json(&stats)?;
  } else {
    println!();
    if dry_run {
      print_info("Dry run - no changes made");
    } else {
      print_success("Garbage collection complete!");
    }
    print_stat("Cache", &cache_dir.display().to_string());
    print_stat("Toolchain", truncate_hash(&cache.fingerprint().0));
    print_stat("Namespaces scanned", &stats.namespaces_scanned.to_string());
    print_stat("Namespaces removed", &stats.namespaces_deleted.to_string());
    print_stat("Space freed", &format_bytes(stats.bytes_freed));
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(ExitCode::SUCCESS)
}
