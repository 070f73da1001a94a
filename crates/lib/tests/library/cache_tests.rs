use rootsmith_lib::cache::{BuildCache, CacheKey, CacheLock};
use rootsmith_lib::driver::NodeState;
use rootsmith_lib::{ConfigError, run};

use super::common::{ShellRecipe, TestEnv, recipe_set};

fn chain() -> Vec<ShellRecipe> {
  vec![
    ShellRecipe::new("musl-tools").produces("/usr/bin/musl-gcc", "musl-gcc", "cc"),
    ShellRecipe::new("dropbear")
      .dep("musl-tools")
      .produces("/bin/dropbear", "dropbear", "server"),
    ShellRecipe::new("busybox").produces("/bin/busybox", "busybox", "bb"),
  ]
}

#[tokio::test]
async fn unchanged_second_run_is_fully_cached() {
  let env = TestEnv::new();
  let recipes = recipe_set(&chain());
  let options = env.options();

  let first = run(&recipes, &options).await.unwrap();
  assert_eq!(first.built.len(), 3);
  assert_eq!(first.steps_executed, 3);

  let second = run(&recipes, &options).await.unwrap();
  assert!(second.success());
  assert!(second.built.is_empty());
  assert_eq!(second.cached, vec!["musl-tools", "dropbear", "busybox"]);
  assert_eq!(second.steps_executed, 0);
  assert_eq!(second.manifest, first.manifest);
}

#[tokio::test]
async fn toolchain_change_rebuilds_everything() {
  let env = TestEnv::new();
  let recipes = recipe_set(&chain());
  let mut options = env.options();

  let first = run(&recipes, &options).await.unwrap();

  options.toolchain.cflags = "-O2 -pipe".to_string();
  let second = run(&recipes, &options).await.unwrap();

  assert_ne!(first.fingerprint, second.fingerprint);
  assert_eq!(second.built, vec!["musl-tools", "dropbear", "busybox"]);
  assert!(second.cached.is_empty());
  assert_eq!(second.steps_executed, 3);
}

#[tokio::test]
async fn changed_recipe_is_rebuilt_alone() {
  let env = TestEnv::new();
  let options = env.options();
  run(&recipe_set(&chain()), &options).await.unwrap();

  let mut changed = chain();
  changed[2] = ShellRecipe::new("busybox").produces("/bin/busybox", "busybox", "bb-2");
  let summary = run(&recipe_set(&changed), &options).await.unwrap();

  assert_eq!(summary.built, vec!["busybox"]);
  assert_eq!(summary.cached, vec!["musl-tools", "dropbear"]);
  assert_eq!(env.read_staged("/bin/busybox"), "bb-2");
}

#[tokio::test]
async fn tampered_output_forces_rebuild() {
  let env = TestEnv::new();
  let recipes = recipe_set(&chain());
  let options = env.options();
  run(&recipes, &options).await.unwrap();

  std::fs::write(env.staged("/bin/dropbear"), "patched").unwrap();
  std::fs::remove_file(env.staged("/bin/busybox")).unwrap();

  let summary = run(&recipes, &options).await.unwrap();

  assert_eq!(summary.state("musl-tools"), Some(NodeState::Cached));
  assert_eq!(summary.state("dropbear"), Some(NodeState::Built));
  assert_eq!(summary.state("busybox"), Some(NodeState::Built));
  assert_eq!(env.read_staged("/bin/dropbear"), "server");
  assert_eq!(env.read_staged("/bin/busybox"), "bb");
}

#[tokio::test]
async fn corrupt_entry_is_a_miss() {
  let env = TestEnv::new();
  let recipes = recipe_set(&chain());
  let options = env.options();
  let first = run(&recipes, &options).await.unwrap();

  let cache = BuildCache::new(&options.cache_dir, first.fingerprint.clone());
  let key = CacheKey::new(&recipes[0], &first.fingerprint).unwrap();
  let entry = cache.entry_path(&key);
  assert!(entry.is_file());
  std::fs::write(&entry, "{ not json").unwrap();

  let summary = run(&recipes, &options).await.unwrap();

  assert!(summary.success(), "{:?}", summary.failed);
  assert_eq!(summary.built, vec!["musl-tools"]);
  assert_eq!(summary.cached, vec!["dropbear", "busybox"]);
  assert!(cache.verify(&key, &options.sandbox.root).unwrap().is_some());
}

#[tokio::test]
async fn failed_recipe_is_not_cached() {
  let env = TestEnv::new();
  let recipes = recipe_set(&[ShellRecipe::new("flaky").file("/bin/flaky", "flaky").step("exit 1")]);
  let options = env.options();

  run(&recipes, &options).await.unwrap();
  let summary = run(&recipes, &options).await.unwrap();

  assert_eq!(summary.state("flaky"), Some(NodeState::Failed));
  assert_eq!(summary.steps_executed, 1);
}

#[tokio::test]
async fn held_lock_blocks_a_run() {
  let env = TestEnv::new();
  let recipes = recipe_set(&chain());
  let options = env.options();

  let _held = CacheLock::acquire(&options.cache_dir, "rootsmith gc").unwrap();
  let err = run(&recipes, &options).await.unwrap_err();

  assert!(matches!(err, ConfigError::CacheLock(_)), "{err}");
  assert!(!env.staged("/bin/busybox").exists());
}
