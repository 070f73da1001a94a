use rootsmith_lib::driver::NodeState;
use rootsmith_lib::{NodeError, run};

use super::common::{ShellRecipe, TestEnv, recipe_set};

#[tokio::test]
async fn colliding_recipes_both_fail_and_stage_nothing() {
  let env = TestEnv::new();
  let recipes = recipe_set(&[
    ShellRecipe::new("busybox")
      .produces("/bin/sh", "sh", "busybox sh")
      .produces("/bin/busybox", "busybox", "bb"),
    ShellRecipe::new("dash").produces("/bin/sh", "dash", "dash"),
    ShellRecipe::new("init").dep("dash").produces("/sbin/init", "init", "init"),
    ShellRecipe::new("dropbear").produces("/bin/dropbear", "dropbear", "server"),
  ]);

  let summary = run(&recipes, &env.options()).await.unwrap();

  for name in ["busybox", "dash"] {
    match summary.failure(name) {
      Some(NodeError::StagingCollision { path, claimed_by, claimant }) => {
        assert_eq!(path.to_str(), Some("/bin/sh"));
        assert_eq!(claimant, name);
        assert_ne!(claimed_by, name);
      }
      other => panic!("expected collision for {name}, got {other:?}"),
    }
  }
  assert!(matches!(
    summary.failure("init"),
    Some(NodeError::DependencyFailed { dependency }) if dependency == "dash"
  ));
  assert_eq!(summary.built, vec!["dropbear"]);
  assert_eq!(summary.steps_executed, 1);

  assert!(!env.staged("/bin/sh").exists());
  assert!(!env.staged("/bin/busybox").exists());
  assert_eq!(summary.manifest.len(), 1);
  assert_eq!(summary.manifest.owner("/bin/dropbear"), Some("dropbear"));
}

#[tokio::test]
async fn differently_spelled_destinations_still_collide() {
  let env = TestEnv::new();
  let recipes = recipe_set(&[
    ShellRecipe::new("busybox").produces("/bin/sh", "sh", "busybox sh"),
    ShellRecipe::new("dash").produces("/bin//sh", "dash", "dash"),
    ShellRecipe::new("mksh").produces("/usr/./bin/mksh/", "mksh", "mksh"),
  ]);

  let summary = run(&recipes, &env.options()).await.unwrap();

  for name in ["busybox", "dash"] {
    match summary.failure(name) {
      Some(NodeError::StagingCollision { path, .. }) => assert_eq!(path.to_str(), Some("/bin/sh")),
      other => panic!("expected collision for {name}, got {other:?}"),
    }
  }
  assert!(!env.staged("/bin/sh").exists());

  assert_eq!(summary.built, vec!["mksh"]);
  assert_eq!(summary.manifest.owner("/usr/bin/mksh"), Some("mksh"));
  assert_eq!(env.read_staged("/usr/bin/mksh"), "mksh");
}

#[tokio::test]
async fn collision_outside_requested_closure_is_ignored() {
  let env = TestEnv::new();
  let recipes = recipe_set(&[
    ShellRecipe::new("busybox").produces("/bin/sh", "sh", "busybox sh"),
    ShellRecipe::new("dash").produces("/bin/sh", "dash", "dash"),
  ]);
  let mut options = env.options();
  options.only = vec!["dash".to_string()];

  let summary = run(&recipes, &options).await.unwrap();

  assert_eq!(summary.state("dash"), Some(NodeState::Built));
  assert_eq!(summary.state("busybox"), None);
  assert_eq!(env.read_staged("/bin/sh"), "dash");
}

#[tokio::test]
async fn staged_files_keep_their_mode() {
  use std::os::unix::fs::PermissionsExt;

  let env = TestEnv::new();
  let recipes = recipe_set(&[ShellRecipe::new("tool")
    .file("/usr/bin/tool", "tool")
    .step("printf '#!/bin/sh\\n' > tool")
    .step("chmod 0755 tool")]);

  run(&recipes, &env.options()).await.unwrap();

  let mode = std::fs::metadata(env.staged("/usr/bin/tool")).unwrap().permissions().mode();
  assert_eq!(mode & 0o777, 0o755);
}
