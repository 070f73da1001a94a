use std::time::Duration;

use rootsmith_lib::driver::NodeState;
use rootsmith_lib::{NodeError, run};

use super::common::{ShellRecipe, TestEnv, recipe_set};

#[tokio::test]
async fn failure_propagates_to_dependents_only() {
  let env = TestEnv::new();
  let marker = env.temp.path().join("b-ran");

  let recipes = recipe_set(&[
    ShellRecipe::new("a")
      .file("/lib/liba.a", "liba.a")
      .step("echo 'liba.c:3: error: expected ;' >&2; exit 1"),
    ShellRecipe::new("b")
      .dep("a")
      .file("/bin/b", "b")
      .step(&format!("touch {} b", marker.display())),
    ShellRecipe::new("d").dep("b").produces("/bin/d", "d", "d"),
    ShellRecipe::new("c").produces("/bin/c", "c", "c"),
  ]);

  let summary = run(&recipes, &env.options()).await.unwrap();

  assert!(!summary.success());
  assert_eq!(summary.built, vec!["c"]);
  assert_eq!(env.read_staged("/bin/c"), "c");
  assert_eq!(summary.steps_executed, 2);
  assert!(!marker.exists());

  match summary.failure("a").unwrap() {
    NodeError::StepFailed { code, output, .. } => {
      assert_eq!(*code, Some(1));
      assert!(output.contains("expected ;"));
    }
    other => panic!("expected step failure, got {other}"),
  }
  for dependent in ["b", "d"] {
    assert!(matches!(
      summary.failure(dependent),
      Some(NodeError::DependencyFailed { dependency }) if dependency == "a"
    ));
  }
  assert!(summary.manifest.files_of("a").next().is_none());
}

#[tokio::test]
async fn missing_artifact_stages_nothing() {
  let env = TestEnv::new();
  let recipes = recipe_set(&[ShellRecipe::new("dropbear")
    .file("/bin/dropbear", "dropbear")
    .file("/bin/dropbearkey", "dropbearkey")
    .step("echo server > dropbear")]);

  let summary = run(&recipes, &env.options()).await.unwrap();

  assert!(matches!(
    summary.failure("dropbear"),
    Some(NodeError::ArtifactMissing { artifact, .. }) if artifact == "dropbearkey"
  ));
  assert!(!env.staged("/bin/dropbear").exists());
  assert!(summary.manifest.is_empty());
  assert_eq!(summary.steps_executed, 1);
}

#[tokio::test]
async fn later_steps_do_not_run_after_a_failure() {
  let env = TestEnv::new();
  let marker = env.temp.path().join("installed");
  let recipes = recipe_set(&[ShellRecipe::new("pkg")
    .step("./configure")
    .step(&format!("touch {}", marker.display()))]);

  let summary = run(&recipes, &env.options()).await.unwrap();

  assert_eq!(summary.state("pkg"), Some(NodeState::Failed));
  assert_eq!(summary.steps_executed, 1);
  assert!(!marker.exists());
}

#[tokio::test]
async fn slow_step_times_out() {
  let env = TestEnv::new();
  let recipes = recipe_set(&[
    ShellRecipe::new("hang").step("sleep 30"),
    ShellRecipe::new("quick").produces("/bin/quick", "quick", "q"),
  ]);
  let mut options = env.options();
  options.sandbox.step_timeout = Some(Duration::from_millis(300));

  let summary = run(&recipes, &options).await.unwrap();

  assert!(matches!(summary.failure("hang"), Some(NodeError::StepTimedOut { .. })));
  assert_eq!(summary.state("quick"), Some(NodeState::Built));
}
