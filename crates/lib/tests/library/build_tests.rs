use rootsmith_lib::recipe::file::parse_recipes;
use rootsmith_lib::recipe::{Package, RecipeSet};
use rootsmith_lib::{ConfigError, run};

use super::common::{ShellRecipe, TestEnv, recipe_set};

#[tokio::test]
async fn dependencies_finish_before_dependents_start() {
  let env = TestEnv::new();
  let log = env.log_path();
  let logged = |name: &str| format!("echo start-{name} >> {0} && touch {name} && echo end-{name} >> {0}", log.display());

  let recipes = recipe_set(&[
    ShellRecipe::new("app").dep("libfoo").dep("tools").file("/bin/app", "app").step(&logged("app")),
    ShellRecipe::new("libfoo").dep("tools").file("/lib/libfoo.a", "libfoo").step(&logged("libfoo")),
    ShellRecipe::new("tools").file("/usr/bin/tools", "tools").step(&logged("tools")),
    ShellRecipe::new("docs").file("/share/docs", "docs").step(&logged("docs")),
  ]);

  let summary = run(&recipes, &env.options()).await.unwrap();
  assert!(summary.success(), "{:?}", summary.failed);
  assert_eq!(summary.built, vec!["app", "libfoo", "tools", "docs"]);

  let lines = env.log();
  let at = |entry: &str| lines.iter().position(|l| l == entry).unwrap();
  assert!(at("end-tools") < at("start-libfoo"));
  assert!(at("end-libfoo") < at("start-app"));
  assert!(at("end-tools") < at("start-app"));
}

#[tokio::test]
async fn cycle_is_reported_before_any_step_runs() {
  let env = TestEnv::new();
  let marker = env.temp.path().join("ran");
  let step = format!("touch {}", marker.display());

  let recipes = recipe_set(&[
    ShellRecipe::new("a").dep("b").step(&step),
    ShellRecipe::new("b").dep("a").step(&step),
  ]);

  let err = run(&recipes, &env.options()).await.unwrap_err();
  match err {
    ConfigError::Cycle { path } => {
      assert_eq!(path.first(), path.last());
      assert!(path.contains(&"a".to_string()));
      assert!(path.contains(&"b".to_string()));
    }
    other => panic!("expected cycle, got {other}"),
  }
  assert!(!marker.exists());
}

#[tokio::test]
async fn staged_tools_are_on_path_for_dependents() {
  let env = TestEnv::new();
  let recipes = recipe_set(&[
    ShellRecipe::new("cross-cc")
      .file("/usr/bin/cross-cc", "cross-cc")
      .step("printf '#!/bin/sh\\necho compiled \"$@\"\\n' > cross-cc")
      .step("chmod +x cross-cc"),
    ShellRecipe::new("hello")
      .dep("cross-cc")
      .file("/bin/hello", "hello")
      .step("cross-cc hello.c > hello"),
  ]);

  let summary = run(&recipes, &env.options()).await.unwrap();

  assert!(summary.success(), "{:?}", summary.failed);
  assert_eq!(env.read_staged("/bin/hello").trim(), "compiled hello.c");
}

#[tokio::test]
async fn aux_files_are_visible_to_steps() {
  let env = TestEnv::new();
  let recipes = recipe_set(&[ShellRecipe::new("dropbear")
    .aux("localoptions.h", "#define DROPBEAR_SVR_PASSWORD_AUTH 0\n")
    .file("/etc/dropbear/options.h", "options.h")
    .step("cp localoptions.h options.h")]);

  let summary = run(&recipes, &env.options()).await.unwrap();

  assert!(summary.success(), "{:?}", summary.failed);
  assert_eq!(
    env.read_staged("/etc/dropbear/options.h"),
    "#define DROPBEAR_SVR_PASSWORD_AUTH 0\n"
  );
}

#[tokio::test]
async fn manifest_is_identical_regardless_of_parallelism() {
  let recipes = recipe_set(&[
    ShellRecipe::new("a").produces("/bin/a", "a", "a"),
    ShellRecipe::new("b").dep("a").produces("/bin/b", "b", "b"),
    ShellRecipe::new("c").produces("/lib/c", "c", "c"),
    ShellRecipe::new("d").dep("c").produces("/lib/d", "d", "d"),
  ]);

  let serial_env = TestEnv::new();
  let mut serial = serial_env.options();
  serial.jobs = 1;
  let one = run(&recipes, &serial).await.unwrap();

  let parallel_env = TestEnv::new();
  let mut parallel = parallel_env.options();
  parallel.jobs = 8;
  let many = run(&recipes, &parallel).await.unwrap();

  assert_eq!(one.manifest, many.manifest);
  assert_eq!(one.built, many.built);
  assert_eq!(
    one.manifest.iter().collect::<Vec<_>>(),
    vec![("/bin/a", "a"), ("/bin/b", "b"), ("/lib/c", "c"), ("/lib/d", "d")]
  );
}

const RECIPES_TOML: &str = r##"
[[recipe]]
name = "musl-tools"
version = "1.2.2"
steps = ["printf '#!/bin/sh\necho musl\n' > musl-gcc", "chmod +x musl-gcc"]

[recipe.files]
"/usr/bin/musl-gcc" = "musl-gcc"

[[recipe]]
name = "dropbear"
version = "2020.81"
host_deps = ["musl-tools"]
env = { CFLAGS_EXTRA = "-DLOCAL" }
steps = [
  "mkdir -p build",
  { run = "echo \"$(musl-gcc) $CFLAGS_EXTRA $MODE\" > dropbear", cwd = "build", env = { MODE = "static" } },
]

[recipe.files]
"/bin/dropbear" = "build/dropbear"

[recipe.aux_files]
"localoptions.h" = "#define DEBUG_TRACE 1\n"
"##;

#[tokio::test]
async fn recipe_file_builds_end_to_end() {
  let env = TestEnv::new();
  let parsed = parse_recipes(RECIPES_TOML, "recipes.toml".as_ref()).unwrap();
  let recipes = RecipeSet::from_packages(parsed.iter().map(|r| r as &dyn Package)).unwrap();

  let summary = run(&recipes, &env.options()).await.unwrap();

  assert!(summary.success(), "{:?}", summary.failed);
  assert_eq!(summary.built, vec!["musl-tools", "dropbear"]);
  assert_eq!(summary.steps_executed, 4);
  assert_eq!(env.read_staged("/bin/dropbear").trim(), "musl -DLOCAL static");
  assert_eq!(summary.manifest.owner("/bin/dropbear"), Some("dropbear"));
}
