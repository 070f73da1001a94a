//! Copying verified build artifacts into the target root.
//!
//! Staging is all-or-nothing per recipe: every destination is checked against
//! the [`StagingManifest`] before anything is copied, each copy is hashed
//! against its source before it is renamed into place, and claims are recorded
//! only once every file landed. If any copy fails, the files this attempt wrote
//! are removed again.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::consts::STAGING_TMP_SUFFIX;
use crate::error::NodeError;
use crate::recipe::Recipe;
use crate::sandbox::Artifact;
use crate::util::hash::{ContentHash, hash_file};

/// Map an absolute destination like `/bin/dropbear` onto the target root.
pub fn resolve_destination(root: &Path, destination: &str) -> PathBuf {
  root.join(destination.trim_start_matches('/'))
}

/// Which recipe owns each destination path in the target root.
///
/// Ordered by destination so the manifest does not depend on build interleaving.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagingManifest {
  entries: BTreeMap<String, String>,
}

impl StagingManifest {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn owner(&self, destination: &str) -> Option<&str> {
    self.entries.get(destination).map(String::as_str)
  }

  /// Fail if `destination` already belongs to a recipe other than `recipe`.
  pub fn check(&self, destination: &str, recipe: &str) -> Result<(), NodeError> {
    match self.owner(destination) {
      Some(owner) if owner != recipe => Err(NodeError::StagingCollision {
        path: PathBuf::from(destination),
        claimed_by: owner.to_string(),
        claimant: recipe.to_string(),
      }),
      _ => Ok(()),
    }
  }

  /// Record a claim after [`StagingManifest::check`] passed.
  pub fn claim(&mut self, destination: &str, recipe: &str) -> Result<(), NodeError> {
    self.check(destination, recipe)?;
    self.entries.insert(destination.to_string(), recipe.to_string());
    Ok(())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.entries.iter().map(|(d, r)| (d.as_str(), r.as_str()))
  }

  /// Destinations owned by one recipe, in path order.
  pub fn files_of<'a>(&'a self, recipe: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    self.iter().filter(move |(_, r)| *r == recipe).map(|(d, _)| d)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// Destinations declared by more than one recipe, with every claimant in input order.
pub fn find_collisions<'a>(recipes: impl IntoIterator<Item = &'a Recipe>) -> BTreeMap<String, Vec<String>> {
  let mut claims: BTreeMap<String, Vec<String>> = BTreeMap::new();
  for recipe in recipes {
    for destination in recipe.files.keys() {
      claims.entry(destination.clone()).or_default().push(recipe.name.clone());
    }
  }
  claims.retain(|_, owners| owners.len() > 1);
  claims
}

/// One file placed in the target root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedFile {
  pub destination: String,
  pub path: PathBuf,
  pub hash: ContentHash,
}

#[derive(Debug, Clone)]
pub struct Stager {
  root: PathBuf,
}

impl Stager {
  pub fn new(root: &Path) -> Self {
    Self {
      root: root.to_path_buf(),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Copy a recipe's artifacts into the root and claim their destinations.
  ///
  /// Must run while holding the lock that guards the manifest and the root.
  pub fn stage(
    &self,
    recipe: &str,
    artifacts: &[Artifact],
    manifest: &mut StagingManifest,
  ) -> Result<Vec<StagedFile>, NodeError> {
    for artifact in artifacts {
      manifest.check(&artifact.destination, recipe)?;
    }

    let mut written = Vec::new();
    let mut staged = Vec::with_capacity(artifacts.len());

    for artifact in artifacts {
      match self.copy_one(artifact, &mut written) {
        Ok(file) => staged.push(file),
        Err(e) => {
          self.rollback(recipe, &written);
          return Err(e);
        }
      }
    }

    for file in &staged {
      manifest.claim(&file.destination, recipe)?;
    }

    debug!(recipe, files = staged.len(), written = written.len(), "staged artifacts");
    Ok(staged)
  }

  fn copy_one(&self, artifact: &Artifact, written: &mut Vec<PathBuf>) -> Result<StagedFile, NodeError> {
    let target = resolve_destination(&self.root, &artifact.destination);
    let expected = hash_file(&artifact.source)?;

    if target.is_file()
      && let Ok(existing) = hash_file(&target)
      && existing == expected
    {
      debug!(path = %target.display(), "identical file already staged");
      return Ok(StagedFile {
        destination: artifact.destination.clone(),
        path: target,
        hash: expected,
      });
    }

    if let Some(parent) = target.parent() {
      fs::create_dir_all(parent)?;
    }

    let mut tmp_name = target.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(STAGING_TMP_SUFFIX);
    let tmp = target.with_file_name(tmp_name);

    // fs::copy carries the source permission bits over
    fs::copy(&artifact.source, &tmp)?;

    verify_copy(&tmp, &target, &expected)?;

    if let Err(e) = fs::rename(&tmp, &target) {
      let _ = fs::remove_file(&tmp);
      return Err(e.into());
    }
    written.push(target.clone());

    Ok(StagedFile {
      destination: artifact.destination.clone(),
      path: target,
      hash: expected,
    })
  }

  fn rollback(&self, recipe: &str, written: &[PathBuf]) {
    for path in written {
      if let Err(e) = fs::remove_file(path) {
        warn!(recipe, path = %path.display(), error = %e, "failed to remove partially staged file");
      }
    }
  }
}

/// Check that `tmp` hashes to `expected`, removing it if it does not.
fn verify_copy(tmp: &Path, target: &Path, expected: &ContentHash) -> Result<(), NodeError> {
  let actual = match hash_file(tmp) {
    Ok(hash) => hash,
    Err(e) => {
      let _ = fs::remove_file(tmp);
      return Err(e.into());
    }
  };
  if actual != *expected {
    let _ = fs::remove_file(tmp);
    return Err(NodeError::CopyVerification {
      path: target.to_path_buf(),
      expected: expected.0.clone(),
      actual: actual.0,
    });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn artifact(dir: &Path, name: &str, content: &str, destination: &str) -> Artifact {
    let source = dir.join(name);
    fs::write(&source, content).unwrap();
    Artifact {
      name: name.to_string(),
      destination: destination.to_string(),
      source,
    }
  }

  #[test]
  fn corrupted_copy_is_rejected_and_removed() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("dropbear");
    let tmp = temp.path().join("dropbear.rootsmith-staging");
    fs::write(&source, "server").unwrap();
    fs::write(&tmp, "serve").unwrap();
    let expected = hash_file(&source).unwrap();

    let err = verify_copy(&tmp, Path::new("/bin/dropbear"), &expected).unwrap_err();
    match err {
      NodeError::CopyVerification { path, expected: want, actual } => {
        assert_eq!(path, PathBuf::from("/bin/dropbear"));
        assert_eq!(want, expected.0);
        assert_ne!(actual, want);
      }
      other => panic!("expected copy verification failure, got {other:?}"),
    }
    assert!(!tmp.exists());
  }

  #[test]
  fn intact_copy_is_kept() {
    let temp = TempDir::new().unwrap();
    let tmp = temp.path().join("dropbear.rootsmith-staging");
    fs::write(&tmp, "server").unwrap();
    let expected = hash_file(&tmp).unwrap();

    verify_copy(&tmp, Path::new("/bin/dropbear"), &expected).unwrap();
    assert!(tmp.exists());
  }

  #[test]
  fn resolve_destination_strips_root() {
    let root = Path::new("/tmp/root");
    assert_eq!(resolve_destination(root, "/bin/dropbear"), PathBuf::from("/tmp/root/bin/dropbear"));
  }

  #[test]
  fn stage_copies_and_claims() {
    let temp = TempDir::new().unwrap();
    let work = temp.path().join("work");
    let root = temp.path().join("root");
    fs::create_dir_all(&work).unwrap();

    let artifacts = vec![
      artifact(&work, "dropbear", "server", "/bin/dropbear"),
      artifact(&work, "dropbearkey", "keygen", "/bin/dropbearkey"),
    ];
    let mut manifest = StagingManifest::new();

    let staged = Stager::new(&root).stage("dropbear", &artifacts, &mut manifest).unwrap();

    assert_eq!(staged.len(), 2);
    assert_eq!(fs::read_to_string(root.join("bin/dropbear")).unwrap(), "server");
    assert_eq!(manifest.owner("/bin/dropbearkey"), Some("dropbear"));
    assert_eq!(manifest.files_of("dropbear").collect::<Vec<_>>(), vec!["/bin/dropbear", "/bin/dropbearkey"]);
    assert!(!root.join(format!("bin/dropbear{STAGING_TMP_SUFFIX}")).exists());
  }

  #[cfg(unix)]
  #[test]
  fn stage_preserves_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    let art = artifact(temp.path(), "tool", "#!/bin/sh\n", "/usr/bin/tool");
    fs::set_permissions(&art.source, fs::Permissions::from_mode(0o755)).unwrap();

    Stager::new(&root)
      .stage("tool", &[art], &mut StagingManifest::new())
      .unwrap();

    let mode = fs::metadata(root.join("usr/bin/tool")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
  }

  #[test]
  fn collision_copies_nothing() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    let mut manifest = StagingManifest::new();
    manifest.claim("/bin/sh", "busybox").unwrap();

    let artifacts = vec![
      artifact(temp.path(), "a", "a", "/bin/a"),
      artifact(temp.path(), "sh", "sh", "/bin/sh"),
    ];
    let err = Stager::new(&root).stage("dash", &artifacts, &mut manifest).unwrap_err();

    match err {
      NodeError::StagingCollision {
        path,
        claimed_by,
        claimant,
      } => {
        assert_eq!(path, PathBuf::from("/bin/sh"));
        assert_eq!(claimed_by, "busybox");
        assert_eq!(claimant, "dash");
      }
      other => panic!("expected collision, got {other}"),
    }
    assert!(!root.join("bin/a").exists());
    assert_eq!(manifest.len(), 1);
  }

  #[test]
  fn restaging_identical_content_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    let art = artifact(temp.path(), "a", "same", "/bin/a");
    let stager = Stager::new(&root);
    let mut manifest = StagingManifest::new();

    let first = stager.stage("a", std::slice::from_ref(&art), &mut manifest).unwrap();
    let second = stager.stage("a", &[art], &mut manifest).unwrap();

    assert_eq!(first, second);
    assert_eq!(manifest.len(), 1);
  }

  #[test]
  fn failed_copy_rolls_back_earlier_files() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    let good = artifact(temp.path(), "good", "ok", "/bin/good");
    let missing = Artifact {
      name: "missing".to_string(),
      destination: "/bin/missing".to_string(),
      source: temp.path().join("does-not-exist"),
    };
    let mut manifest = StagingManifest::new();

    let result = Stager::new(&root).stage("pkg", &[good, missing], &mut manifest);

    assert!(result.is_err());
    assert!(!root.join("bin/good").exists());
    assert!(manifest.is_empty());
  }

  #[test]
  fn find_collisions_reports_every_claimant() {
    let a = Recipe::new("a", "1").with_file("/bin/sh", "sh").with_file("/bin/a", "a");
    let b = Recipe::new("b", "1").with_file("/bin/sh", "sh");
    let c = Recipe::new("c", "1").with_file("/bin/c", "c");

    let collisions = find_collisions([&a, &b, &c]);
    assert_eq!(collisions.len(), 1);
    assert_eq!(collisions["/bin/sh"], vec!["a", "b"]);
  }

  #[test]
  fn manifest_serializes_in_path_order() {
    let mut manifest = StagingManifest::new();
    manifest.claim("/usr/bin/z", "z").unwrap();
    manifest.claim("/bin/a", "a").unwrap();

    let json = serde_json::to_string(&manifest).unwrap();
    assert_eq!(json, r#"{"/bin/a":"a","/usr/bin/z":"z"}"#);
  }
}
