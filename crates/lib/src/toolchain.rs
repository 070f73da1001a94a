//! The pinned cross toolchain and its fingerprint.
//!
//! A [`Toolchain`] describes everything about the compiler environment that can
//! change build outputs. Its [`ToolchainFingerprint`] namespaces the build cache,
//! so changing any field (including the probed compiler identity) invalidates
//! every cached build.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::util::hash::{HashError, hash_bytes};

#[derive(Debug, Error)]
pub enum ToolchainError {
  #[error("failed to run compiler '{compiler}': {message}")]
  Spawn { compiler: String, message: String },

  #[error("compiler '{compiler}' --version exited with code {code:?}: {stderr}")]
  ProbeFailed {
    compiler: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("failed to fingerprint toolchain: {0}")]
  Fingerprint(#[from] HashError),
}

/// Compiler, linker, sysroot and global flags shared by every build in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toolchain {
  pub cc: String,
  pub cxx: String,
  pub ld: String,
  pub ar: String,
  /// Directory holding the toolchain binaries; placed on the sandbox `PATH`.
  pub bin_dir: Option<PathBuf>,
  pub sysroot: Option<PathBuf>,
  pub sysroot_version: String,
  /// Target triple.
  pub target: String,
  pub cflags: String,
  pub ldflags: String,
  /// Extra variables exported to every build step.
  pub env: BTreeMap<String, String>,
  /// First line of `<cc> --version`, filled in by [`Toolchain::probe`].
  #[serde(skip_deserializing)]
  pub compiler_id: Option<String>,
}

impl Default for Toolchain {
  fn default() -> Self {
    Self {
      cc: "cc".to_string(),
      cxx: "c++".to_string(),
      ld: "ld".to_string(),
      ar: "ar".to_string(),
      bin_dir: None,
      sysroot: None,
      sysroot_version: String::new(),
      target: format!("{}-linux-musl", std::env::consts::ARCH),
      cflags: "-Os".to_string(),
      ldflags: "-static".to_string(),
      env: BTreeMap::new(),
      compiler_id: None,
    }
  }
}

/// SHA-256 over the serialized toolchain description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolchainFingerprint(pub String);

impl ToolchainFingerprint {
  /// Abbreviated form for log output.
  pub fn short(&self) -> &str {
    &self.0[..self.0.len().min(12)]
  }
}

impl std::fmt::Display for ToolchainFingerprint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl Toolchain {
  /// Path used to invoke the C compiler.
  pub fn compiler_path(&self) -> PathBuf {
    match &self.bin_dir {
      Some(dir) if !self.cc.contains('/') => dir.join(&self.cc),
      _ => PathBuf::from(&self.cc),
    }
  }

  /// Record the compiler identity from `<cc> --version`.
  pub async fn probe(&mut self) -> Result<&str, ToolchainError> {
    let compiler = self.compiler_path();
    debug!(compiler = %compiler.display(), "probing compiler");

    let output = Command::new(&compiler)
      .arg("--version")
      .output()
      .await
      .map_err(|e| ToolchainError::Spawn {
        compiler: compiler.display().to_string(),
        message: e.to_string(),
      })?;

    if !output.status.success() {
      return Err(ToolchainError::ProbeFailed {
        compiler: compiler.display().to_string(),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let identity = stdout.lines().next().unwrap_or_default().trim().to_string();
    debug!(identity = %identity, "compiler identified");

    Ok(self.compiler_id.insert(identity).as_str())
  }

  pub fn fingerprint(&self) -> Result<ToolchainFingerprint, ToolchainError> {
    let serialized = serde_json::to_vec(self)?;
    Ok(ToolchainFingerprint(hash_bytes(&serialized).0))
  }

  /// Variables the sandbox exports for this toolchain, in a stable order.
  pub fn env_vars(&self) -> Vec<(String, String)> {
    let mut vars = vec![
      ("CC".to_string(), self.cc.clone()),
      ("CXX".to_string(), self.cxx.clone()),
      ("LD".to_string(), self.ld.clone()),
      ("AR".to_string(), self.ar.clone()),
      ("CFLAGS".to_string(), self.cflags.clone()),
      ("LDFLAGS".to_string(), self.ldflags.clone()),
      ("TARGET".to_string(), self.target.clone()),
    ];
    if let Some(sysroot) = &self.sysroot {
      vars.push(("SYSROOT".to_string(), sysroot.display().to_string()));
    }
    vars.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    vars
  }

  pub fn bin_dir(&self) -> Option<&Path> {
    self.bin_dir.as_deref()
  }
}
