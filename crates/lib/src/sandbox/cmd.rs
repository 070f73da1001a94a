//! Running one build step as an isolated shell process.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use rustix::process::{Pid, Signal, kill_process_group};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::NodeError;

/// Exit status and captured output of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
  pub cmd: String,
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
  #[serde(with = "duration_millis")]
  pub duration: Duration,
}

impl StepOutcome {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }

  /// stdout followed by stderr, for diagnostics.
  pub fn output(&self) -> String {
    match (self.stdout.is_empty(), self.stderr.is_empty()) {
      (_, true) => self.stdout.clone(),
      (true, false) => self.stderr.clone(),
      (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
    }
  }
}

mod duration_millis {
  use std::time::Duration;

  use serde::Serializer;

  pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
  }
}

/// Everything needed to spawn one step.
#[derive(Debug)]
pub struct StepCommand<'a> {
  pub shell: &'a str,
  pub cmd: &'a str,
  pub cwd: &'a Path,
  /// The complete environment; nothing is inherited from the orchestrator.
  pub env: &'a [(String, String)],
  pub isolate_network: bool,
  pub timeout: Option<Duration>,
}

/// How long a killed step's pipes are drained before giving up on them.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Run a step to completion and capture its output.
///
/// A non-zero exit is not an error here; the caller decides what it means.
/// Errors are reserved for steps that could not be started or ran out of time.
/// A step that runs out of time keeps whatever it printed before it was killed.
pub async fn run_step(step: &StepCommand<'_>) -> Result<StepOutcome, NodeError> {
  debug!(cmd = %step.cmd, cwd = %step.cwd.display(), "running build step");

  let mut command = Command::new(step.shell);
  command
    .arg("-c")
    .arg(step.cmd)
    .current_dir(step.cwd)
    .env_clear()
    .envs(step.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .process_group(0)
    .kill_on_drop(true);

  if step.isolate_network {
    super::isolate::without_network(&mut command)?;
  }

  let started = Instant::now();
  let mut child = command.spawn().map_err(|e| NodeError::Spawn {
    step: step.cmd.to_string(),
    message: e.to_string(),
  })?;

  let stdout = child.stdout.take().map(drain);
  let stderr = child.stderr.take().map(drain);

  let (status, timed_out) = match step.timeout {
    Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
      Ok(status) => (Some(status?), None),
      Err(_) => {
        kill_step(&mut child).await;
        (None, Some(limit))
      }
    },
    None => (Some(child.wait().await?), None),
  };

  let outcome = StepOutcome {
    cmd: step.cmd.to_string(),
    code: status.and_then(|s| s.code()),
    stdout: collect(stdout).await,
    stderr: collect(stderr).await,
    duration: started.elapsed(),
  };

  if let Some(limit) = timed_out {
    let timeout_ms = limit.as_millis() as u64;
    debug!(cmd = %step.cmd, timeout_ms, "build step timed out");
    return Err(NodeError::StepTimedOut {
      step: step.cmd.to_string(),
      timeout_ms,
      output: outcome.output(),
    });
  }

  if !outcome.success() {
    debug!(cmd = %step.cmd, code = ?outcome.code, stderr = %outcome.stderr, "build step failed");
  }

  Ok(outcome)
}

/// Read a pipe to its end on a separate task.
fn drain<R>(mut pipe: R) -> JoinHandle<Vec<u8>>
where
  R: AsyncRead + Unpin + Send + 'static,
{
  tokio::spawn(async move {
    let mut buf = Vec::new();
    // A read error ends the capture; what was read so far is kept.
    let _ = pipe.read_to_end(&mut buf).await;
    buf
  })
}

async fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
  let Some(mut reader) = reader else {
    return String::new();
  };
  match tokio::time::timeout(DRAIN_GRACE, &mut reader).await {
    Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
    Ok(Err(_)) => String::new(),
    Err(_) => {
      reader.abort();
      String::new()
    }
  }
}

/// Kill the step's whole process group so no descendant keeps its pipes open.
async fn kill_step(child: &mut Child) {
  if let Some(pid) = child.id().and_then(|id| Pid::from_raw(id as i32))
    && let Err(e) = kill_process_group(pid, Signal::KILL)
  {
    debug!(error = %e, "failed to signal step process group");
  }
  let _ = child.start_kill();
  let _ = child.wait().await;
}
