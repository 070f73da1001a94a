//! Cutting build steps off from the network.
//!
//! On Linux the step is started in a fresh user namespace (so no privileges are
//! needed) together with a fresh network namespace, which contains nothing but
//! an unconfigured loopback device. The caller's uid and gid are mapped onto
//! themselves so file ownership in the working directory is unchanged.

use tokio::process::Command;

use crate::error::NodeError;

#[cfg(target_os = "linux")]
pub fn without_network(command: &mut Command) -> Result<(), NodeError> {
  use std::ffi::CStr;
  use std::io;

  // Formatted before fork: only raw syscalls are allowed in the child.
  // SAFETY: getuid/getgid cannot fail and touch no memory.
  let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
  let uid_map = format!("{uid} {uid} 1\n").into_bytes();
  let gid_map = format!("{gid} {gid} 1\n").into_bytes();

  fn write_proc(path: &CStr, data: &[u8]) -> io::Result<()> {
    // SAFETY: path is NUL-terminated, data outlives the call, and the fd is closed on every path.
    unsafe {
      let fd = libc::open(path.as_ptr(), libc::O_WRONLY | libc::O_CLOEXEC);
      if fd < 0 {
        return Err(io::Error::last_os_error());
      }
      let written = libc::write(fd, data.as_ptr().cast(), data.len());
      let err = io::Error::last_os_error();
      libc::close(fd);
      if written < 0 || written as usize != data.len() {
        return Err(err);
      }
    }
    Ok(())
  }

  // SAFETY: the closure runs between fork and exec and only performs
  // async-signal-safe syscalls on memory allocated before the fork.
  unsafe {
    command.pre_exec(move || {
      if libc::unshare(libc::CLONE_NEWUSER | libc::CLONE_NEWNET) != 0 {
        return Err(io::Error::last_os_error());
      }
      write_proc(c"/proc/self/setgroups", b"deny")?;
      write_proc(c"/proc/self/uid_map", &uid_map)?;
      write_proc(c"/proc/self/gid_map", &gid_map)?;
      Ok(())
    });
  }

  Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn without_network(_command: &mut Command) -> Result<(), NodeError> {
  Err(NodeError::Spawn {
    step: String::new(),
    message: "network isolation is only supported on Linux".to_string(),
  })
}
