//! Interpreter process startup with a single combined output stream.

use std::{
    io,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use os_pipe::PipeReader;
use tokio::process::{Child, Command};

use super::ExecutionError;

/// Owns a running interpreter process and asks it to stop when released.
///
/// On unix the interpreter leads its own process group, and the kill request
/// goes to the whole group so shells forked to run the script stop with it.
#[derive(Debug)]
pub struct ChildGuard {
    child: Child,
    group: Option<u32>,
}

impl ChildGuard {
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Sends a kill request to the process and anything left in its group.
    /// Safe to call repeatedly.
    pub fn terminate(&mut self) {
        if let Some(group) = self.group.take() {
            kill_group(group);
        }
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            Ok(None) => match self.child.start_kill() {
                Ok(()) => tracing::debug!(pid = ?self.child.id(), "kill requested"),
                Err(e) => tracing::warn!(error = %e, "unable to kill script process"),
            },
            Err(e) => tracing::warn!(error = %e, "unable to query script process state"),
        }
    }
}

#[cfg(unix)]
fn kill_group(group: u32) {
    let Ok(pgid) = libc::pid_t::try_from(group) else {
        return;
    };
    // SAFETY: killpg only reads its two integer arguments.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc == 0 {
        tracing::debug!(pgid, "process group killed");
        return;
    }
    let err = io::Error::last_os_error();
    // ESRCH: every process in the group is already gone.
    if err.raw_os_error() != Some(libc::ESRCH) {
        tracing::warn!(pgid, error = %err, "unable to kill script process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_group: u32) {}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Starts `interpreter flag <script>` with stderr merged into stdout.
///
/// The child's stdin is closed right after spawning, and the parent keeps no
/// write end of the output pipe, so the returned reader sees end-of-stream once
/// every process holding the pipe has exited.
pub fn launch(
    interpreter: &str,
    flag: &str,
    script: &Path,
) -> Result<(ChildGuard, PipeReader), ExecutionError> {
    let script = script_argument(script).map_err(ExecutionError::Launch)?;
    let (reader, writer) = os_pipe::pipe().map_err(ExecutionError::Launch)?;
    let stderr = writer.try_clone().map_err(ExecutionError::Launch)?;

    let mut cmd = Command::new(interpreter);
    cmd.arg(flag)
        .arg(&script)
        .stdin(Stdio::piped())
        .stdout(writer)
        .stderr(stderr)
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let spawned = cmd.spawn();
    // The command still holds both write ends; release them before reading.
    drop(cmd);
    let mut child = spawned.map_err(ExecutionError::Launch)?;
    drop(child.stdin.take());

    // With process_group(0) the group id is the child's pid.
    let group = if cfg!(unix) { child.id() } else { None };
    tracing::debug!(pid = ?child.id(), script = %script.display(), "interpreter started");
    Ok((ChildGuard { child, group }, reader))
}

#[cfg(windows)]
fn script_argument(path: &Path) -> io::Result<PathBuf> {
    // canonicalize() yields a verbatim `\\?\` path, which cmd.exe rejects.
    std::path::absolute(path)
}

#[cfg(not(windows))]
fn script_argument(path: &Path) -> io::Result<PathBuf> {
    path.canonicalize()
}
