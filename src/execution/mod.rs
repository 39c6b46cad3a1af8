//! Execution engine: runs one script through an external interpreter.
//!
//! A run goes through materialize, launch, drain and wait, in that order. Cleanup
//! (kill request, script deletion) always happens afterwards, whatever failed.

use std::{
    fmt, io,
    path::{Path, PathBuf},
    process::ExitStatus,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::Instrument;

pub mod drain;
pub mod launch;
pub mod materialize;

use drain::drain;
use launch::{launch, ChildGuard};
use materialize::materialize;

/// A script to run: `interpreter flag <script file>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub interpreter: String,
    pub parameter: String,
    pub script: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    #[serde(rename = "result")]
    pub output: String,
    #[serde(rename = "exitStatus")]
    pub exit_status: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("cannot make script executable")]
    NotExecutable(#[source] io::Error),
    #[error("unable to create script")]
    Materialize(#[source] io::Error),
    #[error("unable to execute script")]
    Launch(#[source] io::Error),
    #[error("unable to retrieve script output")]
    Output(#[source] io::Error),
    #[error("unable to retrieve script exit status")]
    ExitStatus(#[source] io::Error),
    #[error("script timed out after {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStage {
    Idle,
    Materializing,
    Launching,
    Draining,
    AwaitingExit,
    CleaningUp,
    Done,
    Failed,
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStage::Idle => "idle",
            ExecutionStage::Materializing => "materializing",
            ExecutionStage::Launching => "launching",
            ExecutionStage::Draining => "draining",
            ExecutionStage::AwaitingExit => "awaiting-exit",
            ExecutionStage::CleaningUp => "cleaning-up",
            ExecutionStage::Done => "done",
            ExecutionStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct StageTracker(ExecutionStage);

impl StageTracker {
    fn enter(&mut self, next: ExecutionStage) {
        tracing::debug!(from = %self.0, to = %next, "stage");
        self.0 = next;
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutorSettings {
    /// Where scripts are written. Defaults to the OS temp dir.
    pub temp_dir: Option<PathBuf>,
    /// Upper bound for draining plus waiting. `None` waits forever.
    pub timeout: Option<Duration>,
}

/// Runs scripts. Executions share nothing but the id counter used for log spans.
#[derive(Debug, Default)]
pub struct ScriptExecutor {
    settings: ExecutorSettings,
    next_id: AtomicU64,
}

impl ScriptExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self {
            settings,
            next_id: AtomicU64::new(1),
        }
    }

    fn temp_dir(&self) -> PathBuf {
        self.settings
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Runs `request` to completion.
    ///
    /// A non-zero exit is a normal result. Errors are returned only when the
    /// script could not be written, started, read or waited for, and only after
    /// the process was asked to stop and the script file was removed. Dropping
    /// the returned future performs the same cleanup.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, ExecutionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let span = tracing::info_span!(
            "script_execution",
            id,
            interpreter = %request.interpreter
        );
        self.execute_inner(request).instrument(span).await
    }

    async fn execute_inner(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, ExecutionError> {
        let mut stage = StageTracker(ExecutionStage::Idle);

        stage.enter(ExecutionStage::Materializing);
        let materialized = materialize(&request.script, &request.interpreter, &self.temp_dir());
        let mut script = match materialized {
            Ok(script) => script,
            Err(e) => {
                stage.enter(ExecutionStage::Failed);
                tracing::error!(error = %e, "script materialization failed");
                return Err(e);
            }
        };

        let mut child = None;
        let outcome = self
            .run_script(request, script.path(), &mut child, &mut stage)
            .await;

        stage.enter(ExecutionStage::CleaningUp);
        if let Some(mut child) = child.take() {
            child.terminate();
        }
        if let Err(e) = script.remove() {
            tracing::error!(
                path = %script.path().display(),
                error = %e,
                "script has not been cleaned after execution"
            );
        }

        match &outcome {
            Ok(result) => {
                stage.enter(ExecutionStage::Done);
                tracing::info!(exit_status = result.exit_status, "script finished");
            }
            Err(e) => {
                stage.enter(ExecutionStage::Failed);
                tracing::error!(error = %e, "script execution failed");
            }
        }
        outcome
    }

    async fn run_script(
        &self,
        request: &ExecutionRequest,
        script: &Path,
        slot: &mut Option<ChildGuard>,
        stage: &mut StageTracker,
    ) -> Result<ExecutionResult, ExecutionError> {
        stage.enter(ExecutionStage::Launching);
        let (child, reader) = launch(&request.interpreter, &request.parameter, script)?;
        let child = slot.insert(child);

        let collect = async move {
            stage.enter(ExecutionStage::Draining);
            // A plain thread rather than the blocking pool: if the run is abandoned,
            // a grandchild still holding the pipe must not stall runtime shutdown.
            let (tx, rx) = oneshot::channel();
            std::thread::Builder::new()
                .name("script-output".into())
                .spawn(move || {
                    let _ = tx.send(drain(io::BufReader::new(reader)));
                })
                .map_err(ExecutionError::Output)?;
            let output = rx
                .await
                .map_err(|e| ExecutionError::Output(io::Error::other(e)))?
                .map_err(ExecutionError::Output)?;

            stage.enter(ExecutionStage::AwaitingExit);
            let status = child.wait().await.map_err(ExecutionError::ExitStatus)?;
            Ok::<_, ExecutionError>(ExecutionResult {
                output,
                exit_status: exit_code(status),
            })
        };

        match self.settings.timeout {
            Some(limit) => tokio::time::timeout(limit, collect)
                .await
                .map_err(|_| ExecutionError::TimedOut(limit))?,
            None => collect.await,
        }
    }
}

/// Raw exit code; a signal death maps to `128 + signal` like a POSIX shell reports it.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
