// Copyright 2018-2025 the Deno authors. MIT license.

use std::ffi::OsStr;
use std::process::ExitStatus;
use std::time::Instant;

use chrono::Local;
use thiserror::Error;

use crate::parser::ParseError;
use crate::parser::Stage;
use crate::shell::history::ExecutionRecord;
use crate::shell::pipeline::BuildError;
use crate::shell::pipeline::Pipeline;
use crate::shell::pipeline::StageIo;
use crate::shell::pipeline::build;
use crate::shell::types::ShellPipeReader;
use crate::shell::types::ShellPipeWriter;
use crate::shell::types::ShellState;
use crate::shell::which::CommandPathResolutionError;

/// Errors that abort a line, or the rest of a line, before or while
/// processes are being created.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error(transparent)]
  Parse(#[from] ParseError),
  #[error("{context}: {source}")]
  ResourceExhausted {
    context: String,
    #[source]
    source: std::io::Error,
  },
}

impl ExecuteError {
  pub fn exit_code(&self) -> i32 {
    match self {
      ExecuteError::Parse(_) => 2,
      ExecuteError::ResourceExhausted { .. } => 1,
    }
  }
}

impl From<BuildError> for ExecuteError {
  fn from(err: BuildError) -> Self {
    match err {
      BuildError::ResourceExhausted { index, count, source } => {
        ExecuteError::ResourceExhausted {
          context: format!("failed creating channel {} of {count}", index + 1),
          source,
        }
      }
    }
  }
}

/// How a single stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageExit {
  Exited(i32),
  /// Terminated by the given signal number.
  Signaled(i32),
  /// The program could not be located.
  NotFound,
  /// The program was found but could not be executed.
  NotExecutable,
  /// Never spawned because an earlier stage failed to spawn.
  NotSpawned,
}

impl StageExit {
  pub fn code(&self) -> i32 {
    match self {
      StageExit::Exited(code) => *code,
      StageExit::Signaled(signal) => 128 + signal,
      StageExit::NotFound => 127,
      StageExit::NotExecutable => 126,
      StageExit::NotSpawned => 1,
    }
  }

  /// Whether a process existed for the stage.
  pub fn was_spawned(&self) -> bool {
    matches!(self, StageExit::Exited(_) | StageExit::Signaled(_))
  }
}

impl From<ExitStatus> for StageExit {
  fn from(status: ExitStatus) -> Self {
    if let Some(code) = status.code() {
      return StageExit::Exited(code);
    }
    #[cfg(unix)]
    {
      use std::os::unix::process::ExitStatusExt;
      if let Some(signal) = status.signal() {
        return StageExit::Signaled(signal);
      }
    }
    StageExit::Exited(1)
  }
}

impl From<&CommandPathResolutionError> for StageExit {
  fn from(err: &CommandPathResolutionError) -> Self {
    match err {
      CommandPathResolutionError::NotExecutable(_) => StageExit::NotExecutable,
      CommandPathResolutionError::CommandNotFound(_)
      | CommandPathResolutionError::FailedCanonicalizing(_)
      | CommandPathResolutionError::CommandEmpty => StageExit::NotFound,
    }
  }
}

/// Result of supervising one line.
#[derive(Debug)]
pub struct PipelineOutcome {
  pub record: ExecutionRecord,
  /// Exit of every stage, in stage order.
  pub stages: Vec<StageExit>,
  /// Number of channels that were allocated.
  pub channels: usize,
  /// Set when spawning stopped part way through the line.
  pub error: Option<ExecuteError>,
}

impl PipelineOutcome {
  /// Exit code of the last stage.
  pub fn exit_code(&self) -> i32 {
    self.stages.last().map(|s| s.code()).unwrap_or(0)
  }
}

/// Tokenized stages to execution: builds the channels when there is more
/// than one stage and supervises the processes.
///
/// Returns `Ok(None)` when there are no stages, and an error without
/// spawning anything when the channels cannot be allocated.
pub async fn run_stages(
  text: &str,
  mut stages: Vec<Stage>,
  state: &ShellState,
  stdin: ShellPipeReader,
  stdout: ShellPipeWriter,
  stderr: &mut ShellPipeWriter,
) -> Result<Option<PipelineOutcome>, ExecuteError> {
  match stages.len() {
    0 => Ok(None),
    1 => {
      let stage = stages.remove(0);
      let outcome =
        run_single(text, stage, state, stdin, stdout, stderr).await;
      Ok(Some(outcome))
    }
    _ => {
      let pipeline = build(stages)?;
      Ok(Some(run(text, pipeline, state, stdin, stdout, stderr).await))
    }
  }
}

/// Spawns every stage of a built pipeline and waits for all of them.
pub async fn run(
  text: &str,
  pipeline: Pipeline,
  state: &ShellState,
  stdin: ShellPipeReader,
  stdout: ShellPipeWriter,
  stderr: &mut ShellPipeWriter,
) -> PipelineOutcome {
  let channels = pipeline.channel_count();
  let wiring = pipeline.into_stage_io(stdin, stdout);
  supervise(text, wiring, channels, state, stderr).await
}

/// Runs a lone stage without allocating any channel.
pub async fn run_single(
  text: &str,
  stage: Stage,
  state: &ShellState,
  stdin: ShellPipeReader,
  stdout: ShellPipeWriter,
  stderr: &mut ShellPipeWriter,
) -> PipelineOutcome {
  let wiring = vec![(stage, StageIo { stdin, stdout })];
  supervise(text, wiring, 0, state, stderr).await
}

enum SpawnResult {
  Spawned(tokio::process::Child),
  /// The stage ends without a process.
  Skipped(StageExit),
}

async fn supervise(
  text: &str,
  wiring: Vec<(Stage, StageIo)>,
  channels: usize,
  state: &ShellState,
  stderr: &mut ShellPipeWriter,
) -> PipelineOutcome {
  supervise_with(text, wiring, channels, stderr, |_, stage, io, stderr| {
    spawn_stage(stage, io, state, stderr)
  })
  .await
}

/// Same as `supervise`, starting each stage with `spawn`.
///
/// An error from `spawn` stops spawning. The stages already running are
/// still waited on and the outcome carries the error.
async fn supervise_with(
  text: &str,
  wiring: Vec<(Stage, StageIo)>,
  channels: usize,
  stderr: &mut ShellPipeWriter,
  mut spawn: impl FnMut(
    usize,
    &Stage,
    StageIo,
    &mut ShellPipeWriter,
  ) -> Result<SpawnResult, ExecuteError>,
) -> PipelineOutcome {
  let mut stages = vec![StageExit::NotSpawned; wiring.len()];
  let mut children = Vec::with_capacity(wiring.len());
  let mut pid = None;
  let mut error = None;

  let start_time = Local::now();
  let started = Instant::now();
  let mut wiring = wiring.into_iter().enumerate();
  for (index, (stage, io)) in wiring.by_ref() {
    match spawn(index, &stage, io, stderr) {
      Ok(SpawnResult::Spawned(child)) => {
        if index == 0 {
          pid = child.id();
        }
        tracing::debug!(index, program = stage.program(), pid = ?child.id(), "spawned stage");
        children.push((index, child));
      }
      Ok(SpawnResult::Skipped(exit)) => {
        stages[index] = exit;
      }
      Err(err) => {
        tracing::warn!(index, "stopped spawning: {}", err);
        let _ = stderr.write_line(&err.to_string());
        error = Some(err);
        break;
      }
    }
  }
  // close the endpoints of stages that were never spawned so the
  // stages already running see EOF or a broken pipe
  drop(wiring);

  let waits = children.into_iter().map(|(index, mut child)| async move {
    (index, child.wait().await)
  });
  for (index, result) in futures::future::join_all(waits).await {
    stages[index] = match result {
      Ok(status) => StageExit::from(status),
      Err(err) => {
        tracing::warn!(index, "failed waiting on stage: {}", err);
        StageExit::Exited(1)
      }
    };
    if let StageExit::Signaled(signal) = stages[index] {
      tracing::debug!(index, signal = %signal_name(signal), "stage terminated by signal");
    }
  }
  let duration = started.elapsed();

  PipelineOutcome {
    record: ExecutionRecord::new(text, pid, start_time, duration),
    stages,
    channels,
    error,
  }
}

fn spawn_stage(
  stage: &Stage,
  io: StageIo,
  state: &ShellState,
  stderr: &mut ShellPipeWriter,
) -> Result<SpawnResult, ExecuteError> {
  let command_path =
    match state.resolve_command_path(OsStr::new(stage.program())) {
      Ok(command_path) => command_path,
      Err(err) => {
        let _ = stderr.write_line(&err.to_string());
        // `io` is dropped on return, closing this stage's endpoints
        return Ok(SpawnResult::Skipped(StageExit::from(&err)));
      }
    };
  let child_stderr =
    stderr
      .try_clone()
      .map_err(|source| ExecuteError::ResourceExhausted {
        context: format!("{}: failed duplicating stderr", stage.program()),
        source,
      })?;

  let mut sub_command = tokio::process::Command::new(&command_path);
  #[cfg(unix)]
  sub_command.arg0(stage.program());
  sub_command
    .current_dir(state.cwd())
    .args(stage.args())
    .env_clear()
    .envs(state.env_vars())
    .stdin(io.stdin.into_stdio())
    .stdout(io.stdout.into_stdio())
    .stderr(child_stderr.into_stdio());
  // Endpoints are created close-on-exec, so the child only keeps the
  // ones just installed as its stdio.
  let child = sub_command.spawn();
  // avoid deadlock since this is holding onto the pipes
  drop(sub_command);

  match child {
    Ok(child) => Ok(SpawnResult::Spawned(child)),
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
      let err =
        CommandPathResolutionError::CommandNotFound(stage.program().into());
      let _ = stderr.write_line(&err.to_string());
      Ok(SpawnResult::Skipped(StageExit::from(&err)))
    }
    Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
      let err =
        CommandPathResolutionError::NotExecutable(stage.program().into());
      let _ = stderr.write_line(&err.to_string());
      Ok(SpawnResult::Skipped(StageExit::from(&err)))
    }
    Err(source) => Err(ExecuteError::ResourceExhausted {
      context: format!("{}: failed launching process", stage.program()),
      source,
    }),
  }
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
  match nix::sys::signal::Signal::try_from(signal) {
    Ok(signal) => signal.as_str().to_string(),
    Err(_) => signal.to_string(),
  }
}

#[cfg(not(unix))]
fn signal_name(signal: i32) -> String {
  signal.to_string()
}
