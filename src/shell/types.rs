// Copyright 2018-2025 the Deno authors. MIT license.

use std::borrow::Cow;
use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::ffi::OsString;
use std::io::Read;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Result;
use tokio::task::JoinHandle;

#[derive(Clone, Debug)]
pub struct ShellState {
  /// Environment variables passed down to spawned programs and used
  /// for program lookup.
  env_vars: HashMap<OsString, OsString>,
  cwd: PathBuf,
}

impl ShellState {
  pub fn new(env_vars: HashMap<OsString, OsString>, cwd: PathBuf) -> Self {
    assert!(cwd.is_absolute());
    let mut result = Self {
      env_vars: Default::default(),
      cwd,
    };
    // ensure the data is normalized
    for (name, value) in env_vars {
      result.apply_env_var(&name, &value);
    }
    result
  }

  /// Snapshots the environment and working directory of this process.
  pub fn from_current_process() -> std::io::Result<Self> {
    let cwd = std::env::current_dir()?;
    Ok(Self::new(std::env::vars_os().collect(), cwd))
  }

  pub fn cwd(&self) -> &PathBuf {
    &self.cwd
  }

  pub fn env_vars(&self) -> &HashMap<OsString, OsString> {
    &self.env_vars
  }

  pub fn get_var(&self, name: &OsStr) -> Option<&OsString> {
    let name = if cfg!(windows) {
      Cow::Owned(name.to_ascii_uppercase())
    } else {
      Cow::Borrowed(name)
    };
    let name: &OsStr = &name;
    self.env_vars.get(name)
  }

  pub fn apply_env_var(&mut self, name: &OsStr, value: &OsStr) {
    let name = if cfg!(windows) {
      // environment variables are case insensitive on windows
      name.to_ascii_uppercase()
    } else {
      name.to_os_string()
    };
    self.env_vars.insert(name, value.to_os_string());
  }

  /// Resolves the path to a program from the current working directory.
  pub fn resolve_command_path(
    &self,
    command_name: &OsStr,
  ) -> Result<PathBuf, super::which::CommandPathResolutionError> {
    super::which::resolve_command_path(command_name, self.cwd(), self)
  }
}

/// Reader side of a pipe.
///
/// Dropping the value closes the underlying descriptor.
#[derive(Debug)]
pub enum ShellPipeReader {
  OsPipe(os_pipe::PipeReader),
  /// The standard input inherited by this process.
  Stdin,
}

impl ShellPipeReader {
  pub fn stdin() -> ShellPipeReader {
    ShellPipeReader::Stdin
  }

  pub fn from_raw(reader: os_pipe::PipeReader) -> Self {
    Self::OsPipe(reader)
  }

  pub fn into_stdio(self) -> std::process::Stdio {
    match self {
      Self::OsPipe(pipe) => pipe.into(),
      Self::Stdin => std::process::Stdio::inherit(),
    }
  }

  /// Pipe everything to the specified writer
  pub fn pipe_to(mut self, writer: &mut dyn Write) -> Result<()> {
    loop {
      let mut buffer = [0; 4096];
      let size = match &mut self {
        ShellPipeReader::OsPipe(pipe) => pipe.read(&mut buffer)?,
        ShellPipeReader::Stdin => std::io::stdin().read(&mut buffer)?,
      };
      if size == 0 {
        break;
      }
      writer.write_all(&buffer[0..size])?;
    }
    Ok(())
  }

  /// Pipes the reader to a string handle that is resolved when every
  /// copy of the pipe's writer is closed.
  pub fn pipe_to_string_handle(self) -> JoinHandle<String> {
    tokio::task::spawn_blocking(|| {
      let mut buf = Vec::new();
      if let Err(err) = self.pipe_to(&mut buf) {
        tracing::warn!("failed reading pipe: {:#}", err);
      }
      String::from_utf8_lossy(&buf).to_string()
    })
  }
}

/// Writer side of a pipe.
///
/// Ensure that all of these are dropped when complete in order to
/// prevent deadlocks where the reader hangs waiting for a read.
#[derive(Debug)]
pub enum ShellPipeWriter {
  OsPipe(os_pipe::PipeWriter),
  // For stdout and stderr we go through Rust std's wrappers rather than
  // duplicating the raw descriptors. Spawned programs inherit them.
  Stdout,
  Stderr,
}

impl ShellPipeWriter {
  pub fn stdout() -> Self {
    Self::Stdout
  }

  pub fn stderr() -> Self {
    Self::Stderr
  }

  pub fn try_clone(&self) -> std::io::Result<Self> {
    Ok(match self {
      Self::OsPipe(pipe) => Self::OsPipe(pipe.try_clone()?),
      Self::Stdout => Self::Stdout,
      Self::Stderr => Self::Stderr,
    })
  }

  pub fn into_stdio(self) -> std::process::Stdio {
    match self {
      Self::OsPipe(pipe) => pipe.into(),
      Self::Stdout => std::process::Stdio::inherit(),
      Self::Stderr => std::process::Stdio::inherit(),
    }
  }

  pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
    match self {
      Self::OsPipe(pipe) => pipe.write_all(bytes)?,
      // flush right away so output interleaves correctly with the
      // output of spawned programs sharing the same descriptor
      Self::Stdout => {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(bytes)?;
        stdout.flush()?;
      }
      Self::Stderr => {
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(bytes)?;
        stderr.flush()?;
      }
    }
    Ok(())
  }

  pub fn write_line(&mut self, line: &str) -> Result<()> {
    let bytes = format!("{line}\n");
    self.write_all(bytes.as_bytes())
  }
}

/// Used to communicate between stages.
pub fn pipe() -> std::io::Result<(ShellPipeReader, ShellPipeWriter)> {
  let (reader, writer) = os_pipe::pipe()?;
  Ok((
    ShellPipeReader::OsPipe(reader),
    ShellPipeWriter::OsPipe(writer),
  ))
}

/// Creates a writer whose output is collected into a string once every
/// copy of the writer has been dropped.
pub fn get_output_writer_and_handle()
-> std::io::Result<(ShellPipeWriter, JoinHandle<String>)> {
  let (reader, writer) = pipe()?;
  let handle = reader.pipe_to_string_handle();
  Ok((writer, handle))
}

/// Out-of-band interrupt notification.
///
/// The signal listener only sets a flag. The read loop checks it between
/// turns, so an interrupt never runs inside the engine's state.
#[derive(Debug, Clone, Default)]
pub struct InterruptSignal(Rc<Cell<bool>>);

impl InterruptSignal {
  pub fn send(&self) {
    self.0.set(true);
  }

  pub fn is_requested(&self) -> bool {
    self.0.get()
  }

  /// Replaces the default SIGINT disposition with a listener that
  /// raises this flag.
  ///
  /// Must be called from within a `LocalSet`.
  pub fn listen(&self) -> std::io::Result<()> {
    #[cfg(unix)]
    {
      use tokio::signal::unix::SignalKind;
      // registration happens here rather than on first poll, so the
      // process is protected as soon as this returns
      let mut stream = tokio::signal::unix::signal(SignalKind::interrupt())?;
      let signal = self.clone();
      tokio::task::spawn_local(async move {
        while stream.recv().await.is_some() {
          tracing::debug!("interrupt received");
          signal.send();
        }
      });
    }
    #[cfg(not(unix))]
    {
      let signal = self.clone();
      tokio::task::spawn_local(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
          tracing::debug!("interrupt received");
          signal.send();
        }
      });
    }
    Ok(())
  }
}
