// Copyright 2018-2025 the Deno authors. MIT license.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

use pretty_assertions::assert_eq;

use crate::parser::ParseLimits;
use crate::shell::execute::StageExit;
use crate::shell::history::HistoryLog;
use crate::shell::history::HistoryPolicy;
use crate::shell::session::LineOutcome;
use crate::shell::session::Session;
use crate::shell::session::ShellConfig;
use crate::shell::types::ShellState;
use crate::shell::types::get_output_writer_and_handle;
use crate::shell::types::pipe;

struct TempDir {
  // hold to keep it alive until drop
  _inner: tempfile::TempDir,
  cwd: PathBuf,
}

impl TempDir {
  pub fn new() -> Self {
    let temp_dir = tempfile::tempdir().unwrap();
    let cwd = temp_dir.path().canonicalize().unwrap();
    Self {
      _inner: temp_dir,
      cwd,
    }
  }
}

/// Runs lines through a fresh `Session` and checks what came out.
///
/// Output, exit code and stage expectations apply to the whole run and
/// to the last line respectively.
pub struct TestBuilder {
  // it is much much faster to lazily create this
  temp_dir: Option<TempDir>,
  env_vars: HashMap<OsString, OsString>,
  config: ShellConfig,
  lines: Vec<String>,
  stdin: Vec<u8>,
  expected_exit_code: Option<i32>,
  expected_stderr: String,
  expected_stdout: String,
  stdout_check: Option<Box<dyn Fn(&str)>>,
  expected_stages: Option<Vec<StageExit>>,
  expected_channels: Option<usize>,
  expected_history_len: Option<usize>,
  expect_rejected: bool,
  history_check: Option<Box<dyn Fn(&HistoryLog)>>,
}

impl TestBuilder {
  pub fn new() -> Self {
    Self {
      temp_dir: None,
      env_vars: std::env::vars_os().collect(),
      config: ShellConfig::default(),
      lines: Default::default(),
      stdin: Default::default(),
      expected_exit_code: None,
      expected_stderr: Default::default(),
      expected_stdout: Default::default(),
      stdout_check: None,
      expected_stages: None,
      expected_channels: None,
      expected_history_len: None,
      expect_rejected: false,
      history_check: None,
    }
  }

  fn get_temp_dir(&mut self) -> &mut TempDir {
    if self.temp_dir.is_none() {
      self.temp_dir = Some(TempDir::new());
    }
    self.temp_dir.as_mut().unwrap()
  }

  /// Adds a line to run. Lines run in order, one turn each.
  pub fn command(&mut self, line: &str) -> &mut Self {
    self.lines.push(line.to_string());
    self
  }

  /// Data available on stdin for the first line.
  pub fn stdin(&mut self, stdin: &str) -> &mut Self {
    self.stdin = stdin.as_bytes().to_vec();
    self
  }

  pub fn env_var(&mut self, name: &str, value: &str) -> &mut Self {
    self.env_vars.insert(name.into(), value.into());
    self
  }

  pub fn limits(&mut self, max_stages: usize, max_args: usize) -> &mut Self {
    self.config.limits = ParseLimits {
      max_stages,
      max_args,
    };
    self
  }

  pub fn history_capacity(
    &mut self,
    capacity: usize,
    policy: HistoryPolicy,
  ) -> &mut Self {
    self.config.history_capacity = capacity;
    self.config.history_policy = policy;
    self
  }

  #[cfg(unix)]
  pub fn executable(&mut self, path: &str, text: &str, mode: u32) -> &mut Self {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = self.get_temp_dir();
    let path = temp_dir.cwd.join(path);
    fs::write(&path, text).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
    self
  }

  pub fn assert_exit_code(&mut self, code: i32) -> &mut Self {
    self.expected_exit_code = Some(code);
    self
  }

  pub fn assert_stderr(&mut self, output: &str) -> &mut Self {
    self.expected_stderr.push_str(output);
    self
  }

  pub fn assert_stdout(&mut self, output: &str) -> &mut Self {
    self.expected_stdout.push_str(output);
    self
  }

  /// Checks stdout with `check` instead of comparing it exactly.
  pub fn assert_stdout_with(
    &mut self,
    check: impl Fn(&str) + 'static,
  ) -> &mut Self {
    self.stdout_check = Some(Box::new(check));
    self
  }

  pub fn assert_stages(&mut self, stages: &[StageExit]) -> &mut Self {
    self.expected_stages = Some(stages.to_vec());
    self
  }

  pub fn assert_channels(&mut self, count: usize) -> &mut Self {
    self.expected_channels = Some(count);
    self
  }

  pub fn assert_history_len(&mut self, len: usize) -> &mut Self {
    self.expected_history_len = Some(len);
    self
  }

  /// Expects the last line to be rejected before spawning anything.
  pub fn assert_rejected(&mut self) -> &mut Self {
    self.expect_rejected = true;
    self
  }

  pub fn assert_history(
    &mut self,
    check: impl Fn(&HistoryLog) + 'static,
  ) -> &mut Self {
    self.history_check = Some(Box::new(check));
    self
  }

  pub async fn run(&mut self) {
    let cwd = if let Some(temp_dir) = &self.temp_dir {
      temp_dir.cwd.clone()
    } else {
      std::env::temp_dir().canonicalize().unwrap()
    };
    let state = ShellState::new(self.env_vars.clone(), cwd);
    let mut session = Session::new(state, self.config.clone());
    let (stdout, stdout_handle) = get_output_writer_and_handle().unwrap();
    let (mut stderr, stderr_handle) = get_output_writer_and_handle().unwrap();

    let description = self.lines.join(" ;; ");
    let mut last_outcome = None;
    for (index, line) in self.lines.iter().enumerate() {
      let (stdin, mut stdin_writer) = pipe().unwrap();
      if index == 0 {
        stdin_writer.write_all(&self.stdin).unwrap();
      }
      drop(stdin_writer); // prevent a deadlock by dropping the writer
      let outcome = session
        .execute_line(line, stdin, stdout.try_clone().unwrap(), &mut stderr)
        .await;
      last_outcome = Some(outcome);
    }
    drop(stdout);
    drop(stderr);

    assert_eq!(
      stderr_handle.await.unwrap(),
      self.expected_stderr,
      "\n\nFailed for: {}",
      description
    );
    let stdout = stdout_handle.await.unwrap();
    match &self.stdout_check {
      Some(check) => check(&stdout),
      None => assert_eq!(
        stdout, self.expected_stdout,
        "\n\nFailed for: {}",
        description
      ),
    }

    match last_outcome {
      Some(LineOutcome::Executed { outcome, .. }) => {
        assert!(
          !self.expect_rejected,
          "\n\nFailed for: {}\nExpected the line to be rejected.",
          description
        );
        if let Some(code) = self.expected_exit_code {
          assert_eq!(outcome.exit_code(), code, "\n\nFailed for: {}", description);
        }
        if let Some(stages) = &self.expected_stages {
          assert_eq!(&outcome.stages, stages, "\n\nFailed for: {}", description);
        }
        if let Some(channels) = self.expected_channels {
          assert_eq!(outcome.channels, channels, "\n\nFailed for: {}", description);
        }
      }
      Some(LineOutcome::Rejected(err)) => {
        assert!(
          self.expect_rejected,
          "\n\nFailed for: {}\nUnexpected rejection: {}",
          description,
          err
        );
      }
      Some(LineOutcome::Empty) | Some(LineOutcome::History) | None => {
        assert!(
          !self.expect_rejected && self.expected_stages.is_none(),
          "\n\nFailed for: {}\nNothing was executed.",
          description
        );
      }
    }

    if let Some(len) = self.expected_history_len {
      assert_eq!(
        session.history().len(),
        len,
        "\n\nFailed for: {}",
        description
      );
    }
    if let Some(check) = &self.history_check {
      check(session.history());
    }
  }
}
