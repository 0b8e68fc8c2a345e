// Copyright 2018-2025 the Deno authors. MIT license.

use crate::parser::ParseLimits;
use crate::parser::parse_line;
use crate::shell::execute::ExecuteError;
use crate::shell::execute::PipelineOutcome;
use crate::shell::execute::run_stages;
use crate::shell::history::HistoryFullError;
use crate::shell::history::HistoryLog;
use crate::shell::history::HistoryPolicy;
use crate::shell::types::ShellPipeReader;
use crate::shell::types::ShellPipeWriter;
use crate::shell::types::ShellState;

#[derive(Debug, Clone)]
pub struct ShellConfig {
  pub limits: ParseLimits,
  pub history_capacity: usize,
  pub history_policy: HistoryPolicy,
  pub prompt: String,
}

impl Default for ShellConfig {
  fn default() -> Self {
    Self {
      limits: ParseLimits::default(),
      history_capacity: 100,
      history_policy: HistoryPolicy::Reject,
      prompt: "SimpleShell$ ".to_string(),
    }
  }
}

#[derive(Debug)]
pub enum LineOutcome {
  /// Nothing to execute.
  Empty,
  /// A history view was written.
  History,
  /// The line was rejected before any process was created.
  Rejected(ExecuteError),
  Executed {
    outcome: PipelineOutcome,
    /// Set when the record could not be added to the history.
    history_error: Option<HistoryFullError>,
  },
}

/// Interpreter state that lives across turns.
pub struct Session {
  state: ShellState,
  config: ShellConfig,
  history: HistoryLog,
}

impl Session {
  pub fn new(state: ShellState, config: ShellConfig) -> Self {
    let history =
      HistoryLog::new(config.history_capacity, config.history_policy);
    Self {
      state,
      config,
      history,
    }
  }

  pub fn state(&self) -> &ShellState {
    &self.state
  }

  pub fn config(&self) -> &ShellConfig {
    &self.config
  }

  pub fn history(&self) -> &HistoryLog {
    &self.history
  }

  /// Text written when the shell is interrupted: a blank line followed
  /// by the detailed history.
  pub fn interrupt_report(&self) -> String {
    format!("\n{}", self.history.verbose_view())
  }

  /// Executes one line of input.
  ///
  /// Errors are reported on `stderr`. Only a line that ran programs is
  /// recorded in the history.
  pub async fn execute_line(
    &mut self,
    line: &str,
    stdin: ShellPipeReader,
    mut stdout: ShellPipeWriter,
    stderr: &mut ShellPipeWriter,
  ) -> LineOutcome {
    let text = line.trim_end_matches(['\r', '\n']);
    let stages = match parse_line(text, &self.config.limits) {
      Ok(stages) => stages,
      Err(err) => {
        let err = ExecuteError::from(err);
        let _ = stderr.write_line(&err.to_string());
        return LineOutcome::Rejected(err);
      }
    };
    if stages.is_empty() {
      return LineOutcome::Empty;
    }

    if stages.len() == 1 && stages[0].program() == "history" {
      let view = match stages[0].args() {
        [] => Some(self.history.compact_view()),
        [flag] if flag == "-v" => Some(self.history.verbose_view()),
        _ => None,
      };
      match view {
        Some(view) => {
          let _ = stdout.write_all(view.as_bytes());
        }
        None => {
          let _ = stderr.write_line("history: usage: history [-v]");
        }
      }
      return LineOutcome::History;
    }

    let outcome =
      match run_stages(text, stages, &self.state, stdin, stdout, stderr).await
      {
        Ok(Some(outcome)) => outcome,
        Ok(None) => return LineOutcome::Empty,
        Err(err) => {
          let _ = stderr.write_line(&err.to_string());
          return LineOutcome::Rejected(err);
        }
      };

    let history_error = match self.history.append(outcome.record.clone()) {
      Ok(()) => None,
      Err(err) => {
        tracing::warn!("{}", err);
        let _ = stderr.write_line(&format!("ERROR: {err}"));
        Some(err)
      }
    };
    LineOutcome::Executed {
      outcome,
      history_error,
    }
  }
}
