// Copyright 2018-2025 the Deno authors. MIT license.

use std::process::ExitCode;

use anyhow::Context;
use anyhow::Result;
use argh::FromArgs;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use simple_shell::HistoryPolicy;
use simple_shell::InterruptSignal;
use simple_shell::Session;
use simple_shell::ShellConfig;
use simple_shell::ShellPipeReader;
use simple_shell::ShellPipeWriter;
use simple_shell::ShellState;
use simple_shell::parser::ParseLimits;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Interactive shell that runs pipelines of external programs.
#[derive(FromArgs)]
struct Args {
  /// maximum number of stages in one line
  #[argh(option, default = "ParseLimits::default().max_stages")]
  max_stages: usize,
  /// maximum number of words in one stage, program name included
  #[argh(option, default = "ParseLimits::default().max_args")]
  max_args: usize,
  /// maximum number of executed lines kept in the history
  #[argh(option, default = "ShellConfig::default().history_capacity")]
  history_capacity: usize,
  /// drop the oldest history entry instead of refusing new ones
  #[argh(switch)]
  evict_oldest: bool,
  /// prompt shown before each line
  #[argh(option, default = "ShellConfig::default().prompt")]
  prompt: String,
}

impl Args {
  fn into_config(self) -> ShellConfig {
    ShellConfig {
      limits: ParseLimits {
        max_stages: self.max_stages,
        max_args: self.max_args,
      },
      history_capacity: self.history_capacity,
      history_policy: if self.evict_oldest {
        HistoryPolicy::EvictOldest
      } else {
        HistoryPolicy::Reject
      },
      prompt: self.prompt,
    }
  }
}

fn main() -> ExitCode {
  // logs go to stderr so they never mix with pipeline output
  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("simple_shell=warn")),
    )
    .init();

  let args: Args = argh::from_env();
  match run(args.into_config()) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      let _ = ShellPipeWriter::stderr().write_line(&format!("error: {err:#}"));
      ExitCode::FAILURE
    }
  }
}

fn run(config: ShellConfig) -> Result<()> {
  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("failed creating runtime")?;
  let local = tokio::task::LocalSet::new();
  local.block_on(&runtime, read_loop(config))
}

async fn read_loop(config: ShellConfig) -> Result<()> {
  let state =
    ShellState::from_current_process().context("failed reading cwd")?;
  let prompt = config.prompt.clone();
  let mut session = Session::new(state, config);
  let interrupt = InterruptSignal::default();
  interrupt
    .listen()
    .context("failed installing interrupt handler")?;
  let mut editor = DefaultEditor::new().context("failed creating editor")?;

  loop {
    // let the signal listener observe anything delivered during the
    // previous turn
    tokio::task::yield_now().await;
    if interrupt.is_requested() {
      exit_with_history(&session);
    }

    let line = match editor.readline(&prompt) {
      Ok(line) => line,
      Err(ReadlineError::Interrupted) => exit_with_history(&session),
      Err(ReadlineError::Eof) => break,
      Err(err) => return Err(err).context("failed reading line"),
    };
    if let Err(err) = editor.add_history_entry(line.as_str()) {
      tracing::warn!("failed adding editor history entry: {}", err);
    }

    let outcome = session
      .execute_line(
        &line,
        ShellPipeReader::stdin(),
        ShellPipeWriter::stdout(),
        &mut ShellPipeWriter::stderr(),
      )
      .await;
    tracing::debug!(?outcome, "line finished");
  }
  Ok(())
}

/// Prints the detailed history and terminates the shell.
fn exit_with_history(session: &Session) -> ! {
  let report = session.interrupt_report();
  let _ = ShellPipeWriter::stdout().write_all(report.as_bytes());
  std::process::exit(0)
}
