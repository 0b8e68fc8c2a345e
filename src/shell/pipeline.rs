// Copyright 2018-2025 the Deno authors. MIT license.

use thiserror::Error;

use crate::parser::Stage;
use crate::shell::types::ShellPipeReader;
use crate::shell::types::ShellPipeWriter;
use crate::shell::types::pipe;

/// Connects the output of one stage to the input of the next.
///
/// Both endpoints are closed when dropped.
#[derive(Debug)]
pub struct Channel {
  reader: ShellPipeReader,
  writer: ShellPipeWriter,
}

/// The endpoints a single stage is spawned with.
#[derive(Debug)]
pub struct StageIo {
  pub stdin: ShellPipeReader,
  pub stdout: ShellPipeWriter,
}

/// Stages plus the channels between them.
///
/// Holds exactly one channel fewer than it has stages.
#[derive(Debug)]
pub struct Pipeline {
  stages: Vec<Stage>,
  channels: Vec<Channel>,
}

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("failed creating channel {} of {count}", .index + 1)]
  ResourceExhausted {
    index: usize,
    count: usize,
    #[source]
    source: std::io::Error,
  },
}

impl Pipeline {
  pub fn stages(&self) -> &[Stage] {
    &self.stages
  }

  pub fn channel_count(&self) -> usize {
    self.channels.len()
  }

  /// Hands every stage the endpoints it should be spawned with.
  ///
  /// Stage `i` reads from channel `i - 1` and writes to channel `i`. The
  /// first stage reads from `stdin` and the last writes to `stdout`. Each
  /// endpoint ends up owned by exactly one stage, so dropping a stage's
  /// `StageIo` after spawning leaves the caller holding no endpoints.
  pub fn into_stage_io(
    self,
    stdin: ShellPipeReader,
    stdout: ShellPipeWriter,
  ) -> Vec<(Stage, StageIo)> {
    let mut stdin = Some(stdin);
    let mut stdout = Some(stdout);
    let mut channels = self.channels.into_iter();
    let mut result = Vec::with_capacity(self.stages.len());
    for stage in self.stages {
      let Some(stage_stdin) = stdin.take() else {
        break;
      };
      let stage_stdout = match channels.next() {
        Some(channel) => {
          stdin = Some(channel.reader);
          channel.writer
        }
        None => match stdout.take() {
          Some(stdout) => stdout,
          None => break,
        },
      };
      result.push((
        stage,
        StageIo {
          stdin: stage_stdin,
          stdout: stage_stdout,
        },
      ));
    }
    result
  }
}

/// Allocates the channels for `stages` before anything is spawned.
pub fn build(stages: Vec<Stage>) -> Result<Pipeline, BuildError> {
  build_with(stages, pipe)
}

/// Same as [`build`], creating each channel with `create_channel`.
///
/// When a channel cannot be created the ones already created are closed
/// before the error is returned.
pub fn build_with(
  stages: Vec<Stage>,
  mut create_channel: impl FnMut()
    -> std::io::Result<(ShellPipeReader, ShellPipeWriter)>,
) -> Result<Pipeline, BuildError> {
  let count = stages.len().saturating_sub(1);
  let mut channels = Vec::with_capacity(count);
  for index in 0..count {
    match create_channel() {
      Ok((reader, writer)) => channels.push(Channel { reader, writer }),
      Err(source) => {
        tracing::debug!(index, count, "channel allocation failed: {}", source);
        // `channels` is dropped here, closing every endpoint created so far
        return Err(BuildError::ResourceExhausted {
          index,
          count,
          source,
        });
      }
    }
  }
  tracing::debug!(stages = stages.len(), channels = count, "built pipeline");
  Ok(Pipeline { stages, channels })
}
