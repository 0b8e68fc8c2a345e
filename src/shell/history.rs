// Copyright 2018-2025 the Deno authors. MIT license.

use std::collections::VecDeque;
use std::fmt::Write;
use std::time::Duration;

use chrono::DateTime;
use chrono::Local;
use thiserror::Error;

/// Summary of one submitted line's execution.
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
#[cfg_attr(feature = "serialization", serde(rename_all = "camelCase"))]
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
  command: String,
  pid: Option<u32>,
  start_time: DateTime<Local>,
  duration: Duration,
}

impl ExecutionRecord {
  pub fn new(
    command: impl Into<String>,
    pid: Option<u32>,
    start_time: DateTime<Local>,
    duration: Duration,
  ) -> Self {
    Self {
      command: command.into(),
      pid,
      start_time,
      duration,
    }
  }

  /// The full original input line.
  pub fn command(&self) -> &str {
    &self.command
  }

  /// Process id of the first stage, if it was spawned.
  pub fn pid(&self) -> Option<u32> {
    self.pid
  }

  pub fn start_time(&self) -> DateTime<Local> {
    self.start_time
  }

  pub fn duration_secs(&self) -> f64 {
    self.duration.as_secs_f64()
  }
}

/// What happens when a record is appended to a full log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryPolicy {
  /// Keep the earliest entries and reject the new one.
  #[default]
  Reject,
  /// Drop the oldest entry to make room.
  EvictOldest,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("history limit of {capacity} entries exceeded")]
pub struct HistoryFullError {
  pub capacity: usize,
}

/// Bounded, append-only log of execution records.
#[derive(Debug, Clone)]
pub struct HistoryLog {
  entries: VecDeque<ExecutionRecord>,
  capacity: usize,
  policy: HistoryPolicy,
}

impl HistoryLog {
  pub fn new(capacity: usize, policy: HistoryPolicy) -> Self {
    Self {
      entries: VecDeque::new(),
      capacity,
      policy,
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&ExecutionRecord> {
    self.entries.get(index)
  }

  pub fn iter(&self) -> impl Iterator<Item = &ExecutionRecord> {
    self.entries.iter()
  }

  pub fn append(
    &mut self,
    record: ExecutionRecord,
  ) -> Result<(), HistoryFullError> {
    if self.entries.len() >= self.capacity {
      if self.policy == HistoryPolicy::Reject || self.capacity == 0 {
        return Err(HistoryFullError {
          capacity: self.capacity,
        });
      }
      self.entries.pop_front();
    }
    self.entries.push_back(record);
    Ok(())
  }

  /// One line per entry holding the original input text.
  pub fn compact_view(&self) -> String {
    let mut text = String::new();
    for record in &self.entries {
      text.push_str(record.command());
      text.push('\n');
    }
    text
  }

  /// One line per entry with its 1-based index, process id, start time
  /// and duration.
  pub fn verbose_view(&self) -> String {
    let mut text = String::new();
    for (index, record) in self.entries.iter().enumerate() {
      let pid = match record.pid() {
        Some(pid) => pid.to_string(),
        None => "-".to_string(),
      };
      // infallible when writing to a String
      let _ = writeln!(
        text,
        "{}: {} (PID: {}, Start Time: {}, Duration: {:.2} seconds)",
        index + 1,
        record.command(),
        pid,
        record.start_time().format("%a %b %e %H:%M:%S %Y"),
        record.duration_secs(),
      );
    }
    text
  }
}
