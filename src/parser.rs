// Copyright 2018-2025 the Deno authors. MIT license.

use monch::ParseError as CombinatorError;
use monch::ParseResult;
use monch::ch;
use monch::many0;
use monch::map;
use monch::preceded;
use monch::separated_list;
use monch::take_while;
use thiserror::Error;

// Grammar:
//   line  := stage ('|' stage)*
//   stage := sep* (word sep*)*
//   sep   := ' ' | '\t' | '\r' | '\n'
// There is no quoting, escaping or nesting.

/// One program invocation within a pipeline.
///
/// The program name is always the first element of the argument vector,
/// which is never empty.
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
#[cfg_attr(feature = "serialization", serde(rename_all = "camelCase"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
  argv: Vec<String>,
}

impl Stage {
  /// Creates a stage from an argument vector, returning `None` when
  /// there is no program name.
  pub fn new(argv: Vec<String>) -> Option<Self> {
    if argv.is_empty() {
      None
    } else {
      Some(Self { argv })
    }
  }

  pub fn program(&self) -> &str {
    &self.argv[0]
  }

  /// Arguments following the program name.
  pub fn args(&self) -> &[String] {
    &self.argv[1..]
  }

  pub fn argv(&self) -> &[String] {
    &self.argv
  }
}

/// Upper bounds applied while tokenizing a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
  pub max_stages: usize,
  /// Maximum length of a stage's argument vector, program name included.
  pub max_args: usize,
}

impl Default for ParseLimits {
  fn default() -> Self {
    Self {
      max_stages: 10,
      max_args: 100,
    }
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
  #[error("too many pipeline stages: {count} (maximum is {max})")]
  TooManyStages { count: usize, max: usize },
  #[error("{program}: too many arguments: {count} (maximum is {max})")]
  TooManyArgs {
    program: String,
    count: usize,
    max: usize,
  },
}

/// Splits a line on the pipe delimiter into raw stage text.
///
/// Segments are returned untrimmed and may be blank.
pub fn split_pipeline(line: &str) -> Vec<&str> {
  match separated_list(parse_stage_text, ch('|'))(line) {
    Ok((_, stages)) => stages,
    // neither combinator fails, but keep the whole line as one stage if
    // that ever changes
    Err(_) => vec![line],
  }
}

/// Splits one stage's text on whitespace.
///
/// Returns `Ok(None)` for a blank stage, which callers treat as
/// nothing to execute.
pub fn parse_stage(
  text: &str,
  max_args: usize,
) -> Result<Option<Stage>, ParseError> {
  let words = match parse_words(text) {
    Ok((_, words)) => words,
    Err(_) => return Ok(None),
  };
  if words.len() > max_args {
    return Err(ParseError::TooManyArgs {
      program: words[0].to_string(),
      count: words.len(),
      max: max_args,
    });
  }
  Ok(Stage::new(words.into_iter().map(|w| w.to_string()).collect()))
}

/// Tokenizes a full line into its non-blank stages.
///
/// Blank stages (ex. `a | | b` or a lone `|`) are dropped so they never
/// take up a channel. An empty result means there is nothing to run.
pub fn parse_line(
  line: &str,
  limits: &ParseLimits,
) -> Result<Vec<Stage>, ParseError> {
  let mut stages = Vec::new();
  for text in split_pipeline(line) {
    if let Some(stage) = parse_stage(text, limits.max_args)? {
      stages.push(stage);
    }
  }
  if stages.len() > limits.max_stages {
    return Err(ParseError::TooManyStages {
      count: stages.len(),
      max: limits.max_stages,
    });
  }
  Ok(stages)
}

fn parse_stage_text(input: &str) -> ParseResult<&str> {
  take_while(|c| c != '|')(input)
}

fn parse_words(input: &str) -> ParseResult<Vec<&str>> {
  many0(preceded(skip_separators, parse_word))(input)
}

fn parse_word(input: &str) -> ParseResult<&str> {
  let (input, word) = take_while(|c| !is_separator(c))(input)?;
  if word.is_empty() {
    CombinatorError::backtrace()
  } else {
    Ok((input, word))
  }
}

fn skip_separators(input: &str) -> ParseResult<()> {
  map(take_while(is_separator), |_| ())(input)
}

fn is_separator(c: char) -> bool {
  matches!(c, ' ' | '\t' | '\r' | '\n')
}

#[cfg(test)]
mod test {
  use super::*;
  use pretty_assertions::assert_eq;

  fn argv(stage: &Stage) -> Vec<&str> {
    stage.argv().iter().map(|s| s.as_str()).collect()
  }

  #[test]
  fn test_split_pipeline() {
    assert_eq!(split_pipeline("echo hi"), vec!["echo hi"]);
    assert_eq!(
      split_pipeline("cat a | grep b|wc -l"),
      vec!["cat a ", " grep b", "wc -l"]
    );
    let parts = split_pipeline("a||b");
    assert_eq!(parts[0], "a");
    assert_eq!(parts[1], "");
  }

  #[test]
  fn test_parse_stage() {
    let stage = parse_stage("  ls\t-la \r\n/tmp\n", 100).unwrap().unwrap();
    assert_eq!(argv(&stage), vec!["ls", "-la", "/tmp"]);
    assert_eq!(stage.program(), "ls");
    assert_eq!(stage.args(), ["-la", "/tmp"]);

    assert_eq!(parse_stage("", 100), Ok(None));
    assert_eq!(parse_stage(" \t\r\n ", 100), Ok(None));

    // quotes are plain characters
    let stage = parse_stage(r#"printf "%s" x"#, 100).unwrap().unwrap();
    assert_eq!(argv(&stage), vec!["printf", "\"%s\"", "x"]);
  }

  #[test]
  fn test_parse_stage_max_args() {
    assert!(parse_stage("a b c", 3).unwrap().is_some());
    assert_eq!(
      parse_stage("a b c d", 3),
      Err(ParseError::TooManyArgs {
        program: "a".to_string(),
        count: 4,
        max: 3,
      })
    );
  }

  #[test]
  fn test_parse_line() {
    let limits = ParseLimits::default();
    let stages = parse_line("echo hello | tr a-z A-Z | cat", &limits).unwrap();
    assert_eq!(stages.len(), 3);
    assert_eq!(argv(&stages[0]), vec!["echo", "hello"]);
    assert_eq!(argv(&stages[1]), vec!["tr", "a-z", "A-Z"]);
    assert_eq!(argv(&stages[2]), vec!["cat"]);

    // blank stages never take a slot
    let stages = parse_line("echo a | | cat |", &limits).unwrap();
    assert_eq!(stages.len(), 2);

    assert_eq!(parse_line("", &limits), Ok(vec![]));
    assert_eq!(parse_line("   \n", &limits), Ok(vec![]));
    assert_eq!(parse_line("|", &limits), Ok(vec![]));
    assert_eq!(parse_line(" | \t |  ", &limits), Ok(vec![]));
  }

  #[test]
  fn test_parse_line_limits() {
    let limits = ParseLimits {
      max_stages: 2,
      max_args: 2,
    };
    assert_eq!(parse_line("a | b", &limits).unwrap().len(), 2);
    assert_eq!(
      parse_line("a | b | c", &limits),
      Err(ParseError::TooManyStages { count: 3, max: 2 })
    );
    assert_eq!(
      parse_line("a | b x y", &limits).err().unwrap().to_string(),
      "b: too many arguments: 3 (maximum is 2)"
    );

    let line = vec!["true"; 11].join(" | ");
    assert_eq!(
      parse_line(&line, &ParseLimits::default())
        .err()
        .unwrap()
        .to_string(),
      "too many pipeline stages: 11 (maximum is 10)"
    );
  }
}
