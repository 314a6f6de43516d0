//! Pattern matching utilities for prompt and response detection.

use std::borrow::Cow;
use std::time::Duration;

use indexmap::IndexMap;
use log::debug;
use regex::{Captures, Regex};
use vte::{Parser, Perform};

use crate::error::{MatchError, Result};

/// A single line that matched a pattern, with its capture groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    /// The decoded line (terminator and escape sequences removed).
    pub line: String,

    /// The text of the whole match.
    pub matched: String,

    /// Positional capture groups (group 1 onwards). `None` for groups
    /// that did not participate in the match.
    pub groups: Vec<Option<String>>,

    /// Named capture groups that participated in the match.
    pub named: IndexMap<String, String>,
}

impl LineMatch {
    pub(crate) fn from_captures(pattern: &Regex, line: &str, caps: &Captures<'_>) -> Self {
        let matched = caps
            .get(0)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let groups = caps
            .iter()
            .skip(1)
            .map(|g| g.map(|m| m.as_str().to_string()))
            .collect();

        let named = pattern
            .capture_names()
            .flatten()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();

        Self {
            line: line.to_string(),
            matched,
            groups,
            named,
        }
    }

    /// Get a positional capture group (1-based, like regex group numbers).
    pub fn group(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.groups.get(i))
            .and_then(|g| g.as_deref())
    }

    /// Get a named capture group.
    pub fn name(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }
}

/// Outcome of waiting for a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// A line matched.
    Matched(LineMatch),

    /// The stream closed before any line matched.
    EndOfStream,

    /// The deadline passed while the device was still (possibly) talking.
    TimedOut { elapsed: Duration },
}

impl MatchResult {
    /// Whether a line matched.
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched(_))
    }

    /// Convert into the matched line, or the error describing why there is none.
    pub fn into_match(self, pattern: &str) -> Result<LineMatch> {
        match self {
            MatchResult::Matched(m) => Ok(m),
            MatchResult::EndOfStream => Err(MatchError::NoMatch {
                pattern: pattern.to_string(),
            }
            .into()),
            MatchResult::TimedOut { elapsed } => Err(MatchError::Timeout {
                pattern: pattern.to_string(),
                elapsed,
            }
            .into()),
        }
    }
}

/// Compile a line pattern.
///
/// Patterns are searched (not anchored) within each decoded line, so a
/// literal prompt token such as `uart:` matches a full `uart:~$ ` line.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| MatchError::InvalidPattern(e).into())
}

/// Decode one raw line for matching.
///
/// Carriage returns and newlines are removed. Invalid UTF-8 is replaced
/// with U+FFFD rather than failing.
pub fn decode_line(raw: &[u8], strip_escapes: bool) -> Cow<'_, str> {
    let needs_trim = memchr::memchr2(b'\r', b'\n', raw).is_some();
    let trimmed: Cow<'_, [u8]> = if needs_trim {
        Cow::Owned(
            raw.iter()
                .copied()
                .filter(|b| *b != b'\r' && *b != b'\n')
                .collect(),
        )
    } else {
        Cow::Borrowed(raw)
    };

    if std::str::from_utf8(&trimmed).is_err() {
        debug!("substituting invalid UTF-8 in {} byte line", trimmed.len());
    }

    if strip_escapes && memchr::memchr(0x1b, &trimmed).is_some() {
        return Cow::Owned(strip_ansi(&trimmed));
    }

    match trimmed {
        Cow::Borrowed(bytes) => String::from_utf8_lossy(bytes),
        Cow::Owned(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// Strip ANSI escape sequences, keeping printable text and tabs.
pub fn strip_ansi(data: &[u8]) -> String {
    let mut printer = Printer(String::with_capacity(data.len()));
    let mut parser = Parser::new();
    parser.advance(&mut printer, data);
    printer.0
}

struct Printer(String);

impl Perform for Printer {
    fn print(&mut self, c: char) {
        self.0.push(c);
    }

    fn execute(&mut self, byte: u8) {
        if byte == b'\t' {
            self.0.push('\t');
        }
    }
}
