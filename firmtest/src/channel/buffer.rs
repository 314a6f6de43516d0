//! Line buffer with consume-on-match semantics.
//!
//! Device output arrives in arbitrary chunks. The buffer reassembles it into
//! lines and answers "does any line not yet consumed match this pattern".
//! Lines up to and including a match are consumed. When nothing matches,
//! everything but the last line is discarded, so output that belongs to an
//! earlier command can never satisfy a later query.

use bytes::{Buf, BytesMut};
use log::trace;
use regex::Regex;

use super::patterns::{LineMatch, decode_line};

/// Buffer for accumulating device output and matching it line by line.
#[derive(Debug)]
pub struct LineBuffer {
    /// Bytes received but not yet consumed.
    pending: BytesMut,

    /// Remove ANSI escape sequences before matching.
    strip_ansi: bool,
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new(strip_ansi: bool) -> Self {
        Self {
            pending: BytesMut::with_capacity(1024),
            strip_ansi,
        }
    }

    /// Append newly received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Search the buffered lines for the first one matching `pattern`.
    ///
    /// On a match the matched line and every line before it are removed.
    /// Without a match, only the last (possibly incomplete) line is kept
    /// when more than one line was buffered.
    pub fn take_match(&mut self, pattern: &Regex) -> Option<LineMatch> {
        let lines = split_lines(&self.pending);

        for (idx, span) in lines.iter().enumerate() {
            let found = {
                let text = decode_line(&self.pending[span.start..span.end], self.strip_ansi);
                pattern
                    .captures(&text)
                    .map(|caps| LineMatch::from_captures(pattern, &text, &caps))
            };
            if let Some(found) = found {
                trace!("line {} matched {:?}: {:?}", idx, pattern.as_str(), found.line);
                self.pending.advance(span.end);
                return Some(found);
            }
        }

        if lines.len() > 1 {
            let last_start = lines[lines.len() - 1].start;
            trace!(
                "no match for {:?}, discarding {} of {} lines",
                pattern.as_str(),
                lines.len() - 1,
                lines.len()
            );
            self.pending.advance(last_start);
        }

        None
    }

    /// Remove and return every complete line, keeping the trailing fragment.
    pub fn drain_lines(&mut self) -> Vec<String> {
        let lines = split_lines(&self.pending);
        let mut out = Vec::with_capacity(lines.len());
        let mut consumed = 0;

        for span in lines.iter().filter(|s| s.terminated) {
            out.push(decode_line(&self.pending[span.start..span.end], self.strip_ansi).into_owned());
            consumed = span.end;
        }

        self.pending.advance(consumed);
        out
    }

    /// Bytes currently buffered.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Get the buffered bytes as a string (lossy UTF-8 conversion).
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.pending)
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Byte range of one line within the buffer, terminator included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
    terminated: bool,
}

/// Split buffered bytes into lines.
///
/// A line ends at `\n`, at `\r\n`, or at a lone `\r` followed by some other
/// byte. A `\r` at the very end is held back as part of the final fragment
/// because its `\n` may still be in flight.
fn split_lines(data: &[u8]) -> Vec<Span> {
    let mut lines = Vec::new();
    let mut start = 0;

    for pos in memchr::memchr2_iter(b'\r', b'\n', data) {
        let end = if data[pos] == b'\n' {
            pos + 1
        } else {
            match data.get(pos + 1) {
                Some(b'\n') => continue,
                Some(_) => pos + 1,
                None => break,
            }
        };
        lines.push(Span {
            start,
            end,
            terminated: true,
        });
        start = end;
    }

    if start < data.len() {
        lines.push(Span {
            start,
            end: data.len(),
            terminated: false,
        });
    }

    lines
}
