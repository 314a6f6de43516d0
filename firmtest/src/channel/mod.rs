//! Channel layer for line reassembly and pattern matching.
//!
//! This module turns raw device output into lines and matches them
//! against prompt and response patterns.

mod buffer;
mod patterns;

pub use buffer::LineBuffer;
pub use patterns::{LineMatch, MatchResult, compile_pattern, decode_line, strip_ansi};
