//! Command/response protocol over a live transport.
//!
//! The session layer provides the main API for talking to a device shell:
//! waiting for a pattern with a deadline, and sending a command between two
//! prompts.

mod command;
mod response;

pub use command::{CommandSession, SessionState};
pub use response::CommandReply;

use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::millis;

/// Configuration for command session behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pattern that matches the device prompt (e.g. `uart:`).
    pub prompt: String,

    /// Deadline for each wait.
    #[serde(with = "millis")]
    pub timeout: Duration,

    /// Sent before every command to flush a stale prompt.
    pub resync: String,

    /// Appended to every command.
    pub line_ending: String,

    /// Echo received output to the log while waiting.
    pub echo: bool,

    /// Remove ANSI escape sequences before matching.
    pub strip_ansi: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            prompt: "uart:".to_string(),
            timeout: Duration::from_secs(20),
            resync: "\r\n\r\n".to_string(),
            line_ending: "\r\n".to_string(),
            echo: true,
            strip_ansi: true,
        }
    }
}

impl SessionConfig {
    /// Set the prompt pattern.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the per-wait deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable echoing received output.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

/// Destination for device output observed while waiting.
///
/// Echoing is for live diagnostics only; it never changes what the session
/// consumes.
pub trait EchoSink: Send {
    /// Called with every received chunk, before it is buffered.
    fn echo(&mut self, data: &[u8]);
}

impl<F> EchoSink for F
where
    F: FnMut(&[u8]) + Send,
{
    fn echo(&mut self, data: &[u8]) {
        self(data)
    }
}

/// Echo device output to the `log` facade under target `firmtest::device`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEcho;

impl EchoSink for LogEcho {
    fn echo(&mut self, data: &[u8]) {
        let text = String::from_utf8_lossy(data).replace('\r', "");
        let text = text.trim_end_matches('\n');
        if !text.is_empty() {
            info!(target: "firmtest::device", "{}", text);
        }
    }
}
