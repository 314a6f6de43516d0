//! Reply type for command execution results.

use std::time::Duration;

use crate::channel::LineMatch;

/// Reply to one [`send_command`](super::CommandSession::send_command).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    /// The command that was sent (without line ending).
    pub command: String,

    /// The prompt line seen before the command was sent.
    pub prompt: LineMatch,

    /// The line that matched the completion marker.
    pub completion: LineMatch,

    /// Time from the resync sequence to the completion match.
    pub elapsed: Duration,
}

impl CommandReply {
    /// Create a new reply.
    pub fn new(
        command: impl Into<String>,
        prompt: LineMatch,
        completion: LineMatch,
        elapsed: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            prompt,
            completion,
            elapsed,
        }
    }

    /// The completion line text.
    pub fn line(&self) -> &str {
        &self.completion.line
    }

    /// A positional capture group of the completion match.
    pub fn group(&self, index: usize) -> Option<&str> {
        self.completion.group(index)
    }

    /// A named capture group of the completion match.
    pub fn name(&self, name: &str) -> Option<&str> {
        self.completion.name(name)
    }
}

impl std::fmt::Display for CommandReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.completion.line)
    }
}
