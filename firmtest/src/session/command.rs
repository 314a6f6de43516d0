//! Prompt-driven command session.

use std::time::{Duration, Instant};

use log::{debug, trace};
use regex::Regex;

use super::response::CommandReply;
use super::{EchoSink, LogEcho, SessionConfig};
use crate::channel::{LineBuffer, LineMatch, MatchResult, compile_pattern};
use crate::error::Result;
use crate::transport::Transport;

/// Where a session is in the command handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Between commands.
    Idle,
    /// Writing the resync sequence.
    Sending,
    /// Waiting for the prompt that follows the resync.
    AwaitingPrompt,
    /// Writing the command line.
    SendingCommand,
    /// Waiting for the completion marker.
    AwaitingCompletion,
}

/// Request/response protocol on top of a [`Transport`].
///
/// A session owns the line buffer for the transport's inbound stream.
/// Unmatched trailing bytes carry over between calls, so a reply split
/// across reads still matches. A failed call returns the session to
/// [`SessionState::Idle`] with the buffer intact, ready for a retry.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use firmtest::session::{CommandSession, SessionConfig};
///
/// # async fn example(transport: &firmtest::Transport) -> Result<(), firmtest::Error> {
/// let mut session = CommandSession::new(transport, SessionConfig::default())?;
///
/// session.send_command("sensors show sht_temp").await?;
/// let reading = session
///     .wait_for_pattern(r"temperature: (?P<value>[0-9.]+)C", Duration::from_secs(5))
///     .await?;
/// println!("{}", reading.name("value").unwrap_or("?"));
/// # Ok(())
/// # }
/// ```
pub struct CommandSession<'a> {
    transport: &'a Transport,
    config: SessionConfig,
    prompt: Regex,
    buffer: LineBuffer,
    state: SessionState,
    echo: Option<Box<dyn EchoSink + 'a>>,
}

impl<'a> CommandSession<'a> {
    /// Create a session on `transport`.
    ///
    /// Fails if the configured prompt is not a valid pattern.
    pub fn new(transport: &'a Transport, config: SessionConfig) -> Result<Self> {
        let prompt = compile_pattern(&config.prompt)?;
        let echo: Option<Box<dyn EchoSink + 'a>> = if config.echo {
            Some(Box::new(LogEcho))
        } else {
            None
        };

        Ok(Self {
            transport,
            buffer: LineBuffer::new(config.strip_ansi),
            prompt,
            config,
            state: SessionState::Idle,
            echo,
        })
    }

    /// Replace the echo sink.
    pub fn with_echo(mut self, sink: impl EchoSink + 'a) -> Self {
        self.echo = Some(Box::new(sink));
        self
    }

    /// Disable echoing.
    pub fn without_echo(mut self) -> Self {
        self.echo = None;
        self
    }

    /// The underlying transport.
    pub fn transport(&self) -> &'a Transport {
        self.transport
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The compiled prompt pattern.
    pub fn prompt(&self) -> &Regex {
        &self.prompt
    }

    /// Current handshake state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The line buffer (bytes received but not consumed).
    pub fn buffer(&self) -> &LineBuffer {
        &self.buffer
    }

    /// Take every complete buffered line, keeping a trailing fragment.
    pub fn drain_output(&mut self) -> Vec<String> {
        self.buffer.drain_lines()
    }

    /// Wait until a line matches `pattern`, the stream ends, or `timeout`
    /// passes.
    ///
    /// One deadline covers the scan of already-buffered lines and every
    /// receive after it.
    pub async fn wait_for_regex(&mut self, pattern: &Regex, timeout: Duration) -> MatchResult {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + timeout;

        let transport = self.transport;
        let buffer = &mut self.buffer;
        let echo = &mut self.echo;

        let search = async {
            loop {
                if let Some(found) = buffer.take_match(pattern) {
                    return MatchResult::Matched(found);
                }

                let chunk = transport.receive_some().await;
                if chunk.is_empty() {
                    return MatchResult::EndOfStream;
                }
                if let Some(sink) = echo.as_mut() {
                    sink.echo(&chunk);
                }
                buffer.extend(&chunk);
            }
        };

        match tokio::time::timeout_at(deadline, search).await {
            Ok(result) => {
                trace!("wait for {:?}: {:?} after {:?}", pattern.as_str(), result, start.elapsed());
                result
            }
            Err(_) => {
                let elapsed = start.elapsed();
                debug!("pattern {:?} not seen within {:?}", pattern.as_str(), elapsed);
                MatchResult::TimedOut { elapsed }
            }
        }
    }

    /// Like [`wait_for_regex`](Self::wait_for_regex), compiling `pattern` first.
    pub async fn wait_for(&mut self, pattern: &str, timeout: Duration) -> Result<MatchResult> {
        let regex = compile_pattern(pattern)?;
        Ok(self.wait_for_regex(&regex, timeout).await)
    }

    /// Wait for a line matching `pattern`.
    ///
    /// # Errors
    ///
    /// `MatchError::Timeout` if the deadline passes, `MatchError::NoMatch`
    /// if the stream ends first, `MatchError::InvalidPattern` for a bad
    /// pattern.
    pub async fn wait_for_pattern(&mut self, pattern: &str, timeout: Duration) -> Result<LineMatch> {
        self.wait_for(pattern, timeout).await?.into_match(pattern)
    }

    /// Wait for the device prompt using the configured timeout.
    pub async fn wait_for_prompt(&mut self) -> Result<LineMatch> {
        let prompt = self.prompt.clone();
        self.wait_for_regex(&prompt, self.config.timeout)
            .await
            .into_match(prompt.as_str())
    }

    /// Send `command` and wait for the next prompt.
    pub async fn send_command(&mut self, command: &str) -> Result<CommandReply> {
        let prompt = self.prompt.clone();
        self.run_command(command, &prompt).await
    }

    /// Send `command` and wait for a line matching `wait_str`.
    pub async fn send_command_until(&mut self, command: &str, wait_str: &str) -> Result<CommandReply> {
        let completion = compile_pattern(wait_str)?;
        self.run_command(command, &completion).await
    }

    /// Send several commands in order, stopping at the first failure.
    pub async fn send_commands(&mut self, commands: &[&str]) -> Result<Vec<CommandReply>> {
        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            replies.push(self.send_command(command).await?);
        }
        Ok(replies)
    }

    async fn run_command(&mut self, command: &str, completion: &Regex) -> Result<CommandReply> {
        debug!("send_command {:?} (until {:?})", command, completion.as_str());
        let start = Instant::now();

        let result = self.exchange(command, completion).await;
        self.set_state(SessionState::Idle);

        let (prompt, done) = result?;
        Ok(CommandReply::new(command, prompt, done, start.elapsed()))
    }

    /// Resync, wait for the prompt, send the command, wait for completion.
    async fn exchange(&mut self, command: &str, completion: &Regex) -> Result<(LineMatch, LineMatch)> {
        let timeout = self.config.timeout;

        self.set_state(SessionState::Sending);
        self.transport.send(self.config.resync.as_bytes()).await?;

        self.set_state(SessionState::AwaitingPrompt);
        let prompt = self.prompt.clone();
        let prompt_line = self
            .wait_for_regex(&prompt, timeout)
            .await
            .into_match(prompt.as_str())?;

        self.set_state(SessionState::SendingCommand);
        let line = format!("{}{}", command, self.config.line_ending);
        self.transport.send(line.as_bytes()).await?;

        self.set_state(SessionState::AwaitingCompletion);
        let done = self
            .wait_for_regex(completion, timeout)
            .await
            .into_match(completion.as_str())?;

        Ok((prompt_line, done))
    }

    fn set_state(&mut self, next: SessionState) {
        trace!("session {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
