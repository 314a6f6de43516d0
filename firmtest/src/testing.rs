//! Hardware doubles for tests.
//!
//! `FakeProbe` is a scripted poll-only channel that behaves like a small
//! device shell: blank lines produce a prompt, known commands are echoed and
//! answered. Every hardware call is journaled so tests can assert ordering.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::board::Programmer;
use crate::transport::PollChannel;

/// One journaled hardware call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProbeEvent {
    Connect,
    ReadStart,
    ReadEnd,
    Write(Vec<u8>),
    Disconnect,
    Program(PathBuf),
    Reset,
    Erase,
}

#[derive(Default)]
struct ProbeState {
    output: VecDeque<Vec<u8>>,
    events: Vec<ProbeEvent>,
    write_times: Vec<Instant>,
    typed: Vec<u8>,
    prompt: Option<Vec<u8>>,
    replies: HashMap<String, Vec<Vec<u8>>>,
    read_delay: Duration,
    fail_connect: bool,
    fail_reads: bool,
    fail_writes: bool,
    accept_limit: Option<usize>,
    disconnects: usize,
}

/// Scripted poll-only channel. Clones share state.
#[derive(Clone, Default)]
pub(crate) struct FakeProbe {
    inner: Arc<Mutex<ProbeState>>,
}

impl FakeProbe {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A probe whose device answers blank lines with `prompt`.
    pub(crate) fn shell(prompt: &str) -> Self {
        let probe = Self::new();
        probe.set_prompt(prompt);
        probe
    }

    /// Start answering as a shell (a fresh probe stays silent).
    pub(crate) fn set_prompt(&self, prompt: &str) {
        self.lock().prompt = Some(prompt.as_bytes().to_vec());
    }

    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue bytes for a future read. Each push is returned by its own read.
    pub(crate) fn push_output(&self, data: &[u8]) {
        self.lock().output.push_back(data.to_vec());
    }

    /// Answer `command` with `chunks` (each delivered by its own read).
    pub(crate) fn respond(&self, command: &str, chunks: &[&[u8]]) {
        self.lock().replies.insert(
            command.to_string(),
            chunks.iter().map(|c| c.to_vec()).collect(),
        );
    }

    pub(crate) fn set_read_delay(&self, delay: Duration) {
        self.lock().read_delay = delay;
    }

    pub(crate) fn fail_connect(&self) {
        self.lock().fail_connect = true;
    }

    pub(crate) fn fail_reads(&self) {
        self.lock().fail_reads = true;
    }

    pub(crate) fn fail_writes(&self) {
        self.lock().fail_writes = true;
    }

    pub(crate) fn accept_at_most(&self, limit: usize) {
        self.lock().accept_limit = Some(limit);
    }

    pub(crate) fn events(&self) -> Vec<ProbeEvent> {
        self.lock().events.clone()
    }

    /// Payloads of every write, in order.
    pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                ProbeEvent::Write(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn write_times(&self) -> Vec<Instant> {
        self.lock().write_times.clone()
    }

    pub(crate) fn disconnects(&self) -> usize {
        self.lock().disconnects
    }

    pub(crate) fn record(&self, event: ProbeEvent) {
        self.lock().events.push(event);
    }

    /// Feed typed bytes to the simulated shell.
    fn type_bytes(state: &mut ProbeState, data: &[u8]) {
        state.typed.extend_from_slice(data);

        while let Some(pos) = state.typed.windows(2).position(|w| w == b"\r\n") {
            let line: Vec<u8> = state.typed.drain(..pos + 2).collect();
            let command = String::from_utf8_lossy(&line[..pos]).trim().to_string();

            let Some(prompt) = state.prompt.clone() else {
                continue;
            };

            if command.is_empty() {
                let mut out = b"\r\n".to_vec();
                out.extend_from_slice(&prompt);
                state.output.push_back(out);
                continue;
            }

            state.output.push_back(format!("{command}\r\n").into_bytes());
            match state.replies.get(&command).cloned() {
                Some(chunks) => state.output.extend(chunks),
                None => state
                    .output
                    .push_back(format!("{command}: command not found\r\n").into_bytes()),
            }
            state.output.push_back(prompt);
        }
    }
}

impl PollChannel for FakeProbe {
    fn connect(&mut self) -> io::Result<()> {
        let mut state = self.lock();
        if state.fail_connect {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no probe attached"));
        }
        state.events.push(ProbeEvent::Connect);
        Ok(())
    }

    fn read(&mut self, max_bytes: usize) -> io::Result<Vec<u8>> {
        let delay = {
            let mut state = self.lock();
            state.events.push(ProbeEvent::ReadStart);
            state.read_delay
        };

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.lock();
        state.events.push(ProbeEvent::ReadEnd);

        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "probe lost"));
        }

        let mut data = state.output.pop_front().unwrap_or_default();
        if data.len() > max_bytes {
            let rest = data.split_off(max_bytes);
            state.output.push_front(rest);
        }
        Ok(data)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "probe lost"));
        }

        let accepted = state.accept_limit.map_or(data.len(), |l| l.min(data.len()));
        state.events.push(ProbeEvent::Write(data.to_vec()));
        state.write_times.push(Instant::now());
        Self::type_bytes(&mut state, &data[..accepted]);
        Ok(accepted)
    }

    fn disconnect(&mut self) -> io::Result<()> {
        let mut state = self.lock();
        state.events.push(ProbeEvent::Disconnect);
        state.disconnects += 1;
        Ok(())
    }
}

/// Programmer double that journals into a probe's event log.
pub(crate) struct FakeProgrammer {
    probe: FakeProbe,
    fail_program: bool,
}

impl FakeProgrammer {
    pub(crate) fn new(probe: &FakeProbe) -> Self {
        Self {
            probe: probe.clone(),
            fail_program: false,
        }
    }

    pub(crate) fn failing(probe: &FakeProbe) -> Self {
        Self {
            probe: probe.clone(),
            fail_program: true,
        }
    }
}

impl Programmer for FakeProgrammer {
    fn program(&mut self, image: &Path) -> io::Result<()> {
        if self.fail_program {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad image"));
        }
        self.probe.record(ProbeEvent::Program(image.to_path_buf()));
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        self.probe.record(ProbeEvent::Reset);
        Ok(())
    }

    fn erase(&mut self) -> io::Result<()> {
        self.probe.record(ProbeEvent::Erase);
        Ok(())
    }
}

/// Install a test logger once; repeated calls are harmless.
pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
