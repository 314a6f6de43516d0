//! Transport lifecycle: open, chunked writes, streamed reads, ordered close.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::config::{Target, TransportConfig};
use super::poll::{PollChannel, PollLoop, SharedChannel, run_blocking};
use super::stream::ByteStream;
use crate::error::{Result, TransportError};

/// Lifecycle state of a transport. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransportState {
    /// Hardware not acquired yet.
    Unopened,
    /// Hardware acquired, background reader running.
    Open,
    /// Close requested, waiting for the reader to stop.
    Closing,
    /// Hardware released or lost to a fault.
    Closed,
}

/// State shared between a transport and its background task.
#[derive(Debug)]
pub(crate) struct StateCell(Mutex<TransportState>);

impl StateCell {
    pub(crate) fn new(state: TransportState) -> Self {
        Self(Mutex::new(state))
    }

    pub(crate) fn get(&self) -> TransportState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next` unless already past it.
    pub(crate) fn advance(&self, next: TransportState) {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if next > *state {
            trace!("transport state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    /// Record a fatal I/O fault.
    pub(crate) fn fault(&self) {
        self.advance(TransportState::Closed);
    }
}

/// Any async byte channel (serial port, socket, in-memory pipe).
pub trait AsyncIo: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AsyncIo for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

enum Backend {
    Polled(Box<dyn PollChannel>),
    Stream(Box<dyn AsyncIo>),
    #[cfg(feature = "serial")]
    Serial { port: String, baud: u32 },
}

/// An unopened transport: hardware description plus configuration.
///
/// [`open`](Self::open) acquires the hardware and returns a live
/// [`Transport`].
///
/// # Example
///
/// ```rust,no_run
/// use firmtest::transport::{Target, TransportBridge, TransportConfig};
///
/// # async fn example(probe: impl firmtest::transport::PollChannel) -> Result<(), firmtest::Error> {
/// let bridge = TransportBridge::polled(
///     Target::probe(None, "nRF9160_xxAA"),
///     probe,
///     TransportConfig::default(),
/// );
///
/// bridge
///     .with_open(async |transport| {
///         transport.send(b"\r\n").await?;
///         let chunk = transport.receive_some().await;
///         println!("{}", String::from_utf8_lossy(&chunk));
///         Ok(())
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct TransportBridge {
    target: Target,
    config: TransportConfig,
    backend: Backend,
}

impl TransportBridge {
    /// Bridge a blocking, poll-only channel.
    pub fn polled(target: Target, channel: impl PollChannel, config: TransportConfig) -> Self {
        Self {
            target,
            config,
            backend: Backend::Polled(Box::new(channel)),
        }
    }

    /// Bridge an already-open async byte channel.
    pub fn stream(target: Target, io: impl AsyncIo, config: TransportConfig) -> Self {
        Self {
            target,
            config,
            backend: Backend::Stream(Box::new(io)),
        }
    }

    /// Bridge a UART, opened on [`open`](Self::open).
    #[cfg(feature = "serial")]
    pub fn serial(port: impl Into<String>, baud: u32, config: TransportConfig) -> Self {
        let port = port.into();
        Self {
            target: Target::serial(port.clone(), baud),
            config,
            backend: Backend::Serial { port, baud },
        }
    }

    /// The target this bridge connects to.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Always [`TransportState::Unopened`].
    pub fn state(&self) -> TransportState {
        TransportState::Unopened
    }

    /// Acquire the hardware and start the background reader.
    pub async fn open(self) -> Result<Transport> {
        let TransportBridge {
            target,
            config,
            backend,
        } = self;

        debug!("opening transport to {}", target);

        match backend {
            Backend::Polled(channel) => {
                let channel: SharedChannel = Arc::new(Mutex::new(channel));
                run_blocking(&channel, |ch| ch.connect())
                    .await
                    .map_err(|source| TransportError::Connect {
                        target: target.to_string(),
                        source,
                    })?;
                Ok(Transport::start_polled(target, config, channel))
            }
            Backend::Stream(io) => Ok(Transport::start_stream(target, config, io)),
            #[cfg(feature = "serial")]
            Backend::Serial { port, baud } => {
                use tokio_serial::SerialPortBuilderExt;

                let serial = tokio_serial::new(&port, baud)
                    .open_native_async()
                    .map_err(|e| TransportError::Connect {
                        target: target.to_string(),
                        source: io::Error::from(e),
                    })?;
                Ok(Transport::start_stream(target, config, Box::new(serial)))
            }
        }
    }

    /// Open, run `body`, and close on every exit path.
    ///
    /// The transport is closed whether `body` succeeds or fails. If this
    /// future is dropped mid-way the transport's `Drop` performs the same
    /// ordered release in the background.
    pub async fn with_open<R>(
        self,
        body: impl AsyncFnOnce(&Transport) -> Result<R>,
    ) -> Result<R> {
        let transport = self.open().await?;
        let outcome = body(&transport).await;
        let closed = transport.close().await;

        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), Err(close_err)) => {
                warn!("close after failure also failed: {}", close_err);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }
}

enum Writer {
    Polled(SharedChannel),
    Stream(WriteHalf<Box<dyn AsyncIo>>),
    Released,
}

impl Writer {
    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            Writer::Polled(channel) => {
                let data = chunk.to_vec();
                let len = data.len();
                let written = run_blocking(channel, move |ch| ch.write(&data)).await?;
                if written < len {
                    warn!("hardware accepted {} of {} bytes", written, len);
                }
                Ok(())
            }
            Writer::Stream(io) => {
                io.write_all(chunk).await?;
                io.flush().await
            }
            Writer::Released => Err(io::ErrorKind::NotConnected.into()),
        }
    }
}

/// Handles needed to stop the background task and release the hardware.
struct Teardown {
    target: String,
    ended: oneshot::Receiver<()>,
    task: JoinHandle<()>,
    channel: Option<SharedChannel>,
}

impl Teardown {
    /// Wait for the background task to confirm it stopped, then release.
    ///
    /// The hardware is never touched here before `ended` resolved (or its
    /// sender was dropped, which means the task is gone).
    async fn finish(self, writer: Writer) -> io::Result<()> {
        if self.ended.await.is_err() {
            debug!("reader for {} exited without confirming stop", self.target);
        }

        let result = match (self.channel, writer) {
            (Some(channel), _) => run_blocking(&channel, |ch| ch.disconnect()).await,
            (None, Writer::Stream(mut io)) => {
                if let Err(e) = io.shutdown().await {
                    debug!("shutdown of {} failed: {}", self.target, e);
                }
                Ok(())
            }
            (None, _) => Ok(()),
        };

        self.task.abort();
        debug!("transport to {} released", self.target);
        result
    }

    /// Release from a plain thread.
    ///
    /// Does not depend on any runtime: `ended` also resolves when the reader
    /// task is dropped by a runtime shutting down, and the channel lock waits
    /// out a blocking read still in flight.
    fn finish_blocking(self) {
        if self.ended.blocking_recv().is_err() {
            debug!("reader for {} exited without confirming stop", self.target);
        }
        if let Some(channel) = self.channel {
            let mut guard = channel.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = guard.disconnect() {
                warn!("release of {} failed: {}", self.target, e);
            }
        }
        self.task.abort();
        debug!("transport to {} released", self.target);
    }
}

/// A live, exclusively-owned connection to the device channel.
///
/// All methods take `&self`: sends are serialized by an internal write lock
/// and receives by a separate stream lock, so a transport can be shared
/// (e.g. in an `Arc`) and a pending receive never blocks a send.
///
/// Call [`close`](Self::close) when done. Dropping an open transport logs a
/// warning and releases the hardware in the background.
pub struct Transport {
    target: Target,
    config: TransportConfig,
    state: Arc<StateCell>,
    stop: watch::Sender<bool>,
    writer: tokio::sync::Mutex<Writer>,
    stream: tokio::sync::Mutex<ByteStream>,
    teardown: Mutex<Option<Teardown>>,
}

impl Transport {
    fn start_polled(target: Target, config: TransportConfig, channel: SharedChannel) -> Self {
        let (tx, stream) = ByteStream::channel(config.queue_depth);
        let (stop, stop_rx) = watch::channel(false);
        let (ended_tx, ended) = oneshot::channel();
        let state = Arc::new(StateCell::new(TransportState::Open));

        let task = tokio::spawn(
            PollLoop {
                channel: channel.clone(),
                tx,
                stop: stop_rx,
                ended: ended_tx,
                state: state.clone(),
                interval: config.poll_interval,
                max_read: config.max_read,
            }
            .run(),
        );

        let teardown = Teardown {
            target: target.to_string(),
            ended,
            task,
            channel: Some(channel.clone()),
        };

        Self::assemble(target, config, state, stop, Writer::Polled(channel), stream, teardown)
    }

    fn start_stream(target: Target, config: TransportConfig, io: Box<dyn AsyncIo>) -> Self {
        let (tx, stream) = ByteStream::channel(config.queue_depth);
        let (stop, stop_rx) = watch::channel(false);
        let (ended_tx, ended) = oneshot::channel();
        let state = Arc::new(StateCell::new(TransportState::Open));
        let (reader, writer) = tokio::io::split(io);

        let task = tokio::spawn(read_loop(
            reader,
            tx,
            stop_rx,
            ended_tx,
            state.clone(),
            config.max_read,
        ));

        let teardown = Teardown {
            target: target.to_string(),
            ended,
            task,
            channel: None,
        };

        Self::assemble(target, config, state, stop, Writer::Stream(writer), stream, teardown)
    }

    fn assemble(
        target: Target,
        config: TransportConfig,
        state: Arc<StateCell>,
        stop: watch::Sender<bool>,
        writer: Writer,
        stream: ByteStream,
        teardown: Teardown,
    ) -> Self {
        debug!("transport to {} open", target);
        Self {
            target,
            config,
            state,
            stop,
            writer: tokio::sync::Mutex::new(writer),
            stream: tokio::sync::Mutex::new(stream),
            teardown: Mutex::new(Some(teardown)),
        }
    }

    /// The target this transport is connected to.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransportState {
        self.state.get()
    }

    /// Check if the transport is open.
    pub fn is_open(&self) -> bool {
        self.state() == TransportState::Open
    }

    /// Write `data` using the configured chunk size and inter-chunk delay.
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        self.send_chunked(data, self.config.chunk_size, self.config.inter_chunk_delay)
            .await
    }

    /// Write `data` in chunks of at most `chunk_size` bytes, pausing `delay`
    /// between chunks.
    ///
    /// Concurrent sends are serialized; the chunks of one send are never
    /// interleaved with another's. A write fault closes the transport.
    pub async fn send_chunked(&self, data: &[u8], chunk_size: usize, delay: Duration) -> Result<()> {
        let chunk_size = chunk_size.max(1);
        let mut writer = self.writer.lock().await;
        if !self.is_open() {
            return Err(TransportError::Closed.into());
        }

        for (idx, chunk) in data.chunks(chunk_size).enumerate() {
            if idx > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if !self.is_open() {
                return Err(TransportError::Closed.into());
            }

            trace!("write {} bytes to {}", chunk.len(), self.target);
            if let Err(e) = writer.write_chunk(chunk).await {
                warn!("write to {} failed, closing transport: {}", self.target, e);
                self.state.fault();
                self.stop.send_replace(true);
                return Err(TransportError::Io(e).into());
            }
        }

        Ok(())
    }

    /// Wait for the next chunk of inbound data.
    ///
    /// Returns an empty chunk once the stream has ended (closed, or lost to
    /// an I/O fault).
    pub async fn receive_some(&self) -> Bytes {
        self.stream.lock().await.recv().await
    }

    /// Stop the background reader and release the hardware.
    ///
    /// Idempotent. The hardware is released only after the background task
    /// confirmed it stopped, and after any in-flight send gave up the write
    /// lock.
    pub async fn close(&self) -> Result<()> {
        let teardown = self
            .teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(teardown) = teardown else {
            return Ok(());
        };

        debug!("closing transport to {}", self.target);
        self.state.advance(TransportState::Closing);
        self.stop.send_replace(true);

        let writer = std::mem::replace(&mut *self.writer.lock().await, Writer::Released);
        let released = teardown.finish(writer).await;
        self.state.advance(TransportState::Closed);

        if let Ok(mut stream) = self.stream.try_lock() {
            stream.close();
        }

        released.map_err(|e| TransportError::Io(e).into())
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        let teardown = self
            .teardown
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(teardown) = teardown else {
            return;
        };

        warn!(
            "transport to {} dropped without close(), releasing in background",
            self.target
        );
        self.state.advance(TransportState::Closing);
        self.stop.send_replace(true);
        drop(std::mem::replace(self.writer.get_mut(), Writer::Released));

        // A task spawned here would be lost if the runtime is shutting down
        // (e.g. a test unwinding out of `block_on`), so release on a thread.
        let state = self.state.clone();
        let spawned = std::thread::Builder::new()
            .name("firmtest-release".to_string())
            .spawn(move || {
                teardown.finish_blocking();
                state.advance(TransportState::Closed);
            });
        if let Err(e) = spawned {
            warn!("could not start release thread for {}: {}", self.target, e);
        }
    }
}

/// Drain an async reader into the stream until stopped, EOF, or error.
async fn read_loop(
    mut reader: ReadHalf<Box<dyn AsyncIo>>,
    tx: mpsc::Sender<Bytes>,
    mut stop: watch::Receiver<bool>,
    ended: oneshot::Sender<()>,
    state: Arc<StateCell>,
    max_read: usize,
) {
    let mut buf = vec![0u8; max_read.max(1)];

    loop {
        let n = tokio::select! {
            _ = stop.changed() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    debug!("device stream reached EOF");
                    state.fault();
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!("read failed, closing transport: {}", e);
                    state.fault();
                    break;
                }
            },
        };

        trace!("read {} bytes", n);

        tokio::select! {
            biased;
            _ = stop.changed() => break,
            sent = tx.send(Bytes::copy_from_slice(&buf[..n])) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    drop(tx);
    drop(reader);
    let _ = ended.send(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, MatchError};
    use crate::testing::{FakeProbe, ProbeEvent, init_logging};
    use std::time::Instant;

    fn polled(probe: &FakeProbe, config: TransportConfig) -> TransportBridge {
        TransportBridge::polled(Target::probe(None, "nRF9160_xxAA"), probe.clone(), config)
    }

    #[tokio::test]
    async fn test_connect_error() {
        let probe = FakeProbe::new();
        probe.fail_connect();

        let err = polled(&probe, TransportConfig::default())
            .open()
            .await
            .err()
            .expect("open should fail");

        match err {
            Error::Transport(TransportError::Connect { target, .. }) => {
                assert_eq!(target, "probe (nRF9160_xxAA)");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(probe.disconnects(), 0);
    }

    #[tokio::test]
    async fn test_send_is_chunked_with_delay() {
        init_logging();
        let probe = FakeProbe::new();
        let config = TransportConfig::default()
            .with_chunk_size(10)
            .with_inter_chunk_delay(Duration::from_millis(5));
        let transport = polled(&probe, config).open().await.unwrap();

        let payload: Vec<u8> = (0..25u8).collect();
        transport.send(&payload).await.unwrap();

        let writes = probe.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(
            writes.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![10, 10, 5]
        );
        assert_eq!(writes.concat(), payload);

        let times = probe.write_times();
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(5));
        }

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_explicit_chunk_size() {
        let probe = FakeProbe::new();
        let transport = polled(&probe, TransportConfig::default()).open().await.unwrap();

        transport
            .send_chunked(b"sensors show sht_temp\r\n", 4, Duration::ZERO)
            .await
            .unwrap();

        let writes = probe.writes();
        assert_eq!(writes.len(), 6);
        assert!(writes.iter().all(|w| w.len() <= 4));
        assert_eq!(writes.concat(), b"sensors show sht_temp\r\n");

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        let probe = FakeProbe::new();
        let config = TransportConfig::default().with_chunk_size(10);
        let transport = polled(&probe, config).open().await.unwrap();

        let a = vec![b'a'; 30];
        let b = vec![b'b'; 30];
        let (ra, rb) = tokio::join!(transport.send(&a), transport.send(&b));
        ra.unwrap();
        rb.unwrap();

        let writes = probe.writes();
        assert_eq!(writes.len(), 6);
        let first = writes[0][0];
        assert!(writes[..3].iter().all(|w| w.iter().all(|&c| c == first)));
        assert!(writes[3..].iter().all(|w| w.iter().all(|&c| c != first)));

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_short_write_is_not_retried() {
        let probe = FakeProbe::new();
        probe.accept_at_most(4);
        let transport = polled(&probe, TransportConfig::default()).open().await.unwrap();

        transport.send(b"0123456789").await.unwrap();
        assert_eq!(probe.writes().len(), 1);

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_waits_for_in_flight_read() {
        init_logging();
        let probe = FakeProbe::new();
        probe.set_read_delay(Duration::from_millis(50));
        let transport = polled(&probe, TransportConfig::default()).open().await.unwrap();

        // Let the poller get into a blocking read.
        tokio::time::sleep(Duration::from_millis(10)).await;
        transport.close().await.unwrap();

        let events = probe.events();
        let disconnect = events
            .iter()
            .position(|e| *e == ProbeEvent::Disconnect)
            .expect("hardware was not released");
        assert!(events[..disconnect].contains(&ProbeEvent::ReadStart));
        // No read is started once the poller confirmed it stopped.
        assert!(
            !events[disconnect..]
                .iter()
                .any(|e| matches!(e, ProbeEvent::ReadStart | ProbeEvent::ReadEnd))
        );
        assert_eq!(transport.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let probe = FakeProbe::new();
        let transport = polled(&probe, TransportConfig::default()).open().await.unwrap();
        assert!(transport.is_open());

        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert_eq!(probe.disconnects(), 1);

        let err = transport.send(b"x").await.unwrap_err();
        assert!(err.is_closed());
        assert!(transport.send(b"").await.unwrap_err().is_closed());
        assert!(transport.receive_some().await.is_empty());
    }

    #[tokio::test]
    async fn test_read_fault_closes_transport() {
        let probe = FakeProbe::new();
        probe.fail_reads();
        let transport = polled(&probe, TransportConfig::default()).open().await.unwrap();

        // Waiting reader sees end of stream rather than stalling.
        assert!(transport.receive_some().await.is_empty());
        assert_eq!(transport.state(), TransportState::Closed);
        assert!(transport.send(b"x").await.unwrap_err().is_closed());

        // Release is still unconditional.
        transport.close().await.unwrap();
        assert_eq!(probe.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_write_fault_closes_transport() {
        let probe = FakeProbe::new();
        probe.fail_writes();
        let transport = polled(&probe, TransportConfig::default()).open().await.unwrap();

        let err = transport.send(b"hello").await.unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Io(_))));
        assert_eq!(transport.state(), TransportState::Closed);
        assert!(transport.send(b"hello").await.unwrap_err().is_closed());

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_releases_after_poller_stops() {
        let probe = FakeProbe::new();
        probe.set_read_delay(Duration::from_millis(30));
        let transport = polled(&probe, TransportConfig::default()).open().await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        drop(transport);

        let deadline = Instant::now() + Duration::from_secs(2);
        while probe.disconnects() == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(probe.disconnects(), 1);
        assert!(probe.events().contains(&ProbeEvent::Disconnect));
    }

    fn wait_for_release(probe: &FakeProbe) -> usize {
        let deadline = Instant::now() + Duration::from_secs(2);
        while probe.disconnects() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        probe.disconnects()
    }

    #[test]
    fn test_drop_releases_after_runtime_shutdown() {
        let probe = FakeProbe::new();
        probe.set_read_delay(Duration::from_millis(20));
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let transport = polled(&probe, TransportConfig::default()).open().await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            drop(transport);
        });
        drop(runtime);

        assert_eq!(wait_for_release(&probe), 1);
    }

    #[test]
    fn test_panic_in_scope_still_releases() {
        let probe = FakeProbe::new();
        let bridge = polled(&probe, TransportConfig::default());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let result: Result<()> = runtime.block_on(bridge.with_open(async |transport| {
                transport.send(b"\r\n").await?;
                panic!("assertion failed inside transport scope");
            }));
            result
        }));
        assert!(outcome.is_err());
        drop(runtime);

        assert_eq!(wait_for_release(&probe), 1);
        assert_eq!(probe.writes(), [b"\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_with_open_closes_on_error() {
        let probe = FakeProbe::new();

        let result: Result<()> = polled(&probe, TransportConfig::default())
            .with_open(async |transport| {
                transport.send(b"\r\n").await?;
                Err(MatchError::NoMatch {
                    pattern: "uart:".into(),
                }
                .into())
            })
            .await;

        assert!(result.unwrap_err().is_no_match());
        assert_eq!(probe.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_stream_backend_with_scripted_io() {
        let io = tokio_test::io::Builder::new()
            .write(b"hello\r\n")
            .read(b"world\r\n")
            .build();
        let transport = TransportBridge::stream(Target::named("mock"), io, TransportConfig::default())
            .open()
            .await
            .unwrap();

        transport.send(b"hello\r\n").await.unwrap();
        assert_eq!(transport.receive_some().await, "world\r\n");

        // Script exhausted: the device went away.
        assert!(transport.receive_some().await.is_empty());
        assert_eq!(transport.state(), TransportState::Closed);

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_backend_chunks_writes() {
        let (device, host) = tokio::io::duplex(64);
        let config = TransportConfig::default().with_chunk_size(5);
        let transport = TransportBridge::stream(Target::named("pipe"), host, config)
            .open()
            .await
            .unwrap();

        transport.send(b"abcdefghijkl").await.unwrap();

        let (mut device_rx, mut device_tx) = tokio::io::split(device);
        let mut received = vec![0u8; 12];
        device_rx.read_exact(&mut received).await.unwrap();
        assert_eq!(received, b"abcdefghijkl");

        device_tx.write_all(b"uart:~$ ").await.unwrap();
        assert_eq!(transport.receive_some().await, "uart:~$ ");

        transport.close().await.unwrap();
        assert_eq!(transport.state(), TransportState::Closed);
    }
}
