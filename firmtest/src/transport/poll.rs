//! Bridge from a blocking, poll-only hardware channel to an async stream.
//!
//! Debug-probe real-time transfer channels (RTT and similar) offer only
//! blocking read and write calls and no notification when data arrives.
//! The poll loop below calls `read` on a blocking thread at a fixed interval
//! and forwards whatever it returns into the transport's [`ByteStream`].
//!
//! [`ByteStream`]: super::ByteStream

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace, warn};
use tokio::sync::{mpsc, oneshot, watch};

use super::bridge::StateCell;

/// A blocking, poll-only hardware channel.
///
/// Implementations wrap a vendor API (e.g. a J-Link RTT binding). Every
/// method may block; the transport always calls them off the async
/// scheduler and never calls two of them at once.
pub trait PollChannel: Send + 'static {
    /// Acquire the hardware (open the probe, attach to the target, start RTT).
    fn connect(&mut self) -> io::Result<()>;

    /// Read up to `max_bytes`. An empty result means nothing was available.
    fn read(&mut self, max_bytes: usize) -> io::Result<Vec<u8>>;

    /// Write `data`, returning how many bytes the hardware accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Release the hardware.
    fn disconnect(&mut self) -> io::Result<()>;
}

/// Hardware handle shared between the poll loop and the writer.
pub(crate) type SharedChannel = Arc<Mutex<Box<dyn PollChannel>>>;

pub(crate) fn lock_channel(channel: &SharedChannel) -> MutexGuard<'_, Box<dyn PollChannel>> {
    channel.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run a blocking channel call on the blocking thread pool.
pub(crate) async fn run_blocking<T, F>(channel: &SharedChannel, f: F) -> io::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn PollChannel) -> io::Result<T> + Send + 'static,
{
    let channel = channel.clone();
    tokio::task::spawn_blocking(move || {
        let mut guard = lock_channel(&channel);
        f(&mut **guard)
    })
    .await
    .map_err(io::Error::other)?
}

/// Everything the poll loop needs, moved into its task.
pub(crate) struct PollLoop {
    pub(crate) channel: SharedChannel,
    pub(crate) tx: mpsc::Sender<Bytes>,
    pub(crate) stop: watch::Receiver<bool>,
    pub(crate) ended: oneshot::Sender<()>,
    pub(crate) state: Arc<StateCell>,
    pub(crate) interval: Duration,
    pub(crate) max_read: usize,
}

impl PollLoop {
    /// Poll until asked to stop, the consumer goes away, or a read fails.
    ///
    /// A read in flight is always awaited to completion; the `ended` signal
    /// fires only after the last read returned, so the owner may release the
    /// hardware as soon as it sees it.
    pub(crate) async fn run(self) {
        let PollLoop {
            channel,
            tx,
            mut stop,
            ended,
            state,
            interval,
            max_read,
        } = self;

        debug!("poll loop started");

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                _ = stop.changed() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let data = match run_blocking(&channel, move |ch| ch.read(max_read)).await {
                Ok(data) => data,
                Err(e) => {
                    warn!("poll read failed, closing transport: {}", e);
                    state.fault();
                    break;
                }
            };

            if data.is_empty() {
                continue;
            }

            trace!("poll read {} bytes", data.len());

            // Waiting for queue space is the backpressure; stop must still
            // be observed while blocked here.
            tokio::select! {
                biased;
                _ = stop.changed() => break,
                sent = tx.send(Bytes::from(data)) => {
                    if sent.is_err() {
                        debug!("stream receiver dropped, stopping poll loop");
                        break;
                    }
                }
            }
        }

        drop(tx);
        debug!("poll loop ended");
        let _ = ended.send(());
    }
}
