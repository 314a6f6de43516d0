//! Bounded, ordered chunk stream between a transport's reader and its consumer.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;
use tokio::sync::mpsc;

/// Receiving end of a transport's inbound data.
///
/// Chunks arrive in hardware read order. An empty chunk from
/// [`recv`](Self::recv) means the stream has ended; once ended it stays
/// ended.
#[derive(Debug)]
pub struct ByteStream {
    rx: mpsc::Receiver<Bytes>,
    closed: bool,
}

impl ByteStream {
    /// Create a stream holding at most `depth` undelivered chunks.
    pub(crate) fn channel(depth: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (tx, Self { rx, closed: false })
    }

    /// Wait for the next chunk. Returns an empty chunk at end of stream.
    pub async fn recv(&mut self) -> Bytes {
        if self.closed {
            return Bytes::new();
        }
        match self.rx.recv().await {
            Some(chunk) => chunk,
            None => {
                self.closed = true;
                Bytes::new()
            }
        }
    }

    /// Stop accepting chunks. Anything still queued is discarded.
    pub fn close(&mut self) {
        if !self.closed {
            self.rx.close();
            self.closed = true;
        }
    }

    /// Whether end of stream has been observed or the stream was closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Stream for ByteStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        if self.closed {
            return Poll::Ready(None);
        }
        let polled = self.rx.poll_recv(cx);
        if let Poll::Ready(None) = polled {
            self.closed = true;
        }
        polled
    }
}
