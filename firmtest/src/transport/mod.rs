//! Transport layer: a uniform async byte stream over device channels.
//!
//! Two kinds of hardware are bridged:
//!
//! - poll-only channels (debug-probe RTT) through [`PollChannel`], read by a
//!   background poll loop on the blocking thread pool, and
//! - async byte channels (UART via `tokio-serial`, pipes in tests), drained
//!   by a background reader task.
//!
//! Either way the consumer sees one ordered, bounded [`ByteStream`] and
//! writes go out in small, delayed chunks.

mod bridge;
pub mod config;
mod poll;
mod stream;

pub use bridge::{AsyncIo, Transport, TransportBridge, TransportState};
pub use config::{Target, TransportConfig};
pub use poll::PollChannel;
pub use stream::ByteStream;
