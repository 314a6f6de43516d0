//! # firmtest
//!
//! Async harness for driving embedded firmware shells from integration tests.
//!
//! firmtest talks to a device over a UART or a debug probe's real-time
//! transfer channel, sends shell commands between prompts, and waits for
//! regex matches in the line-oriented output with a deadline.
//!
//! ## Features
//!
//! - One async byte-stream interface over poll-only probe channels and async
//!   serial ports (`serial` feature, via tokio-serial)
//! - Chunked, serialized writes for channels that drop large writes
//! - Line buffer with consume-on-match semantics and bounded memory
//! - Ordered shutdown: hardware is released only after the reader stops
//! - Board profiles (Zephyr UART, RTT) and optional pre-test flashing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use firmtest::{BoardProfile, Device, TransportBridge};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), firmtest::Error> {
//!     # let bridge: TransportBridge = unimplemented!();
//!     let temperature = Device::new(BoardProfile::zephyr_uart(), bridge)
//!         .with_session(async |board| {
//!             board.send_command("sensors show sht_temp").await?;
//!             let line = board
//!                 .wait_for_pattern(r"temperature: ([0-9.]+)C", Duration::from_secs(5))
//!                 .await?;
//!             Ok(line.group(1).unwrap_or_default().to_string())
//!         })
//!         .await?;
//!
//!     println!("{temperature}");
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod channel;
pub mod config;
pub mod error;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use board::{BoardProfile, BoardRegistry, Device, DeviceConfig, DeviceSession, Programmer};
pub use channel::{LineBuffer, LineMatch, MatchResult};
pub use error::{Error, Result};
pub use session::{CommandReply, CommandSession, SessionConfig};
pub use transport::{PollChannel, Target, Transport, TransportBridge, TransportConfig};
