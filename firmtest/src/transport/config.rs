//! Transport configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::millis;

/// Which hardware channel a transport talks to.
///
/// Passed through to the transport untouched; used for logging and for
/// connect errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// UART device node and baud rate.
    Serial {
        port: String,
        #[serde(default = "default_baud")]
        baud: u32,
    },

    /// Debug probe real-time transfer channel.
    Probe {
        /// Probe serial number, `None` for the only attached probe.
        #[serde(default)]
        serial_number: Option<String>,
        /// Target device identifier (e.g. `nRF9160_xxAA`).
        device: String,
    },

    /// Anything else, identified by name only.
    Named { name: String },
}

fn default_baud() -> u32 {
    115_200
}

impl Target {
    /// Create a serial target.
    pub fn serial(port: impl Into<String>, baud: u32) -> Self {
        Target::Serial {
            port: port.into(),
            baud,
        }
    }

    /// Create a probe target.
    pub fn probe(serial_number: Option<String>, device: impl Into<String>) -> Self {
        Target::Probe {
            serial_number,
            device: device.into(),
        }
    }

    /// Create a named target.
    pub fn named(name: impl Into<String>) -> Self {
        Target::Named { name: name.into() }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Serial { port, baud } => write!(f, "{port}@{baud}"),
            Target::Probe {
                serial_number: Some(sn),
                device,
            } => write!(f, "probe {sn} ({device})"),
            Target::Probe {
                serial_number: None,
                device,
            } => write!(f, "probe ({device})"),
            Target::Named { name } => f.write_str(name),
        }
    }
}

/// Configuration for transport behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum bytes per hardware write.
    ///
    /// Poll-driven channels drop bytes on large single writes, so sends are
    /// split into chunks of this size.
    pub chunk_size: usize,

    /// Pause between two chunks of the same send.
    #[serde(with = "millis")]
    pub inter_chunk_delay: Duration,

    /// Pause between two blocking reads of a poll-driven channel.
    #[serde(with = "millis")]
    pub poll_interval: Duration,

    /// Maximum bytes per read.
    pub max_read: usize,

    /// Number of chunks the stream holds before the reader waits.
    pub queue_depth: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            inter_chunk_delay: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
            max_read: 1024,
            queue_depth: 100,
        }
    }
}

impl TransportConfig {
    /// Set the write chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the delay between write chunks.
    pub fn with_inter_chunk_delay(mut self, delay: Duration) -> Self {
        self.inter_chunk_delay = delay;
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the stream queue depth.
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }
}
