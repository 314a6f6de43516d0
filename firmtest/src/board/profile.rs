//! Board profiles: what differs between firmware shells.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::millis;
use crate::error::{DeviceError, Result};
use crate::session::SessionConfig;

/// Per-board-family shell conventions.
///
/// A profile is plain data. New boards are added by registering a profile,
/// not by writing a new type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardProfile {
    /// Registry name (e.g. "zephyr_uart", "sense_core").
    pub name: String,

    /// Pattern matching the shell prompt.
    pub prompt: String,

    /// Wait after opening the transport, before the shell accepts input.
    #[serde(with = "millis")]
    pub settle_delay: Duration,

    /// Command that reboots the firmware.
    pub reset_command: String,

    /// Line printed once the firmware is back up.
    pub reset_marker: String,

    /// Template for changing a persisted setting. `{key}` and `{value}` are
    /// substituted.
    pub setting_command: String,

    /// Line printed once a setting is stored.
    pub setting_marker: String,
}

impl Default for BoardProfile {
    fn default() -> Self {
        Self::zephyr_uart()
    }
}

impl BoardProfile {
    /// Create a profile with Zephyr shell conventions under a new name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::zephyr_uart()
        }
    }

    /// Zephyr shell on a UART.
    pub fn zephyr_uart() -> Self {
        Self {
            name: "zephyr_uart".to_string(),
            prompt: "uart:".to_string(),
            settle_delay: Duration::from_secs(6),
            reset_command: "kernel reboot cold".to_string(),
            reset_marker: "Booting Zephyr OS".to_string(),
            setting_command: "settings set {key} {value}".to_string(),
            setting_marker: "saved".to_string(),
        }
    }

    /// Zephyr shell on the RTT backend.
    pub fn zephyr_rtt() -> Self {
        Self {
            name: "zephyr_rtt".to_string(),
            prompt: "rtt:".to_string(),
            ..Self::zephyr_uart()
        }
    }

    /// SenseCore application firmware (RTT shell).
    pub fn sense_core() -> Self {
        Self {
            name: "sense_core".to_string(),
            ..Self::zephyr_rtt()
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the reset command and the marker that ends it.
    pub fn with_reset(mut self, command: impl Into<String>, marker: impl Into<String>) -> Self {
        self.reset_command = command.into();
        self.reset_marker = marker.into();
        self
    }

    /// Set the setting template and the marker that ends it.
    pub fn with_setting(mut self, template: impl Into<String>, marker: impl Into<String>) -> Self {
        self.setting_command = template.into();
        self.setting_marker = marker.into();
        self
    }

    /// The command line that stores `key = value`.
    pub fn setting_line(&self, key: &str, value: &str) -> String {
        self.setting_command
            .replace("{key}", key)
            .replace("{value}", value)
    }

    /// `base` with this board's prompt.
    pub fn session_config(&self, base: SessionConfig) -> SessionConfig {
        base.with_prompt(self.prompt.clone())
    }
}

/// Debug-probe device identifier for a board target name.
///
/// Board targets are matched by suffix, so `"nrf9161dk/nrf9161"` and
/// `"nrf9161"` both resolve.
pub fn probe_device_for(board: &str) -> Result<&'static str> {
    let board = board.to_ascii_lowercase();
    if board.ends_with("nrf9161") || board.ends_with("nrf9160") {
        Ok("nRF9160_xxAA")
    } else if board.ends_with("nrf5340") {
        Ok("nRF5340_xxAA_APP")
    } else {
        Err(DeviceError::InvalidConfig {
            message: format!("board '{board}' has no known probe device"),
        }
        .into())
    }
}
