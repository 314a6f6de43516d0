//! Boards: profiles, the programmer capability, and the device composition.
//!
//! A [`Device`] ties together an optional [`Programmer`], a transport
//! bridge, and a [`BoardProfile`]. Starting a device flashes the firmware
//! image (if any), opens the transport, waits for the firmware to settle, and
//! hands the test a [`DeviceSession`]. The transport is released when the
//! test returns, fails, or is cancelled.

mod device;
mod profile;
mod registry;

pub use device::{Device, DeviceConfig, DeviceSession};
pub use profile::{BoardProfile, probe_device_for};
pub use registry::BoardRegistry;

use std::io;
use std::path::Path;

/// Blocking flash/reset capability of a debug probe.
///
/// Implementations wrap a vendor tool or library. Calls may block for
/// seconds; the device always runs them on the blocking thread pool.
pub trait Programmer: Send + 'static {
    /// Write `image` to the target and restart it.
    ///
    /// Expected to erase first where the hardware requires it.
    fn program(&mut self, image: &Path) -> io::Result<()>;

    /// Hardware reset of the target.
    fn reset(&mut self) -> io::Result<()>;

    /// Erase all flash.
    fn erase(&mut self) -> io::Result<()>;
}
