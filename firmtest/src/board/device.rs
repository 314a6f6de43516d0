//! Device composition and scoped start.

use std::io;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::Programmer;
use super::profile::BoardProfile;
use super::registry::BoardRegistry;
use crate::config::millis;
use crate::error::{DeviceError, Result};
use crate::session::{CommandReply, CommandSession, SessionConfig};
use crate::transport::{PollChannel, Target, TransportBridge, TransportConfig};

type SharedProgrammer = Arc<Mutex<Box<dyn Programmer>>>;

/// Run a blocking programmer call on the blocking thread pool.
async fn run_programmer<T, F>(programmer: &SharedProgrammer, f: F) -> io::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn Programmer) -> io::Result<T> + Send + 'static,
{
    let programmer = programmer.clone();
    tokio::task::spawn_blocking(move || {
        let mut guard = programmer.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut **guard)
    })
    .await
    .map_err(io::Error::other)?
}

async fn programmer_call<F>(programmer: Option<&SharedProgrammer>, action: &str, f: F) -> Result<()>
where
    F: FnOnce(&mut dyn Programmer) -> io::Result<()> + Send + 'static,
{
    let Some(programmer) = programmer else {
        return Err(DeviceError::InvalidConfig {
            message: format!("cannot {action}: no programmer attached"),
        }
        .into());
    };

    debug!("programmer: {}", action);
    run_programmer(programmer, f)
        .await
        .map_err(|e| DeviceError::Programmer(e).into())
}

/// Serializable description of a device under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Hardware channel to talk to.
    pub target: Target,

    /// Board profile name in the [`BoardRegistry`].
    #[serde(default = "default_board")]
    pub board: String,

    /// Firmware image flashed before the transport is opened.
    #[serde(default)]
    pub image: Option<PathBuf>,

    /// Overrides the profile's settle delay.
    #[serde(default, with = "millis::option")]
    pub settle_delay: Option<Duration>,

    #[serde(default)]
    pub transport: TransportConfig,

    /// Session settings. The prompt always comes from the board profile.
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_board() -> String {
    "zephyr_uart".to_string()
}

impl DeviceConfig {
    /// Create a config for `target` using board profile `board`.
    pub fn new(target: Target, board: impl Into<String>) -> Self {
        Self {
            target,
            board: board.into(),
            image: None,
            settle_delay: None,
            transport: TransportConfig::default(),
            session: SessionConfig::default(),
        }
    }

    pub fn with_image(mut self, image: impl Into<PathBuf>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = Some(delay);
        self
    }

    /// Look up the board profile.
    pub fn profile(&self) -> Result<BoardProfile> {
        BoardRegistry::lookup(&self.board)
    }

    /// A bridge to this target over a poll-only channel.
    pub fn polled(&self, channel: impl PollChannel) -> TransportBridge {
        TransportBridge::polled(self.target.clone(), channel, self.transport.clone())
    }

    /// A bridge to this target's UART.
    #[cfg(feature = "serial")]
    pub fn serial(&self) -> Result<TransportBridge> {
        match &self.target {
            Target::Serial { port, baud } => Ok(TransportBridge::serial(
                port.clone(),
                *baud,
                self.transport.clone(),
            )),
            other => Err(DeviceError::InvalidConfig {
                message: format!("{other} is not a serial target"),
            }
            .into()),
        }
    }
}

/// A board under test, not yet started.
///
/// # Example
///
/// ```rust,no_run
/// use firmtest::board::{BoardProfile, Device};
/// use firmtest::transport::{PollChannel, Target, TransportBridge, TransportConfig};
///
/// # async fn example(rtt: impl PollChannel) -> Result<(), firmtest::Error> {
/// let bridge = TransportBridge::polled(
///     Target::probe(None, "nRF9160_xxAA"),
///     rtt,
///     TransportConfig::default(),
/// );
///
/// Device::new(BoardProfile::sense_core(), bridge)
///     .with_session(async |board| {
///         board.set_setting("app/interval", "500").await?;
///         board.send_command("sensors show sht_temp").await?;
///         Ok(())
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Device {
    profile: BoardProfile,
    bridge: TransportBridge,
    programmer: Option<SharedProgrammer>,
    image: Option<PathBuf>,
    settle_delay: Duration,
    session: SessionConfig,
}

impl Device {
    /// Create a device with `profile`'s settle delay and prompt.
    pub fn new(profile: BoardProfile, bridge: TransportBridge) -> Self {
        Self {
            settle_delay: profile.settle_delay,
            session: profile.session_config(SessionConfig::default()),
            profile,
            bridge,
            programmer: None,
            image: None,
        }
    }

    /// Create a device from `config`, resolving the board profile.
    pub fn from_config(config: DeviceConfig, bridge: TransportBridge) -> Result<Self> {
        let profile = config.profile()?;
        Ok(Self {
            settle_delay: config.settle_delay.unwrap_or(profile.settle_delay),
            session: profile.session_config(config.session),
            image: config.image,
            profile,
            bridge,
            programmer: None,
        })
    }

    pub fn with_programmer(mut self, programmer: impl Programmer) -> Self {
        self.programmer = Some(Arc::new(Mutex::new(Box::new(programmer))));
        self
    }

    /// Flash `image` on start. Requires a programmer.
    pub fn with_image(mut self, image: impl Into<PathBuf>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Replace the session settings. The prompt stays the profile's.
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session = self.profile.session_config(config);
        self
    }

    pub fn profile(&self) -> &BoardProfile {
        &self.profile
    }

    pub fn target(&self) -> &Target {
        self.bridge.target()
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }

    /// Flash the configured image. Does nothing without an image.
    pub async fn program(&self) -> Result<()> {
        let Some(image) = self.image.clone() else {
            return Ok(());
        };
        let Some(programmer) = &self.programmer else {
            return Err(DeviceError::InvalidConfig {
                message: format!("image '{}' given but no programmer attached", image.display()),
            }
            .into());
        };

        info!("programming {} with {}", self.bridge.target(), image.display());
        let path = image.clone();
        run_programmer(programmer, move |p| p.program(&path))
            .await
            .map_err(|source| DeviceError::Program { image, source }.into())
    }

    /// Erase the target's flash.
    pub async fn erase(&self) -> Result<()> {
        programmer_call(self.programmer.as_ref(), "erase", |p| p.erase()).await
    }

    /// Reset the target through the programmer.
    pub async fn hardware_reset(&self) -> Result<()> {
        programmer_call(self.programmer.as_ref(), "reset", |p| p.reset()).await
    }

    /// Program, open the transport, settle, and run `body`.
    ///
    /// The image (if any) is fully written before the transport is opened.
    /// The transport is closed on every exit path, including failures in
    /// `body` and cancellation of the returned future.
    pub async fn with_session<R>(
        self,
        body: impl AsyncFnOnce(&mut DeviceSession<'_>) -> Result<R>,
    ) -> Result<R> {
        self.program().await?;

        let Device {
            profile,
            bridge,
            programmer,
            settle_delay,
            session,
            ..
        } = self;

        bridge
            .with_open(async move |transport| {
                if !settle_delay.is_zero() {
                    debug!("waiting {:?} for {} to settle", settle_delay, transport.target());
                    tokio::time::sleep(settle_delay).await;
                }

                let session = CommandSession::new(transport, session)?;
                let mut device = DeviceSession {
                    session,
                    profile,
                    programmer,
                };
                body(&mut device).await
            })
            .await
    }
}

/// A started device: a command session plus board helpers.
///
/// Dereferences to [`CommandSession`].
pub struct DeviceSession<'a> {
    session: CommandSession<'a>,
    profile: BoardProfile,
    programmer: Option<SharedProgrammer>,
}

impl<'a> DeviceSession<'a> {
    pub fn profile(&self) -> &BoardProfile {
        &self.profile
    }

    /// Store a persisted firmware setting and wait for confirmation.
    pub async fn set_setting(&mut self, key: &str, value: &str) -> Result<CommandReply> {
        let line = self.profile.setting_line(key, value);
        let marker = self.profile.setting_marker.clone();
        self.session.send_command_until(&line, &marker).await
    }

    /// Reboot the firmware from its shell and wait for the boot banner.
    pub async fn reboot(&mut self) -> Result<CommandReply> {
        let command = self.profile.reset_command.clone();
        let marker = self.profile.reset_marker.clone();
        self.session.send_command_until(&command, &marker).await
    }

    /// Reset the target through the programmer.
    pub async fn hardware_reset(&self) -> Result<()> {
        programmer_call(self.programmer.as_ref(), "reset", |p| p.reset()).await
    }

    /// The underlying command session.
    pub fn session(&mut self) -> &mut CommandSession<'a> {
        &mut self.session
    }
}

impl<'a> Deref for DeviceSession<'a> {
    type Target = CommandSession<'a>;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl DerefMut for DeviceSession<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("profile", &self.profile.name)
            .field("target", self.bridge.target())
            .field("image", &self.image.as_deref().map(Path::display))
            .field("programmer", &self.programmer.is_some())
            .field("settle_delay", &self.settle_delay)
            .finish()
    }
}
