//! DM server: devices, channel sets, control loops and operator actions.

use crate::channels::{ChannelManager, ChannelSelector};
use crate::command::{Command, help_text};
use crate::control::{ControlLoops, DeviceLoop, LoopStats};
use crate::device::DmDevice;
use crate::driver_registry::DriverRegistry;
use crate::error::{ServerError, ServerResult};
use crate::logs::{ActionLog, TimingLog};
use mdm_common::config::{ConfigError, ServerConfig};
use mdm_shm::SegmentDiscovery;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Runtime settings of a [`DmServer`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Directory of the shared-memory segments
    pub shm_dir: PathBuf,
    /// Delay between two channel polls
    pub poll_interval: Duration,
    /// Directory of the per-device timing logs, `None` disables them
    pub timing_log_dir: Option<PathBuf>,
    /// Action log file, `None` disables it
    pub action_log: Option<PathBuf>,
}

impl ServerOptions {
    /// Settings taken from a loaded configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            shm_dir: config.server.shm_dir.clone(),
            poll_interval: config.poll_interval(),
            timing_log_dir: config
                .timing_log
                .enabled
                .then(|| config.timing_log.dir.clone()),
            action_log: Some(config.server.action_log.clone()),
        }
    }
}

/// Result of one operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Command done, message for the operator
    Done(String),
    /// The server was shut down, the shell should exit
    Quit,
}

/// The multi-DM server.
pub struct DmServer {
    options: ServerOptions,
    devices: Vec<Arc<Mutex<DmDevice>>>,
    channels: ChannelManager,
    loops: Option<ControlLoops>,
    action_log: Option<ActionLog>,
    last_stats: Vec<(usize, LoopStats)>,
    shut_down: bool,
}

impl DmServer {
    /// Open every configured DM through the configured driver.
    ///
    /// On failure the devices opened so far are released again.
    pub fn open_devices(
        config: &ServerConfig,
        registry: &DriverRegistry,
    ) -> ServerResult<Vec<DmDevice>> {
        let mut devices: Vec<DmDevice> = Vec::with_capacity(config.devices.len());

        for (index, device) in config.devices.iter().enumerate() {
            info!("Attempting to open DM {} ({})", index + 1, device.serial);
            let opened = registry
                .create_driver(&config.server.driver)
                .and_then(|driver| DmDevice::open(&device.serial, driver));

            match opened {
                Ok(dm) => devices.push(dm),
                Err(source) => {
                    for dm in devices.iter_mut() {
                        dm.shutdown();
                    }
                    return Err(ServerError::DeviceOpen {
                        device: index + 1,
                        serial: device.serial.clone(),
                        source,
                    });
                }
            }
        }

        Ok(devices)
    }

    /// Create a stopped, unconfigured server over opened `devices`.
    ///
    /// Removes segments left behind by dead processes in the segment
    /// directory before anything is allocated.
    pub fn new(options: ServerOptions, devices: Vec<DmDevice>) -> ServerResult<Self> {
        if devices.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one device must be opened".to_string(),
            )
            .into());
        }

        std::fs::create_dir_all(&options.shm_dir)?;
        match SegmentDiscovery::new(&options.shm_dir).cleanup_orphaned_segments() {
            Ok(0) => {}
            Ok(n) => info!("Removed {} orphaned segments from {}", n, options.shm_dir.display()),
            Err(e) => warn!("Orphaned segment cleanup failed: {}", e),
        }

        let action_log = match &options.action_log {
            Some(path) => match ActionLog::open(path) {
                Ok(log) => Some(log),
                Err(e) => {
                    warn!("Action log {} unavailable: {}", path.display(), e);
                    None
                }
            },
            None => None,
        };

        info!(
            "DM server ready: {} devices, segments in {}",
            devices.len(),
            options.shm_dir.display()
        );

        Ok(Self {
            channels: ChannelManager::new(options.shm_dir.clone()),
            options,
            devices: devices
                .into_iter()
                .map(|device| Arc::new(Mutex::new(device)))
                .collect(),
            loops: None,
            action_log,
            last_stats: Vec::new(),
            shut_down: false,
        })
    }

    /// Reallocate every DM with `channel_count` writable channels.
    ///
    /// Refused while the loops run. On failure the server is left
    /// unconfigured.
    pub fn set_channel_count(&mut self, channel_count: usize) -> ServerResult<()> {
        if self.is_running() {
            return Err(ServerError::LoopRunning);
        }
        self.log_action(&format!("set_nch {channel_count}"));
        self.channels.configure(self.devices.len(), channel_count)?;
        info!("Number of channels set to {}", channel_count);
        Ok(())
    }

    /// Writable channels per DM, 0 when unconfigured.
    pub fn channel_count(&self) -> usize {
        self.channels.channel_count()
    }

    /// Spawn one control loop per DM.
    pub fn start(&mut self) -> ServerResult<()> {
        if self.is_running() {
            return Err(ServerError::LoopRunning);
        }
        if !self.channels.is_configured() {
            return Err(ServerError::NotConfigured);
        }

        if let Some(dir) = &self.options.timing_log_dir {
            std::fs::create_dir_all(dir)?;
        }

        let mut loops = Vec::with_capacity(self.devices.len());
        for (set, device) in self.channels.sets().iter().zip(&self.devices) {
            let timing_log = match &self.options.timing_log_dir {
                Some(dir) => Some(TimingLog::create(dir, set.device())?),
                None => None,
            };
            loops.push(DeviceLoop::new(
                set.device(),
                Arc::clone(set),
                Arc::clone(device),
                self.options.poll_interval,
                timing_log,
            ));
        }

        self.loops = Some(ControlLoops::start(loops)?);
        self.log_action("DM control loop START");
        Ok(())
    }

    /// Stop and join every control loop.
    ///
    /// Returns once all loops have exited, with their stats in device order.
    pub fn stop(&mut self) -> ServerResult<Vec<(usize, LoopStats)>> {
        let loops = self.loops.take().ok_or(ServerError::LoopStopped)?;
        self.log_action("DM control loop STOP");
        let stats = loops.stop()?;
        self.last_stats = stats.clone();
        Ok(stats)
    }

    /// Zero one channel on every DM, or every channel.
    ///
    /// Running loops pick the change up on their next poll.
    pub fn reset(&mut self, selector: ChannelSelector) -> ServerResult<usize> {
        let count = self.channels.reset(selector)?;
        let target = match selector {
            ChannelSelector::All => "all channels".to_string(),
            ChannelSelector::Channel(k) => format!("channel {k}"),
        };
        self.log_action(&format!("reset {target}"));
        Ok(count)
    }

    /// Run one operator command.
    pub fn execute(&mut self, command: Command) -> ServerResult<Outcome> {
        debug!("Executing command: {}", command);
        let message = match command {
            Command::Start => {
                self.start()?;
                "DM control loop START".to_string()
            }
            Command::Stop => {
                let stats = self.stop()?;
                let sends: u64 = stats.iter().map(|(_, s)| s.sends).sum();
                format!("DM control loop STOP ({sends} commands sent)")
            }
            Command::SetChannelCount(n) => {
                self.set_channel_count(n)?;
                "number of channels successfully updated".to_string()
            }
            Command::GetChannelCount => {
                format!("number of channels = {}", self.channel_count())
            }
            Command::Reset(selector) => {
                let count = self.reset(selector)?;
                format!("{count} channels reset")
            }
            Command::Help => help_text(),
            Command::Quit => {
                if self.is_running() {
                    return Err(ServerError::LoopRunning);
                }
                self.shutdown()?;
                return Ok(Outcome::Quit);
            }
        };
        Ok(Outcome::Done(message))
    }

    /// Stop the loops, release every DM and destroy every segment.
    ///
    /// Driver errors are logged, not returned. Idempotent.
    pub fn shutdown(&mut self) -> ServerResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        let mut result = Ok(());
        if self.is_running() {
            if let Err(e) = self.stop() {
                error!("Stopping control loops failed: {}", e);
                result = Err(e);
            }
        }

        for device in &self.devices {
            device.lock().shutdown();
        }

        if let Err(e) = self.channels.teardown() {
            error!("Segment teardown failed: {}", e);
            if result.is_ok() {
                result = Err(e);
            }
        }

        self.log_action("DM control program quit");
        info!("DM server shut down");
        result
    }

    /// True while the control loops run.
    pub fn is_running(&self) -> bool {
        self.loops.is_some()
    }

    /// Number of served DMs.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Channel sets.
    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    /// Stats of the last stopped run.
    pub fn last_stats(&self) -> &[(usize, LoopStats)] {
        &self.last_stats
    }

    /// Runtime settings.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    fn log_action(&mut self, message: &str) {
        let Some(log) = self.action_log.as_mut() else {
            return;
        };
        if let Err(e) = log.append(message) {
            warn!("Failed to write action log {}: {}", log.path().display(), e);
        }
    }
}

impl Drop for DmServer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Shutdown on drop failed: {}", e);
        }
    }
}
