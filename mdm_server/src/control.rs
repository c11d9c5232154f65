//! Per-device control loops.
//!
//! Each configured DM gets one OS thread that polls its channel counters,
//! recombines on change, maps the grid to a command vector and sends it.
//! All loops share one [`RunFlag`]; stopping lowers it and joins every
//! thread before returning.

use crate::channels::DeviceChannelSet;
use crate::combine::Combiner;
use crate::device::DmDevice;
use crate::error::{ServerError, ServerResult};
use crate::geometry::map_into;
use crate::logs::TimingLog;
use mdm_common::consts::DM_ACTUATORS;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};

/// Cancellation token shared by every device loop.
#[derive(Debug, Clone, Default)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// Create a lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow loops to run.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Ask loops to exit after their current cycle.
    pub fn lower(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// True while loops should keep running.
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters reported by a device loop when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Poll cycles executed
    pub polls: u64,
    /// Cycles that found a channel update and republished the combined map
    pub updates: u64,
    /// Commands accepted by the hardware
    pub sends: u64,
    /// Commands rejected by the hardware
    pub send_failures: u64,
    /// Channel read or combined publish failures
    pub combine_failures: u64,
    /// Slowest hardware send
    pub max_send_us: u64,
}

/// Everything one device loop needs, captured at start.
pub struct DeviceLoop {
    device_index: usize,
    set: Arc<DeviceChannelSet>,
    device: Arc<Mutex<DmDevice>>,
    combiner: Combiner,
    command: Vec<f64>,
    poll_interval: Duration,
    timing_log: Option<TimingLog>,
    stats: LoopStats,
}

impl DeviceLoop {
    /// Prepare the loop of 1-based `device_index`.
    ///
    /// The current counters of `set` become the baseline: updates made
    /// before this call are not sent.
    pub fn new(
        device_index: usize,
        set: Arc<DeviceChannelSet>,
        device: Arc<Mutex<DmDevice>>,
        poll_interval: Duration,
        timing_log: Option<TimingLog>,
    ) -> Self {
        let combiner = Combiner::baseline(&set);
        Self {
            device_index,
            set,
            device,
            combiner,
            command: vec![0.0; DM_ACTUATORS],
            poll_interval,
            timing_log,
            stats: LoopStats::default(),
        }
    }

    /// Baseline counters of the writable channels.
    pub fn baseline(&self) -> &[u64] {
        self.combiner.observed()
    }

    /// Spawn the loop on its own thread.
    pub fn spawn(self, run: RunFlag) -> std::io::Result<LoopHandle> {
        let device_index = self.device_index;
        let handle = std::thread::Builder::new()
            .name(format!("dm{device_index}-loop"))
            .spawn(move || self.run(&run))?;
        Ok(LoopHandle {
            device_index,
            handle,
        })
    }

    /// Run until `run` is lowered.
    pub fn run(mut self, run: &RunFlag) -> LoopStats {
        info!(
            "DM {} control loop started ({} channels, poll={}us)",
            self.device_index,
            self.set.channel_count(),
            self.poll_interval.as_micros()
        );

        while run.is_running() {
            self.cycle();
            if !self.poll_interval.is_zero() {
                std::thread::sleep(self.poll_interval);
            }
        }

        if let Some(log) = self.timing_log.as_mut() {
            if let Err(e) = log.flush() {
                warn!("Failed to flush {}: {}", log.path().display(), e);
            }
        }

        info!(
            "DM {} control loop stopped: {} polls, {} updates, {} sends, {} send failures, max send {}us",
            self.device_index,
            self.stats.polls,
            self.stats.updates,
            self.stats.sends,
            self.stats.send_failures,
            self.stats.max_send_us
        );
        self.stats
    }

    /// One poll → combine → map → send cycle.
    fn cycle(&mut self) {
        self.stats.polls += 1;

        let grid = match self.combiner.poll_and_combine(&self.set) {
            Ok(Some(grid)) => grid,
            Ok(None) => return,
            Err(e) => {
                // The update stays pending and is retried next cycle.
                self.stats.combine_failures += 1;
                if self.stats.combine_failures <= 10 || self.stats.combine_failures % 1000 == 0 {
                    warn!(
                        "DM {} combine failure #{}: {}",
                        self.device_index, self.stats.combine_failures, e
                    );
                }
                return;
            }
        };
        self.stats.updates += 1;
        map_into(grid, &mut self.command);

        let send_start = Instant::now();
        let result = self.device.lock().send_command(&self.command);
        let send_us = send_start.elapsed().as_micros() as u64;

        match result {
            Ok(()) => {
                self.stats.sends += 1;
                self.stats.max_send_us = self.stats.max_send_us.max(send_us);
                debug!("DM {} update #{} sent in {}us", self.device_index, self.stats.sends, send_us);
                self.record_send();
            }
            Err(e) => {
                self.stats.send_failures += 1;
                if self.stats.send_failures <= 10 || self.stats.send_failures % 1000 == 0 {
                    error!(
                        "DM {} send failure #{}: {}",
                        self.device_index, self.stats.send_failures, e
                    );
                }
            }
        }
    }

    fn record_send(&mut self) {
        let Some(log) = self.timing_log.as_mut() else {
            return;
        };
        if let Err(e) = log.record(SystemTime::now()) {
            warn!(
                "Timing log {} disabled after write error: {}",
                log.path().display(),
                e
            );
            self.timing_log = None;
        }
    }
}

/// Join handle of a spawned device loop.
pub struct LoopHandle {
    device_index: usize,
    handle: JoinHandle<LoopStats>,
}

impl LoopHandle {
    /// 1-based device index.
    pub fn device_index(&self) -> usize {
        self.device_index
    }

    /// Wait for the loop to exit.
    pub fn join(self) -> ServerResult<LoopStats> {
        self.handle
            .join()
            .map_err(|_| ServerError::LoopPanicked(self.device_index))
    }
}

/// The set of running device loops.
pub struct ControlLoops {
    run: RunFlag,
    handles: Vec<LoopHandle>,
}

impl ControlLoops {
    /// Raise a fresh run flag and spawn every loop.
    ///
    /// If a spawn fails the loops already started are stopped again.
    pub fn start(loops: Vec<DeviceLoop>) -> ServerResult<Self> {
        let run = RunFlag::new();
        run.raise();

        let mut started = Self {
            run: run.clone(),
            handles: Vec::with_capacity(loops.len()),
        };
        for device_loop in loops {
            match device_loop.spawn(run.clone()) {
                Ok(handle) => started.handles.push(handle),
                Err(e) => {
                    error!("Failed to spawn control loop: {}", e);
                    let _ = started.stop();
                    return Err(e.into());
                }
            }
        }
        Ok(started)
    }

    /// Lower the run flag and join every loop.
    ///
    /// Returns per-device stats in device order. Every thread is joined
    /// even if one of them panicked; the first panic is reported.
    pub fn stop(self) -> ServerResult<Vec<(usize, LoopStats)>> {
        self.run.lower();

        let mut stats = Vec::with_capacity(self.handles.len());
        let mut panicked = None;
        for handle in self.handles {
            let device_index = handle.device_index();
            match handle.join() {
                Ok(s) => stats.push((device_index, s)),
                Err(e) => {
                    error!("{}", e);
                    panicked.get_or_insert(e);
                }
            }
        }

        match panicked {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    /// Shared run flag.
    pub fn run_flag(&self) -> &RunFlag {
        &self.run
    }

    /// Number of running loops.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True if no loop was spawned.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChannelManager, DM_SHAPE};
    use crate::drivers::simulation::{SimProbe, SimulatedDm};
    use mdm_shm::{ImageShape, ImageWriter};

    fn open_sim() -> (Arc<Mutex<DmDevice>>, SimProbe) {
        let sim = SimulatedDm::new();
        let probe = sim.probe();
        let device = DmDevice::open("17DW019#113", Box::new(sim)).unwrap();
        (Arc::new(Mutex::new(device)), probe)
    }

    #[test]
    fn run_flag_toggles() {
        let flag = RunFlag::new();
        assert!(!flag.is_running());
        let shared = flag.clone();
        flag.raise();
        assert!(shared.is_running());
        shared.lower();
        assert!(!flag.is_running());
    }

    #[test]
    fn cycle_sends_once_per_update() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ChannelManager::new(dir.path());
        manager.configure(1, 2).unwrap();
        let set = Arc::clone(manager.set(1).unwrap());
        let (device, probe) = open_sim();

        let mut device_loop = DeviceLoop::new(1, Arc::clone(&set), device, Duration::ZERO, None);
        device_loop.cycle();
        assert_eq!(probe.send_count(), 0);

        let mut frame = vec![0.0; 144];
        frame[1] = 0.4;
        set.channels()[1].publish(&frame).unwrap();
        device_loop.cycle();
        device_loop.cycle();

        assert_eq!(probe.send_count(), 1);
        let command = probe.last_command().unwrap();
        assert_eq!(command.len(), DM_ACTUATORS);
        assert_eq!(command[0], 0.4);
        assert_eq!(device_loop.stats.polls, 3);
        assert_eq!(device_loop.stats.updates, 1);
    }

    #[test]
    fn send_failure_is_counted_and_loop_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ChannelManager::new(dir.path());
        manager.configure(1, 1).unwrap();
        let set = Arc::clone(manager.set(1).unwrap());
        let (device, probe) = open_sim();
        let mut device_loop = DeviceLoop::new(1, Arc::clone(&set), device, Duration::ZERO, None);

        probe.fail_send(true);
        set.channels()[0].zero().unwrap();
        device_loop.cycle();
        assert_eq!(device_loop.stats.send_failures, 1);

        probe.fail_send(false);
        set.channels()[0].zero().unwrap();
        device_loop.cycle();
        assert_eq!(device_loop.stats.sends, 1);
        assert_eq!(probe.send_count(), 1);
    }

    #[test]
    fn combine_failure_is_retried_every_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let channel = ImageWriter::create(dir.path(), "dm1disp00", DM_SHAPE).unwrap();
        let undersized = ImageWriter::create(dir.path(), "dm1", ImageShape::square(3)).unwrap();
        let set = Arc::new(DeviceChannelSet::from_writers(1, vec![channel], undersized));
        let (device, probe) = open_sim();
        let mut device_loop = DeviceLoop::new(1, Arc::clone(&set), device, Duration::ZERO, None);

        set.channels()[0].publish(&[0.3; 144]).unwrap();
        for _ in 0..3 {
            device_loop.cycle();
        }

        assert_eq!(device_loop.stats.combine_failures, 3);
        assert_eq!(device_loop.stats.updates, 0);
        assert_eq!(device_loop.baseline(), &[0]);
        assert_eq!(probe.send_count(), 0);
    }

    #[test]
    fn timing_log_gets_one_line_per_send() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ChannelManager::new(dir.path());
        manager.configure(1, 1).unwrap();
        let set = Arc::clone(manager.set(1).unwrap());
        let (device, _probe) = open_sim();
        let log = TimingLog::create(dir.path(), 1).unwrap();
        let path = log.path().to_path_buf();

        let mut device_loop = DeviceLoop::new(1, Arc::clone(&set), device, Duration::ZERO, Some(log));
        for _ in 0..3 {
            set.channels()[0].zero().unwrap();
            device_loop.cycle();
        }
        device_loop.cycle();

        let run = RunFlag::new();
        device_loop.run(&run);

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.lines().all(|l| l.parse::<f64>().is_ok()));
    }

    #[test]
    fn loops_stop_and_report_stats() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ChannelManager::new(dir.path());
        manager.configure(2, 1).unwrap();

        let mut probes = Vec::new();
        let loops = manager
            .sets()
            .iter()
            .map(|set| {
                let (device, probe) = open_sim();
                probes.push(probe);
                DeviceLoop::new(set.device(), Arc::clone(set), device, Duration::from_micros(10), None)
            })
            .collect();

        let running = ControlLoops::start(loops).unwrap();
        assert_eq!(running.len(), 2);
        assert!(running.run_flag().is_running());

        let producer = ImageWriter::attach(dir.path(), "dm2disp00").unwrap();
        producer.publish(&[0.5; 144]).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while probes[1].send_count() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }

        let stats = running.stop().unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].0, 1);
        assert_eq!(stats[0].1.sends, 0);
        assert_eq!(stats[1].1.sends, 1);
        assert!(stats[1].1.polls >= 1);
        assert_eq!(probes[0].send_count(), 0);
        assert_eq!(probes[1].send_count(), 1);
    }
}
