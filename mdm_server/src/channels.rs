//! Channel-set lifecycle management.
//!
//! Every DM owns `nch` writable channels (`dm<d>disp<cc>`) and one combined
//! output (`dm<d>`), all 12x12 `f64` image segments. The [`ChannelManager`]
//! is the only owner of these segments: it destroys a whole configuration
//! before allocating the next one, and never leaves a partially built
//! configuration reachable.

use crate::error::{ServerError, ServerResult};
use mdm_common::consts::{DM_GRID_SIDE, MAX_CHANNELS};
use mdm_common::shm::consts::{channel_segment_name, combined_segment_name};
use mdm_shm::{ImageShape, ImageWriter, ShmResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Shape of every DM channel.
pub const DM_SHAPE: ImageShape = ImageShape::square(DM_GRID_SIDE as u32);

/// Target of a channel reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSelector {
    /// Every writable channel of every DM
    All,
    /// One channel index on every DM
    Channel(usize),
}

/// Writable channels plus combined output of one DM.
pub struct DeviceChannelSet {
    device: usize,
    channels: Vec<ImageWriter>,
    combined: ImageWriter,
}

impl DeviceChannelSet {
    /// Allocate `channel_count` channels and the combined output of `device`.
    ///
    /// Segments created before a failure are removed when the partial
    /// vector is dropped.
    fn create(dir: &Path, device: usize, channel_count: usize) -> ShmResult<Self> {
        let channels = (0..channel_count)
            .map(|channel| ImageWriter::create(dir, &channel_segment_name(device, channel), DM_SHAPE))
            .collect::<ShmResult<Vec<_>>>()?;
        let combined = ImageWriter::create(dir, &combined_segment_name(device), DM_SHAPE)?;

        Ok(Self {
            device,
            channels,
            combined,
        })
    }

    /// Remove every segment of this set, reporting the first failure.
    fn destroy(self) -> ShmResult<()> {
        let mut result = Ok(());
        for writer in self.channels.into_iter().chain(std::iter::once(self.combined)) {
            let name = writer.name().to_string();
            if let Err(e) = writer.destroy() {
                warn!("Failed to destroy segment {}: {}", name, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    /// 1-based device index.
    pub fn device(&self) -> usize {
        self.device
    }

    /// Number of writable channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Writable channels in index order.
    pub fn channels(&self) -> &[ImageWriter] {
        &self.channels
    }

    /// Combined output buffer.
    pub fn combined(&self) -> &ImageWriter {
        &self.combined
    }

    /// Current update counters of the writable channels.
    pub fn channel_counters(&self) -> Vec<u64> {
        self.channels.iter().map(ImageWriter::counter).collect()
    }

    #[cfg(test)]
    pub(crate) fn from_writers(device: usize, channels: Vec<ImageWriter>, combined: ImageWriter) -> Self {
        Self {
            device,
            channels,
            combined,
        }
    }
}

/// Owner of every DM channel set.
pub struct ChannelManager {
    dir: PathBuf,
    sets: Vec<Arc<DeviceChannelSet>>,
    channel_count: usize,
}

impl ChannelManager {
    /// Create an unconfigured manager placing segments in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sets: Vec::new(),
            channel_count: 0,
        }
    }

    /// Replace the current configuration with `device_count` DMs of
    /// `channel_count` channels each.
    ///
    /// The previous configuration is destroyed first. On failure the
    /// manager is left unconfigured with no segment of this call remaining.
    pub fn configure(&mut self, device_count: usize, channel_count: usize) -> ServerResult<()> {
        if channel_count == 0 || channel_count > MAX_CHANNELS {
            return Err(ServerError::InvalidChannelCount(channel_count));
        }

        self.teardown()?;

        let mut sets = Vec::with_capacity(device_count);
        for device in 1..=device_count {
            match DeviceChannelSet::create(&self.dir, device, channel_count) {
                Ok(set) => sets.push(set),
                Err(e) => {
                    warn!("Channel allocation failed for DM {}: {}", device, e);
                    for set in sets {
                        let _ = set.destroy();
                    }
                    return Err(e.into());
                }
            }
        }

        self.sets = sets.into_iter().map(Arc::new).collect();
        self.channel_count = channel_count;
        info!(
            "Allocated {} channels + combined output for {} DMs in {}",
            channel_count,
            device_count,
            self.dir.display()
        );
        Ok(())
    }

    /// Destroy every segment and become unconfigured.
    pub fn teardown(&mut self) -> ServerResult<()> {
        let mut result = Ok(());
        self.channel_count = 0;

        for set in self.sets.drain(..) {
            match Arc::try_unwrap(set) {
                Ok(set) => {
                    if let Err(e) = set.destroy() {
                        if result.is_ok() {
                            result = Err(e.into());
                        }
                    }
                }
                Err(shared) => {
                    // Segments are removed when the last holder drops.
                    warn!(
                        "Channel set of DM {} still referenced during teardown",
                        shared.device()
                    );
                }
            }
        }
        result
    }

    /// Zero the selected channels through the update protocol.
    ///
    /// Counters are bumped, so running loops recombine on their next poll.
    /// Returns the number of channels reset.
    pub fn reset(&self, selector: ChannelSelector) -> ServerResult<usize> {
        if !self.is_configured() {
            return Err(ServerError::NotConfigured);
        }
        if let ChannelSelector::Channel(channel) = selector {
            if channel >= self.channel_count {
                return Err(ServerError::InvalidChannel {
                    channel,
                    channel_count: self.channel_count,
                });
            }
        }

        let mut count = 0;
        for set in &self.sets {
            for (index, writer) in set.channels().iter().enumerate() {
                let selected = match selector {
                    ChannelSelector::All => true,
                    ChannelSelector::Channel(channel) => channel == index,
                };
                if selected {
                    writer.zero()?;
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// True once `configure` has succeeded and no teardown followed.
    pub fn is_configured(&self) -> bool {
        self.channel_count > 0
    }

    /// Writable channels per DM (0 when unconfigured).
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Number of configured DMs.
    pub fn device_count(&self) -> usize {
        self.sets.len()
    }

    /// Channel sets in device order.
    pub fn sets(&self) -> &[Arc<DeviceChannelSet>] {
        &self.sets
    }

    /// Channel set of 1-based `device`.
    pub fn set(&self, device: usize) -> Option<&Arc<DeviceChannelSet>> {
        device.checked_sub(1).and_then(|index| self.sets.get(index))
    }

    /// Segment directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdm_shm::{ImageReader, SegmentDiscovery};

    fn names(dir: &Path) -> Vec<String> {
        SegmentDiscovery::new(dir)
            .list_segments()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect()
    }

    #[test]
    fn configure_creates_named_segments() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ChannelManager::new(dir.path());
        manager.configure(2, 3).unwrap();

        assert!(manager.is_configured());
        assert_eq!(manager.channel_count(), 3);
        assert_eq!(manager.device_count(), 2);
        assert_eq!(
            names(dir.path()),
            vec![
                "dm1", "dm1disp00", "dm1disp01", "dm1disp02", "dm2", "dm2disp00", "dm2disp01",
                "dm2disp02"
            ]
        );

        let set = manager.set(2).unwrap();
        assert_eq!(set.device(), 2);
        assert_eq!(set.combined().name(), "dm2");
        assert_eq!(set.combined().shape(), DM_SHAPE);
        assert!(manager.set(0).is_none());
        assert!(manager.set(3).is_none());
    }

    #[test]
    fn reconfigure_replaces_every_segment() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ChannelManager::new(dir.path());
        manager.configure(2, 4).unwrap();
        manager.configure(2, 2).unwrap();

        let listed = names(dir.path());
        assert_eq!(listed.len(), 2 * (2 + 1));
        assert!(!listed.iter().any(|n| n.ends_with("disp02") || n.ends_with("disp03")));
        assert!(ImageReader::attach(dir.path(), "dm1disp03").is_err());
        assert_eq!(manager.set(1).unwrap().channel_count(), 2);
    }

    #[test]
    fn failed_configure_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        // A foreign segment squatting on DM 2's name makes allocation fail.
        let _squatter = ImageWriter::create(dir.path(), "dm2disp01", DM_SHAPE).unwrap();

        let mut manager = ChannelManager::new(dir.path());
        manager.configure(1, 1).unwrap();
        let result = manager.configure(3, 2);

        assert!(result.is_err());
        assert!(!manager.is_configured());
        assert_eq!(manager.device_count(), 0);
        assert_eq!(names(dir.path()), vec!["dm2disp01"]);
    }

    #[test]
    fn invalid_channel_counts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ChannelManager::new(dir.path());
        assert!(matches!(
            manager.configure(1, 0),
            Err(ServerError::InvalidChannelCount(0))
        ));
        assert!(manager.configure(1, MAX_CHANNELS + 1).is_err());
    }

    #[test]
    fn teardown_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ChannelManager::new(dir.path());
        manager.configure(4, 4).unwrap();
        manager.teardown().unwrap();

        assert!(!manager.is_configured());
        assert!(names(dir.path()).is_empty());
    }

    #[test]
    fn reset_zeroes_and_bumps_counters() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ChannelManager::new(dir.path());
        manager.configure(2, 3).unwrap();

        let producer = ImageWriter::attach(dir.path(), "dm1disp01").unwrap();
        producer.publish(&[0.3; 144]).unwrap();

        assert_eq!(manager.reset(ChannelSelector::Channel(1)).unwrap(), 2);
        let set = manager.set(1).unwrap();
        assert_eq!(set.channel_counters(), vec![0, 2, 0]);

        let mut frame = vec![1.0; 144];
        set.channels()[1].read_into(&mut frame).unwrap();
        assert!(frame.iter().all(|&v| v == 0.0));

        assert_eq!(manager.reset(ChannelSelector::All).unwrap(), 6);
        assert_eq!(manager.set(2).unwrap().channel_counters(), vec![1, 2, 1]);
    }

    #[test]
    fn reset_validates_channel() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ChannelManager::new(dir.path());
        assert!(matches!(
            manager.reset(ChannelSelector::All),
            Err(ServerError::NotConfigured)
        ));

        manager.configure(1, 2).unwrap();
        assert!(matches!(
            manager.reset(ChannelSelector::Channel(2)),
            Err(ServerError::InvalidChannel { channel: 2, channel_count: 2 })
        ));
    }
}
