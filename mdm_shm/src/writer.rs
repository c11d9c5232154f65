//! Image writer implementing the update protocol

use crate::discovery::{SegmentInfo, meta_path};
use crate::error::{ShmError, ShmResult};
use crate::platform::{futex_wake_all, get_current_pid, unlink_segment};
use crate::segment::{ImageShape, SharedImage, now_ns};
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{Ordering, fence};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Writer handle on an image segment
///
/// A writer obtained with [`ImageWriter::create`] owns the segment and
/// removes it from the namespace when destroyed or dropped. A writer
/// obtained with [`ImageWriter::attach`] is a non-owning producer handle.
///
/// Publishing is not serialized between writers: two producers updating
/// the same segment at once may interleave, readers then see a torn frame
/// flagged by the sequence lock.
pub struct ImageWriter {
    image: SharedImage,
    meta_path: PathBuf,
    owner: bool,
}

impl ImageWriter {
    /// Create a new segment with exclusive ownership
    pub fn create(dir: &Path, name: &str, shape: ImageShape) -> ShmResult<Self> {
        let creator_pid = get_current_pid();
        let image = SharedImage::create(dir, name, shape, creator_pid)?;
        let meta_path = meta_path(dir, name);

        let info = SegmentInfo {
            name: name.to_string(),
            width: shape.width,
            height: shape.height,
            creator_pid,
            created_at: SystemTime::now(),
        };
        if let Err(e) = Self::create_metadata_file(&meta_path, &info) {
            let _ = unlink_segment(image.path());
            return Err(e);
        }

        debug!("Created image segment {} ({}x{})", name, shape.width, shape.height);

        Ok(Self {
            image,
            meta_path,
            owner: true,
        })
    }

    /// Attach to an existing segment as a producer
    pub fn attach(dir: &Path, name: &str) -> ShmResult<Self> {
        let image = SharedImage::attach(dir, name)?;
        Ok(Self {
            image,
            meta_path: meta_path(dir, name),
            owner: false,
        })
    }

    /// Publish a full frame and return the new update counter.
    ///
    /// Raise `write` → odd `seq` → copy → even `seq` → bump `cnt0`,
    /// reset `cnt1` → bump `sem` and wake waiters → lower `write`.
    pub fn publish(&self, data: &[f64]) -> ShmResult<u64> {
        self.image.check_len(data.len())?;
        let header = self.image.header();

        header.write.store(1, Ordering::Release);
        header.seq.begin_write();
        fence(Ordering::Release);

        self.image.write_raw(data)?;

        fence(Ordering::Release);
        header.seq.end_write();

        header.last_write_ns.store(now_ns(), Ordering::Release);
        let counter = header.cnt0.fetch_add(1, Ordering::AcqRel) + 1;
        header.cnt1.store(0, Ordering::Release);

        header.sem.fetch_add(1, Ordering::AcqRel);
        futex_wake_all(&header.sem);

        header.write.store(0, Ordering::Release);
        Ok(counter)
    }

    /// Publish an all-zero frame
    pub fn zero(&self) -> ShmResult<u64> {
        let zeros = vec![0.0; self.image.shape().pixels()];
        self.publish(&zeros)
    }

    /// Copy the current pixels without synchronization
    pub fn read_into(&self, out: &mut [f64]) -> ShmResult<()> {
        self.image.read_raw_into(out)
    }

    /// Completed update counter
    pub fn counter(&self) -> u64 {
        self.image.header().counter()
    }

    /// Underlying segment
    pub fn image(&self) -> &SharedImage {
        &self.image
    }

    /// Segment name
    pub fn name(&self) -> &str {
        self.image.name()
    }

    /// Image shape
    pub fn shape(&self) -> ImageShape {
        self.image.shape()
    }

    /// True if this handle created the segment
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Remove the segment from the namespace.
    ///
    /// Processes still mapping it keep a valid but orphaned mapping; new
    /// attaches fail with `NotFound`. A no-op for non-owning handles.
    pub fn destroy(mut self) -> ShmResult<()> {
        let result = self.unlink();
        self.owner = false;
        result
    }

    fn unlink(&self) -> ShmResult<()> {
        if !self.owner {
            return Ok(());
        }
        debug!("Destroying image segment {}", self.image.name());
        unlink_segment(self.image.path())?;
        unlink_segment(&self.meta_path)
    }

    /// Create JSON metadata file for discovery
    fn create_metadata_file(path: &Path, info: &SegmentInfo) -> ShmResult<()> {
        let metadata_json = serde_json::to_string_pretty(info)?;

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .mode(0o644)
            .open(path)
            .map_err(|e| ShmError::Io { source: e })?;

        std::io::Write::write_all(&mut file, metadata_json.as_bytes())?;
        Ok(())
    }
}

impl Drop for ImageWriter {
    fn drop(&mut self) {
        if let Err(e) = self.unlink() {
            warn!("Failed to remove segment {}: {}", self.image.name(), e);
        }
    }
}
