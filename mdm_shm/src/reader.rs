//! Lock-free reader implementation

use crate::error::{ShmError, ShmResult};
use crate::platform::futex_wait;
use crate::segment::{ImageShape, SharedImage};
use crate::version::VersionCounter;
use std::path::Path;
use std::sync::atomic::{Ordering, fence};
use std::time::{Duration, Instant};

const MAX_READ_RETRIES: usize = 10;

/// Lock-free image reader with torn-frame detection
pub struct ImageReader {
    image: SharedImage,
    last_seen_counter: u64,
    read_buffer: Vec<f64>,
}

impl ImageReader {
    /// Attach to existing segment
    pub fn attach(dir: &Path, name: &str) -> ShmResult<Self> {
        let image = SharedImage::attach(dir, name)?;
        let last_seen_counter = image.header().counter();
        let read_buffer = vec![0.0; image.shape().pixels()];

        Ok(Self {
            image,
            last_seen_counter,
            read_buffer,
        })
    }

    /// Read a consistent frame.
    ///
    /// Retries while a writer holds the sequence lock or the sequence moved
    /// during the copy. Never blocks the writer.
    pub fn read(&mut self) -> ShmResult<&[f64]> {
        let header = self.image.header();

        for _attempt in 0..MAX_READ_RETRIES {
            let version_before = header.seq.load();
            if !VersionCounter::is_stable(version_before) {
                std::thread::yield_now();
                continue;
            }
            let counter = header.counter();

            fence(Ordering::Acquire);
            self.image.read_raw_into(&mut self.read_buffer)?;
            fence(Ordering::Acquire);

            if header.seq.load() == version_before {
                self.last_seen_counter = counter;
                return Ok(&self.read_buffer);
            }

            std::thread::yield_now();
        }

        Err(ShmError::VersionConflict)
    }

    /// Check if a new frame was published since the last read
    pub fn has_changed(&self) -> bool {
        self.image.header().counter() > self.last_seen_counter
    }

    /// Block until a new frame is published or `timeout` elapses.
    ///
    /// Returns `true` if a frame newer than the last read is available.
    pub fn wait_for_update(&self, timeout: Duration) -> bool {
        let header = self.image.header();
        let deadline = Instant::now() + timeout;

        loop {
            // Sample the signal word before the counter so a post between
            // the two makes futex_wait return immediately.
            let signal = header.sem.load(Ordering::Acquire);
            if self.has_changed() {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            futex_wait(&header.sem, signal, Some(deadline - now));
        }
    }

    /// Update counter of the last consistent read
    pub fn version(&self) -> u64 {
        self.last_seen_counter
    }

    /// Current update counter of the segment
    pub fn counter(&self) -> u64 {
        self.image.header().counter()
    }

    /// True while a writer holds the write flag
    pub fn is_writing(&self) -> bool {
        self.image.header().is_writing()
    }

    /// Segment name
    pub fn name(&self) -> &str {
        self.image.name()
    }

    /// Image shape
    pub fn shape(&self) -> ImageShape {
        self.image.shape()
    }
}
