//! Shared memory image segment structures and operations

use crate::error::{ShmError, ShmResult};
use crate::platform::{LinuxMemoryConfig, attach_segment_mmap, create_segment_mmap};
use crate::version::VersionCounter;
use mdm::shm::consts::{DATATYPE_F64, IMAGE_HEADER_SIZE, MDM_IMAGE_MAGIC, SEGMENT_SUFFIX};
use memmap2::MmapMut;
use static_assertions::const_assert_eq;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};
use std::time::{SystemTime, UNIX_EPOCH};

/// Image segment header, two cache lines.
///
/// ## Update Protocol
///
/// - `write` is 1 while a writer is updating the pixels (advisory flag)
/// - `seq` is odd while pixels are being copied (sequence lock)
/// - `cnt0` is bumped once per completed update
/// - `sem` is bumped after `cnt0` and waiters are woken on it
#[repr(C, align(64))]
pub struct ImageHeader {
    /// Magic bytes: must be `MDM_IMAGE_MAGIC`
    pub magic: [u8; 8],
    /// Layout hash of this header, reader refuses mismatches
    pub layout_hash: u32,
    /// Pixel data type code
    pub datatype: u32,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Process that created the segment
    pub creator_pid: u32,
    _reserved: u32,
    /// Creation timestamp (ns since UNIX epoch)
    pub created_ns: u64,
    /// Write-in-progress flag
    pub write: AtomicU32,
    /// Update signal word (futex)
    pub sem: AtomicU32,
    /// Completed update counter
    pub cnt0: AtomicU64,
    /// Secondary counter, reset to 0 on every full-frame update
    pub cnt1: AtomicU64,
    /// Sequence lock guarding the pixel copy
    pub seq: VersionCounter,
    /// Last write timestamp (ns since UNIX epoch)
    pub last_write_ns: AtomicU64,
    _padding: [u8; 48],
}

const_assert_eq!(core::mem::size_of::<ImageHeader>(), IMAGE_HEADER_SIZE);
const_assert_eq!(core::mem::align_of::<ImageHeader>(), 64);

/// Layout hash computed from the header size and alignment.
pub const fn layout_hash() -> u32 {
    let size = core::mem::size_of::<ImageHeader>() as u32;
    let align = core::mem::align_of::<ImageHeader>() as u32;
    size.wrapping_mul(0x9E3779B9) ^ align.wrapping_mul(0x517CC1B7)
}

/// Current time in nanoseconds since the UNIX epoch
pub(crate) fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

impl ImageHeader {
    /// Create new header for an `f64` image
    pub fn new(shape: ImageShape, creator_pid: u32) -> Self {
        let now = now_ns();
        Self {
            magic: MDM_IMAGE_MAGIC,
            layout_hash: layout_hash(),
            datatype: DATATYPE_F64,
            width: shape.width,
            height: shape.height,
            creator_pid,
            _reserved: 0,
            created_ns: now,
            write: AtomicU32::new(0),
            sem: AtomicU32::new(0),
            cnt0: AtomicU64::new(0),
            cnt1: AtomicU64::new(0),
            seq: VersionCounter::new(),
            last_write_ns: AtomicU64::new(now),
            _padding: [0; 48],
        }
    }

    /// Validate header magic, layout and data type
    pub fn validate(&self, name: &str) -> ShmResult<()> {
        if self.magic != MDM_IMAGE_MAGIC
            || self.layout_hash != layout_hash()
            || self.datatype != DATATYPE_F64
        {
            return Err(ShmError::InvalidHeader {
                name: name.to_string(),
            });
        }
        self.shape().validate()
    }

    /// Image shape recorded in the header
    pub fn shape(&self) -> ImageShape {
        ImageShape {
            width: self.width,
            height: self.height,
        }
    }

    /// Completed update counter
    pub fn counter(&self) -> u64 {
        self.cnt0.load(Ordering::Acquire)
    }

    /// True while a writer holds the write flag
    pub fn is_writing(&self) -> bool {
        self.write.load(Ordering::Acquire) != 0
    }
}

/// 2D image dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageShape {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ImageShape {
    /// Square image of `side` x `side` pixels
    pub const fn square(side: u32) -> Self {
        Self {
            width: side,
            height: side,
        }
    }

    /// Number of pixels
    pub const fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of the pixel section in bytes
    pub const fn data_bytes(&self) -> usize {
        self.pixels() * std::mem::size_of::<f64>()
    }

    /// Reject empty images
    pub fn validate(&self) -> ShmResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ShmError::InvalidShape {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// Path of the data file of segment `name` in `dir`
pub fn segment_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{SEGMENT_SUFFIX}"))
}

/// Memory-mapped image segment
///
/// Pixels are only accessed through raw pointer copies: other processes
/// may write them at any time, so no Rust reference to the pixel section
/// is ever handed out.
pub struct SharedImage {
    name: String,
    path: PathBuf,
    shape: ImageShape,
    base: *mut u8,
    _mmap: MmapMut,
}

// The mapping is process-shared memory. All mutation goes through atomics
// in the header or raw pointer copies bracketed by the sequence lock.
unsafe impl Send for SharedImage {}
unsafe impl Sync for SharedImage {}

impl SharedImage {
    /// Create a new zero-filled segment
    pub fn create(dir: &Path, name: &str, shape: ImageShape, creator_pid: u32) -> ShmResult<Self> {
        shape.validate()?;
        let path = segment_path(dir, name);
        let total_size = IMAGE_HEADER_SIZE + shape.data_bytes();

        let config = LinuxMemoryConfig::default();
        let mut mmap = create_segment_mmap(&path, total_size, &config)
            .map_err(|e| map_io_error(e, name))?;

        let base = mmap.as_mut_ptr();
        unsafe {
            std::ptr::write(base as *mut ImageHeader, ImageHeader::new(shape, creator_pid));
        }

        // Header must be visible before anyone can attach
        fence(Ordering::Release);

        Ok(Self {
            name: name.to_string(),
            path,
            shape,
            base,
            _mmap: mmap,
        })
    }

    /// Attach to an existing segment
    pub fn attach(dir: &Path, name: &str) -> ShmResult<Self> {
        let path = segment_path(dir, name);
        let mut mmap = attach_segment_mmap(&path).map_err(|e| map_io_error(e, name))?;

        if mmap.len() < IMAGE_HEADER_SIZE {
            return Err(ShmError::InvalidHeader {
                name: name.to_string(),
            });
        }

        let base = mmap.as_mut_ptr();
        let header = unsafe { &*(base as *const ImageHeader) };
        header.validate(name)?;

        let shape = header.shape();
        if mmap.len() < IMAGE_HEADER_SIZE + shape.data_bytes() {
            return Err(ShmError::InvalidHeader {
                name: name.to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            path,
            shape,
            base,
            _mmap: mmap,
        })
    }

    /// Segment header
    pub fn header(&self) -> &ImageHeader {
        unsafe { &*(self.base as *const ImageHeader) }
    }

    /// Pointer to the first pixel
    pub(crate) fn data_ptr(&self) -> *mut f64 {
        unsafe { self.base.add(IMAGE_HEADER_SIZE) as *mut f64 }
    }

    /// Copy the pixels without synchronization.
    ///
    /// A concurrent writer may produce a torn copy; callers that need a
    /// consistent frame use `ImageReader::read`.
    pub fn read_raw_into(&self, out: &mut [f64]) -> ShmResult<()> {
        self.check_len(out.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(self.data_ptr(), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    /// Copy `data` into the pixels without any protocol
    pub(crate) fn write_raw(&self, data: &[f64]) -> ShmResult<()> {
        self.check_len(data.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.data_ptr(), data.len());
        }
        Ok(())
    }

    pub(crate) fn check_len(&self, len: usize) -> ShmResult<()> {
        if len != self.shape.pixels() {
            return Err(ShmError::LengthMismatch {
                expected: self.shape.pixels(),
                actual: len,
            });
        }
        Ok(())
    }

    /// Segment name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Image shape
    pub fn shape(&self) -> ImageShape {
        self.shape
    }
}

fn map_io_error(e: std::io::Error, name: &str) -> ShmError {
    match e.kind() {
        std::io::ErrorKind::AlreadyExists => ShmError::AlreadyExists {
            name: name.to_string(),
        },
        std::io::ErrorKind::NotFound => ShmError::NotFound {
            name: name.to_string(),
        },
        std::io::ErrorKind::PermissionDenied => ShmError::PermissionDenied {
            name: name.to_string(),
        },
        _ => ShmError::Io { source: e },
    }
}
