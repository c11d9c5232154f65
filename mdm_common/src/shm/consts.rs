//! SHM (Shared Memory) constants and segment naming.
//!
//! These constants define the image segment format shared between the DM
//! server and any external process that reads or writes DM channels.

/// Magic bytes identifying a valid image segment: `"MDM_IMG\0"`.
pub const MDM_IMAGE_MAGIC: [u8; 8] = *b"MDM_IMG\0";

/// Data type code for `f64` pixels (the only type the server creates).
pub const DATATYPE_F64: u32 = 1;

/// CPU cache line size in bytes.
///
/// The segment header is aligned to this to prevent false sharing.
pub const CACHE_LINE_SIZE: usize = 64;

/// Size in bytes of the image segment header. Pixel data starts right after it.
pub const IMAGE_HEADER_SIZE: usize = 128;

/// Default directory holding image segments.
pub const DEFAULT_SHM_DIR: &str = "/dev/shm";

/// File suffix of an image segment data file.
pub const SEGMENT_SUFFIX: &str = ".im.shm";

/// File suffix of an image segment discovery metadata file.
pub const META_SUFFIX: &str = ".im.meta";

/// Name of writable channel `channel` of device `device` (1-based device).
///
/// ```rust
/// use mdm_common::shm::consts::channel_segment_name;
/// assert_eq!(channel_segment_name(1, 3), "dm1disp03");
/// ```
pub fn channel_segment_name(device: usize, channel: usize) -> String {
    format!("dm{device}disp{channel:02}")
}

/// Name of the combined output of device `device` (1-based device).
pub fn combined_segment_name(device: usize) -> String {
    format!("dm{device}")
}
