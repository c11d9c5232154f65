//! # Multi-DM Shared Memory Image Segments
//!
//! Named, process-shared 2D `f64` images used as DM channels. Each segment
//! is a file in a segment directory (`/dev/shm` by default) holding a
//! two-cache-line header followed by the pixels in row-major order, plus a
//! small JSON metadata file used for discovery.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────────┐    ┌─────────────────┐
//! │   Producer      │    │  Image Segment       │    │   Reader        │
//! │                 │    │                      │    │                 │
//! │ ImageWriter     ├───►│ [Header | Pixels]    ├───►│ ImageReader     │
//! │                 │    │ write / seq / cnt0   │    │                 │
//! └─────────────────┘    │ cnt1 / sem (futex)   │    └─────────────────┘
//!                        └──────────────────────┘
//! ```
//!
//! ## Update Protocol
//!
//! A writer raises the `write` flag, moves the sequence lock to an odd
//! value, copies the frame, moves the sequence back to even, bumps `cnt0`,
//! bumps the `sem` signal word and wakes waiters, then lowers `write`.
//!
//! Readers either poll `cnt0` for cheap change detection, block on the
//! signal word with [`ImageReader::wait_for_update`], or take a consistent
//! snapshot with [`ImageReader::read`], which retries on torn frames.
//!
//! ## Usage
//!
//! ```rust
//! use mdm_shm::{ImageReader, ImageShape, ImageWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = std::env::temp_dir().join(format!("mdm_doc_{}", std::process::id()));
//! std::fs::create_dir_all(&dir)?;
//!
//! let writer = ImageWriter::create(&dir, "dm1disp00", ImageShape::square(2))?;
//! writer.publish(&[0.0, 0.5, 0.5, 0.0])?;
//!
//! let mut reader = ImageReader::attach(&dir, "dm1disp00")?;
//! assert_eq!(reader.read()?, &[0.0, 0.5, 0.5, 0.0]);
//!
//! writer.destroy()?;
//! # std::fs::remove_dir_all(&dir)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - **ImageWriter**: `Sync`; publishing from several threads or processes
//!   at once is allowed but may interleave
//! - **ImageReader**: one per thread, `read` needs `&mut self`

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod discovery;
pub mod error;
pub mod platform;
pub mod reader;
pub mod segment;
pub mod version;
pub mod writer;

pub use discovery::{SegmentDiscovery, SegmentInfo};
pub use error::{ShmError, ShmResult};
pub use reader::ImageReader;
pub use segment::{ImageHeader, ImageShape, SharedImage};
pub use version::VersionCounter;
pub use writer::ImageWriter;
