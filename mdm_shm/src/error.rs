//! Error types for shared memory operations

use thiserror::Error;

/// Errors that can occur during shared memory operations
#[derive(Error, Debug)]
pub enum ShmError {
    /// Segment already exists
    #[error("Segment already exists: {name}")]
    AlreadyExists {
        /// Segment name
        name: String,
    },

    /// Segment not found
    #[error("Segment not found: {name}")]
    NotFound {
        /// Segment name
        name: String,
    },

    /// Segment header is not a valid image header
    #[error("Invalid segment header: {name}")]
    InvalidHeader {
        /// Segment name
        name: String,
    },

    /// Invalid image shape
    #[error("Invalid image shape {width}x{height}")]
    InvalidShape {
        /// Image width in pixels
        width: u32,
        /// Image height in pixels
        height: u32,
    },

    /// Data length does not match the image size
    #[error("Length mismatch: expected {expected} pixels, got {actual}")]
    LengthMismatch {
        /// Pixels in the image
        expected: usize,
        /// Pixels supplied
        actual: usize,
    },

    /// Version conflict detected during read
    #[error("Version conflict detected - retry recommended")]
    VersionConflict,

    /// Permission denied
    #[error("Permission denied accessing segment: {name}")]
    PermissionDenied {
        /// Segment name
        name: String,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        /// Source JSON error
        #[from]
        source: serde_json::Error,
    },
}

/// Result type for shared memory operations
pub type ShmResult<T> = Result<T, ShmError>;
