//! Platform-specific memory mapping, process and wake-up primitives

pub mod linux;

pub use linux::*;
