//! Shared memory subsystem constants.
//!
//! - `consts`: header magic, data type codes, cache line size, default
//!   segment directory and the segment naming scheme.

pub mod consts;
