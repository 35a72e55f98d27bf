//! Shared utilities.

pub mod headers;

pub use headers::*;
