//! Compactor integration test support
//!
//! Shared fixtures for driving the whole pipeline against a temporary
//! directory with an in-memory compression backend.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Unified test utilities
pub mod test_utils;
