//! bigscan - BIG-IP inventory scanner
//!
//! Logs in to each BIG-IP in a device list, records inventory facts, and can
//! capture QKView diagnostics and UCS backups through the management API's
//! asynchronous task endpoints.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod render;
pub mod storage;
pub mod util;

pub use error::{ExitCode, Result, ScanError};
