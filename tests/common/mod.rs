//! Shared helpers for integration tests.
//!
//! - `fixtures`: a wiremock BIG-IP and factories for scan types
//! - `logger`: structured per-test logging
//! - `log_capture`: assertions on what the crate logged

pub mod fixtures;
pub mod log_capture;
pub mod logger;
