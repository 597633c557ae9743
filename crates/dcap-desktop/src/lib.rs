//! dcap-desktop - Session process that drives screen capture and cursor tracking
//!
//! Selects the platform backend, runs the capture loop at the configured rate
//! and reports cursor shape changes.

pub mod backend;
pub mod config;
pub mod logging;
pub mod session;
