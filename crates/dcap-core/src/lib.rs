//! dcap-core - Display geometry and capture primitives shared by every platform backend.
//!
//! This crate implements:
//! - The `DisplayInfo` snapshot model and logical/physical coordinate math
//! - Pooled frame buffers and the latest-frame slot used by capture threads
//! - BGRA bitmaps and multi-display compositing
//! - The `DisplayManager` / `ScreenGrabber` capability traits
//! - The cursor watcher state machine
//! - Bounded locks, shutdown signalling and timing configuration

#![forbid(unsafe_code)]

// Model
pub mod geometry;
pub mod display;

// Frames and images
pub mod buffers;
pub mod frame;
pub mod bitmap;
pub mod composite;
pub mod capture;

// Services
pub mod platform;
pub mod cursor;

// Infrastructure
pub mod errors;
pub mod lock;
pub mod shutdown;
pub mod config;

#[cfg(test)]
mod proptests;

pub use capture::{CaptureMode, CaptureResult};
pub use display::DisplayInfo;
pub use errors::CaptureError;
pub use geometry::{Point, Rect, Size};
pub use platform::{CoordinateSpace, DisplayManager, ScreenGrabber};
pub use shutdown::{Shutdown, ShutdownHandle};
