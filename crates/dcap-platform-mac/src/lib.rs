#![cfg(target_os = "macos")]

// Re-export platform traits from dcap-core
pub use dcap_core::platform::{DisplayManager, ScreenGrabber};

// CoreGraphics and AppKit bindings
pub mod cg;
pub mod ns_cursor;

// Display services
pub mod monitor;
pub mod display_manager;
pub mod screen_grabber;

// Cursor tracking
pub mod cursor;

#[cfg(test)]
mod proptests;

pub use cursor::MacCursorSource;
pub use display_manager::MacDisplayManager;
pub use screen_grabber::MacScreenGrabber;
