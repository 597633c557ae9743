#![cfg(windows)]

// Re-export platform traits from dcap-core
pub use dcap_core::platform::{DisplayManager, ScreenGrabber};

// GDI primitives
pub mod capture_gdi;
pub mod cursor_icon;

// Display services
pub mod monitor;
pub mod display_manager;
pub mod screen_grabber;
pub mod privacy;

// Cursor tracking
pub mod cursor;

#[cfg(test)]
mod proptests;

pub use cursor::WinCursorSource;
pub use display_manager::WinDisplayManager;
pub use screen_grabber::GdiScreenGrabber;
