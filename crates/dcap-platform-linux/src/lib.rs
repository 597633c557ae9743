#![cfg(target_os = "linux")]

// Re-export platform traits from dcap-core
pub use dcap_core::platform::{DisplayManager, ScreenGrabber};

// Portal and streams
pub mod tuple;
pub mod portal;
pub mod stream;
#[cfg(feature = "pipewire")]
pub mod pipewire;
#[cfg(feature = "pipewire")]
pub mod xdg_portal;

// Wayland display services
pub mod display_manager;
pub mod screen_grabber;
pub mod settings_watcher;

// Cursor tracking
pub mod cursor_x11;

// System integration
pub mod desktop_env;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod proptests;

pub use cursor_x11::X11CursorSource;
pub use display_manager::WaylandDisplayManager;
pub use screen_grabber::WaylandScreenGrabber;
pub use settings_watcher::{DisplaySettingsChanged, WaylandDisplaySettingsWatcher};
