//! Display enumeration and screen capture traits implemented per platform.

use async_trait::async_trait;

use crate::capture::CaptureResult;
use crate::display::{self, DisplayInfo};
use crate::errors::CaptureError;
use crate::geometry::{percentage_to_absolute, Point, Rect};
use crate::shutdown::Shutdown;

/// Which rectangle remote input coordinates are expressed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSpace {
    /// `logical_monitor_area`: compositor / global point space.
    Logical,
    /// `monitor_area`: native virtual-desktop pixels.
    Physical,
}

/// Source of truth for which displays exist and where they are.
#[async_trait]
pub trait DisplayManager: Send + Sync {
    /// Ordered snapshot, loading it on first use.
    async fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError>;

    /// Re-enumerate, replacing the whole snapshot.
    async fn reload_displays(&self) -> Result<(), CaptureError>;

    fn input_coordinate_space(&self) -> CoordinateSpace;

    async fn primary_display(&self) -> Result<Option<DisplayInfo>, CaptureError> {
        let displays = self.displays().await?;
        Ok(display::primary_display(&displays).cloned())
    }

    /// Physical bounding box of every display. Empty when there are none.
    async fn virtual_screen_bounds(&self) -> Result<Rect, CaptureError> {
        let displays = self.displays().await?;
        Ok(display::virtual_screen_bounds(&displays).unwrap_or_default())
    }

    async fn find_display(&self, device_name: &str) -> Result<DisplayInfo, CaptureError> {
        let displays = self.displays().await?;
        display::find_display(&displays, device_name)
            .cloned()
            .ok_or_else(|| CaptureError::DisplayNotFound(device_name.to_string()))
    }

    /// Map a 0..1 position on a display to absolute input coordinates.
    async fn convert_percentage_location_to_absolute(
        &self,
        device_name: &str,
        percent_x: f64,
        percent_y: f64,
    ) -> Result<Point, CaptureError> {
        let display = self.find_display(device_name).await?;
        let bounds = match self.input_coordinate_space() {
            CoordinateSpace::Logical => display.logical_monitor_area,
            CoordinateSpace::Physical => display.monitor_area,
        };
        Ok(percentage_to_absolute(bounds, percent_x, percent_y))
    }

    /// Hide the local screen while the remote viewer keeps seeing it.
    async fn set_privacy_screen(&self, _enabled: bool) -> Result<(), CaptureError> {
        Err(CaptureError::PlatformNotSupported(
            "privacy screen is only supported on Windows".to_string(),
        ))
    }
}

/// Produces bitmaps of one display or of the whole virtual screen.
#[async_trait]
pub trait ScreenGrabber: Send + Sync {
    /// Open capture sources. Idempotent; concurrent calls start sources once.
    async fn initialize(&self, shutdown: &Shutdown) -> Result<(), CaptureError>;

    async fn capture_display(
        &self,
        target: &DisplayInfo,
        capture_cursor: bool,
        force_key_frame: bool,
    ) -> CaptureResult;

    async fn capture_all_displays(&self, capture_cursor: bool) -> CaptureResult;

    /// Release capture sources. Safe to call more than once.
    async fn dispose(&self);
}
