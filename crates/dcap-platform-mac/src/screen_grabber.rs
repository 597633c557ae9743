use std::sync::Arc;

use async_trait::async_trait;
use dcap_core::bitmap::Bitmap;
use dcap_core::composite::Compositor;
use dcap_core::display::locate_pointer;
use dcap_core::{
    CaptureError, CaptureMode, CaptureResult, DisplayInfo, DisplayManager, Point, Rect,
    ScreenGrabber, Shutdown,
};
use tracing::{debug, warn};

use crate::display_manager::{scale_for_device, MacDisplayManager};
use crate::{cg, ns_cursor};

const MODE: CaptureMode = CaptureMode::CoreGraphics;

/// Where the cursor image's top-left lands inside a capture of `area`.
pub fn cursor_draw_origin(pointer: Point, area: Rect, hotspot_px: (i32, i32)) -> Point {
    Point::new(
        pointer.x - area.x - hotspot_px.0,
        pointer.y - area.y - hotspot_px.1,
    )
}

fn capture_bitmap(display: &DisplayInfo) -> Result<Bitmap, CaptureError> {
    let id: u32 = display.device_name.parse().map_err(|_| {
        CaptureError::InvalidArgument(format!("not a display id: {}", display.device_name))
    })?;
    let image = cg::display_image(id)?;
    cg::display_image_to_bitmap(&image)
}

/// Overlay the system cursor onto `bitmap`, which covers `area` in physical
/// pixels.
fn draw_cursor(bitmap: &mut Bitmap, area: Rect, displays: &[DisplayInfo]) {
    if !cg::cursor_visible() {
        return;
    }
    let Some(location) = cg::cursor_location() else {
        return;
    };
    let scale = cg::display_at_point(location)
        .map(|id| scale_for_device(displays, &id.to_string()))
        .unwrap_or(1.0);
    let Some(pointer) = locate_pointer(location.x, location.y, scale, displays) else {
        debug!(x = location.x, y = location.y, "pointer is off every display");
        return;
    };
    let Some(cursor) = ns_cursor::current_cursor() else {
        return;
    };
    let origin = cursor_draw_origin(pointer, area, cursor.hotspot_pixels());
    bitmap.draw_over(&cursor.bitmap, origin.x, origin.y);
}

fn capture_single(display: &DisplayInfo, displays: &[DisplayInfo], capture_cursor: bool) -> CaptureResult {
    match capture_bitmap(display) {
        Ok(mut bitmap) => {
            if capture_cursor {
                let area = Rect::new(
                    display.monitor_area.x,
                    display.monitor_area.y,
                    bitmap.width() as i32,
                    bitmap.height() as i32,
                );
                draw_cursor(&mut bitmap, area, displays);
            }
            CaptureResult::ok(bitmap, MODE)
        }
        Err(err) => {
            warn!(device_name = %display.device_name, error = %err, "display capture failed");
            CaptureResult::fail(err)
        }
    }
}

fn capture_composite(bounds: Rect, displays: &[DisplayInfo], capture_cursor: bool) -> CaptureResult {
    let mut compositor = match Compositor::new(bounds) {
        Ok(compositor) => compositor,
        Err(err) => return CaptureResult::fail(err),
    };
    for display in displays {
        match capture_bitmap(display) {
            Ok(bitmap) => compositor.place(display, &bitmap),
            Err(err) => {
                warn!(device_name = %display.device_name, error = %err, "skipping display");
            }
        }
    }
    if capture_cursor {
        draw_cursor(compositor.canvas_mut(), bounds, displays);
    }
    CaptureResult::ok(compositor.finish(), MODE)
}

/// `CGDisplayCreateImage` capture. Needs no initialization.
pub struct MacScreenGrabber {
    displays: Arc<MacDisplayManager>,
}

impl MacScreenGrabber {
    pub fn new(displays: Arc<MacDisplayManager>) -> Self {
        Self { displays }
    }
}

#[async_trait]
impl ScreenGrabber for MacScreenGrabber {
    async fn initialize(&self, _shutdown: &Shutdown) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn capture_display(
        &self,
        target: &DisplayInfo,
        capture_cursor: bool,
        _force_key_frame: bool,
    ) -> CaptureResult {
        let displays = match self.displays.displays().await {
            Ok(displays) => displays,
            Err(err) => return CaptureResult::fail(err),
        };
        let target = target.clone();
        tokio::task::spawn_blocking(move || capture_single(&target, &displays, capture_cursor))
            .await
            .unwrap_or_else(|e| CaptureResult::fail(CaptureError::native(format!("capture task: {e}"))))
    }

    async fn capture_all_displays(&self, capture_cursor: bool) -> CaptureResult {
        let displays = match self.displays.displays().await {
            Ok(displays) => displays,
            Err(err) => return CaptureResult::fail(err),
        };
        let bounds = dcap_core::display::virtual_screen_bounds(&displays).unwrap_or_default();
        if displays.is_empty() || bounds.is_empty() {
            return CaptureResult::fail(CaptureError::native("No displays found."));
        }
        tokio::task::spawn_blocking(move || {
            if displays.len() == 1 {
                capture_single(&displays[0], &displays, capture_cursor)
            } else {
                capture_composite(bounds, &displays, capture_cursor)
            }
        })
        .await
        .unwrap_or_else(|e| CaptureResult::fail(CaptureError::native(format!("capture task: {e}"))))
    }

    async fn dispose(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_origin_is_relative_to_capture_area() {
        let origin = cursor_draw_origin(Point::new(3000, 100), Rect::new(2880, 0, 2880, 1800), (8, 10));
        assert_eq!(origin, Point::new(112, 90));
        let origin = cursor_draw_origin(Point::new(5, 5), Rect::new(-1920, 0, 4800, 1800), (0, 0));
        assert_eq!(origin, Point::new(1925, 5));
    }

    #[test]
    fn non_numeric_device_name_is_rejected() {
        let display = DisplayInfo::unscaled("abc", 0, Rect::new(0, 0, 10, 10));
        assert!(matches!(capture_bitmap(&display), Err(CaptureError::InvalidArgument(_))));
    }
}
