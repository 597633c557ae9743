use core_graphics::display::{CGDirectDisplayID, CGDisplay};
use core_graphics::geometry::CGRect;
use dcap_core::display::normalize_displays;
use dcap_core::geometry::backing_scale;
use dcap_core::{DisplayInfo, Rect, Size};
use tracing::{debug, warn};

use crate::cg;

/// Build a display from its point bounds and backing pixel size.
///
/// The scale is the larger of the horizontal and vertical ratios. The origin
/// is the point origin multiplied by that scale and truncated.
pub fn display_from_bounds(
    id: CGDirectDisplayID,
    index: usize,
    bounds: CGRect,
    pixel_size: Size,
    is_main: bool,
) -> DisplayInfo {
    let logical = Rect::new(
        bounds.origin.x as i32,
        bounds.origin.y as i32,
        bounds.size.width as i32,
        bounds.size.height as i32,
    );
    let physical = if pixel_size.is_positive() {
        pixel_size
    } else {
        logical.size()
    };
    let scale = backing_scale(logical.size(), physical);
    let monitor_area = Rect::new(
        (bounds.origin.x * scale) as i32,
        (bounds.origin.y * scale) as i32,
        physical.width,
        physical.height,
    );
    DisplayInfo {
        device_name: id.to_string(),
        display_name: format!("Display {}", index + 1),
        index,
        is_primary: is_main,
        logical_monitor_area: logical,
        monitor_area,
        scale_factor: scale,
        work_area: monitor_area,
    }
}

/// Pixel size of a display, measured from a captured image.
fn probe_pixel_size(id: CGDirectDisplayID) -> Size {
    match cg::display_image(id) {
        Ok(image) => Size::new(image.width() as i32, image.height() as i32),
        Err(err) => {
            debug!(display = id, error = %err, "pixel size probe failed");
            Size::default()
        }
    }
}

/// Enumerate online displays. Falls back to the main display alone when the
/// list is unavailable.
pub fn enumerate_displays() -> Vec<DisplayInfo> {
    let mut ids = cg::online_display_ids();
    if ids.is_empty() {
        warn!("no online displays reported; using main display");
        ids.push(CGDisplay::main().id);
    }

    let displays = ids
        .iter()
        .enumerate()
        .map(|(index, &id)| {
            let display = CGDisplay::new(id);
            display_from_bounds(id, index, display.bounds(), probe_pixel_size(id), display.is_main())
        })
        .collect();
    normalize_displays(displays)
}
