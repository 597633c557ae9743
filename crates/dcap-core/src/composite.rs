//! Multi-display compositing into virtual-screen space.

use crate::bitmap::{Bitmap, BLACK};
use crate::display::DisplayInfo;
use crate::errors::CaptureError;
use crate::geometry::{Point, Rect};

/// Canvas covering the virtual screen, origin translated to (0, 0).
pub struct Compositor {
    canvas: Bitmap,
    origin: Point,
}

impl Compositor {
    /// Black canvas sized to `virtual_bounds`.
    pub fn new(virtual_bounds: Rect) -> Result<Self, CaptureError> {
        if virtual_bounds.is_empty() {
            return Err(CaptureError::InvalidArgument(format!(
                "virtual screen bounds have no area: {virtual_bounds:?}"
            )));
        }
        Ok(Self {
            canvas: Bitmap::filled(
                virtual_bounds.width as u32,
                virtual_bounds.height as u32,
                BLACK,
            ),
            origin: Point::new(virtual_bounds.x, virtual_bounds.y),
        })
    }

    /// Where `display` lands on the canvas.
    pub fn destination(&self, display: &DisplayInfo) -> Rect {
        display.monitor_area.offset(-self.origin.x, -self.origin.y)
    }

    /// Blit a display's frame at its `monitor_area`, scaled to that size.
    pub fn place(&mut self, display: &DisplayInfo, frame: &Bitmap) {
        let dest = self.destination(display);
        self.canvas.draw_scaled(frame, dest);
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    pub fn canvas_mut(&mut self) -> &mut Bitmap {
        &mut self.canvas
    }

    pub fn finish(self) -> Bitmap {
        self.canvas
    }
}
