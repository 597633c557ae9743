use std::sync::Arc;

use async_trait::async_trait;
use dcap_core::cursor::{CursorImage, CursorSource};
use dcap_core::CaptureError;

use crate::display_manager::MacDisplayManager;
use crate::ns_cursor;

/// `NSCursor.currentCursor`, keyed by object identity.
///
/// Images are reported at backing resolution together with the scale of the
/// display under the pointer; the watcher brings them down to points.
pub struct MacCursorSource {
    displays: Arc<MacDisplayManager>,
}

impl MacCursorSource {
    pub fn new(displays: Arc<MacDisplayManager>) -> Self {
        Self { displays }
    }
}

#[async_trait]
impl CursorSource for MacCursorSource {
    type Key = usize;

    async fn current_key(&mut self) -> Result<Option<usize>, CaptureError> {
        Ok(ns_cursor::current_cursor_id())
    }

    async fn current_image(&mut self) -> Result<Option<CursorImage>, CaptureError> {
        let Some(cursor) = ns_cursor::current_cursor() else {
            return Ok(None);
        };
        let scale_factor = self.displays.scale_under_pointer().await;
        Ok(Some(CursorImage {
            bitmap: cursor.bitmap,
            hotspot_x: cursor.hotspot.x,
            hotspot_y: cursor.hotspot.y,
            scale_factor,
        }))
    }
}
