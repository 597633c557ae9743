#![allow(unsafe_code)] // Windows API calls require unsafe.

use async_trait::async_trait;
use dcap_core::cursor::{CursorImage, CursorSource};
use dcap_core::CaptureError;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::cursor_icon;

/// Cursor source keyed by the `HCURSOR` handle from `GetCursorInfo`.
///
/// A hidden cursor reports key 0 and no image.
#[derive(Default)]
pub struct WinCursorSource {
    current: Option<isize>,
}

impl WinCursorSource {
    pub fn new() -> Self {
        Self::default()
    }
}

fn visible_cursor() -> Result<Option<HCURSOR>, CaptureError> {
    let mut info = CURSORINFO {
        cbSize: std::mem::size_of::<CURSORINFO>() as u32,
        ..Default::default()
    };
    unsafe { GetCursorInfo(&mut info) }.map_err(|e| CaptureError::native(format!("GetCursorInfo: {e}")))?;
    if info.flags != CURSOR_SHOWING || info.hCursor.is_invalid() {
        return Ok(None);
    }
    Ok(Some(info.hCursor))
}

#[async_trait]
impl CursorSource for WinCursorSource {
    type Key = isize;

    async fn current_key(&mut self) -> Result<Option<isize>, CaptureError> {
        let key = visible_cursor()?.map(|h| h.0 as isize).unwrap_or(0);
        self.current = Some(key);
        Ok(Some(key))
    }

    async fn current_image(&mut self) -> Result<Option<CursorImage>, CaptureError> {
        if matches!(self.current, None | Some(0)) {
            return Ok(None);
        }
        // Re-read rather than rebuild the handle from the stored key.
        let Some(cursor) = visible_cursor()? else {
            return Ok(None);
        };
        Ok(cursor_icon::icon_image(cursor).map(|icon| CursorImage {
            bitmap: icon.bitmap,
            hotspot_x: f64::from(icon.hotspot_x),
            hotspot_y: f64::from(icon.hotspot_y),
            scale_factor: 1.0,
        }))
    }
}
