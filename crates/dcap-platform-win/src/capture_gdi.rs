#![allow(unsafe_code)] // Windows API calls require unsafe.

use dcap_core::bitmap::Bitmap;
use dcap_core::{CaptureError, Rect};
use thiserror::Error;
use tracing::debug;
use windows::Win32::{Graphics::Gdi::*, UI::WindowsAndMessaging::*};

#[derive(Debug, Error)]
pub enum GdiError {
    #[error("win32 error: {0}")]
    Win32(&'static str),
    #[error("capture area has no pixels: {0:?}")]
    Size(Rect),
    #[error("resource creation failed: {0}")]
    ResourceCreation(&'static str),
}

impl From<GdiError> for CaptureError {
    fn from(err: GdiError) -> Self {
        match err {
            GdiError::Size(rect) => CaptureError::InvalidArgument(format!("capture area {rect:?}")),
            other => CaptureError::NativeCallFailure(other.to_string()),
        }
    }
}

/// Force the alpha channel opaque; GDI leaves it undefined.
pub fn make_opaque(bgra: &mut [u8]) {
    for px in bgra.chunks_exact_mut(4) {
        px[3] = 255;
    }
}

/// BitBlt capture of arbitrary virtual-desktop rectangles.
///
/// The memory bitmap is kept between calls and recreated when the requested
/// size changes.
pub struct GdiCapturer {
    screen_dc: HDC,
    memory_dc: HDC,
    bitmap: HBITMAP,
    width: i32,
    height: i32,
    buffer: Vec<u8>,
}

// GDI handles are process-wide; callers serialize access through a mutex.
unsafe impl Send for GdiCapturer {}

impl GdiCapturer {
    pub fn new() -> Result<Self, GdiError> {
        unsafe {
            let screen_dc = GetDC(None);
            if screen_dc.is_invalid() {
                return Err(GdiError::Win32("GetDC"));
            }

            let memory_dc = CreateCompatibleDC(Some(screen_dc));
            if memory_dc.is_invalid() {
                let _ = ReleaseDC(None, screen_dc);
                return Err(GdiError::ResourceCreation("CreateCompatibleDC"));
            }

            Ok(Self {
                screen_dc,
                memory_dc,
                bitmap: HBITMAP::default(),
                width: 0,
                height: 0,
                buffer: Vec::new(),
            })
        }
    }

    fn ensure_size(&mut self, width: i32, height: i32) -> Result<(), GdiError> {
        if width == self.width && height == self.height && !self.bitmap.is_invalid() {
            return Ok(());
        }
        unsafe {
            if !self.bitmap.is_invalid() {
                let _ = DeleteObject(self.bitmap.into());
            }
            self.bitmap = CreateCompatibleBitmap(self.screen_dc, width, height);
            if self.bitmap.is_invalid() {
                self.width = 0;
                self.height = 0;
                return Err(GdiError::ResourceCreation("CreateCompatibleBitmap"));
            }
        }
        debug!(width, height, "GDI capture bitmap resized");
        self.width = width;
        self.height = height;
        self.buffer = vec![0u8; (width as usize) * 4 * (height as usize)];
        Ok(())
    }

    /// Copy `area` of the virtual desktop, optionally with the cursor drawn in.
    pub fn capture(&mut self, area: Rect, draw_cursor: bool) -> Result<Bitmap, GdiError> {
        if area.is_empty() {
            return Err(GdiError::Size(area));
        }
        self.ensure_size(area.width, area.height)?;

        unsafe {
            let old = SelectObject(self.memory_dc, self.bitmap.into());
            if old.is_invalid() {
                return Err(GdiError::Win32("SelectObject"));
            }

            let blit = BitBlt(
                self.memory_dc,
                0,
                0,
                self.width,
                self.height,
                Some(self.screen_dc),
                area.x,
                area.y,
                ROP_CODE(SRCCOPY.0 | CAPTUREBLT.0),
            );
            if blit.is_err() {
                let _ = SelectObject(self.memory_dc, old);
                return Err(GdiError::Win32("BitBlt"));
            }

            if draw_cursor {
                self.draw_cursor(area);
            }

            let mut bmi = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: self.width,
                    biHeight: -self.height, // top-down DIB
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0 as u32,
                    ..Default::default()
                },
                ..Default::default()
            };

            let scanlines = GetDIBits(
                self.memory_dc,
                self.bitmap,
                0,
                self.height as u32,
                Some(self.buffer.as_mut_ptr() as *mut _),
                &mut bmi,
                DIB_RGB_COLORS,
            );

            let _ = SelectObject(self.memory_dc, old);

            if scanlines == 0 {
                return Err(GdiError::Win32("GetDIBits"));
            }
        }

        let mut data = self.buffer.clone();
        make_opaque(&mut data);
        Bitmap::from_vec(self.width as u32, self.height as u32, data)
            .map_err(|_| GdiError::Size(area))
    }

    /// Draw the current cursor into the memory DC. Failures leave the frame
    /// without a cursor.
    unsafe fn draw_cursor(&self, area: Rect) {
        let mut info = CURSORINFO {
            cbSize: std::mem::size_of::<CURSORINFO>() as u32,
            ..Default::default()
        };
        if GetCursorInfo(&mut info).is_err() || info.flags != CURSOR_SHOWING || info.hCursor.is_invalid() {
            return;
        }
        let icon = HICON(info.hCursor.0);
        let mut icon_info = ICONINFO::default();
        if GetIconInfo(icon, &mut icon_info).is_err() {
            return;
        }
        if !icon_info.hbmColor.is_invalid() {
            let _ = DeleteObject(icon_info.hbmColor.into());
        }
        if !icon_info.hbmMask.is_invalid() {
            let _ = DeleteObject(icon_info.hbmMask.into());
        }

        let x = info.ptScreenPos.x - area.x - icon_info.xHotspot as i32;
        let y = info.ptScreenPos.y - area.y - icon_info.yHotspot as i32;
        if DrawIconEx(self.memory_dc, x, y, icon, 0, 0, 0, None, DI_NORMAL).is_err() {
            debug!("DrawIconEx failed");
        }
    }
}

impl Drop for GdiCapturer {
    fn drop(&mut self) {
        unsafe {
            if !self.bitmap.is_invalid() {
                let _ = DeleteObject(self.bitmap.into());
            }
            let _ = DeleteDC(self.memory_dc);
            let _ = ReleaseDC(None, self.screen_dc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_sets_only_alpha() {
        let mut px = [1, 2, 3, 0, 4, 5, 6, 7];
        make_opaque(&mut px);
        assert_eq!(px, [1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn empty_area_maps_to_invalid_argument() {
        let err = CaptureError::from(GdiError::Size(Rect::new(0, 0, 0, 10)));
        assert!(matches!(err, CaptureError::InvalidArgument(_)));
    }
}
