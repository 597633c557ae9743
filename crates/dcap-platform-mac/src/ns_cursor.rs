#![allow(unsafe_code)] // AppKit and ImageIO calls require unsafe

use std::ffi::c_void;

use cocoa::base::nil;
use cocoa::foundation::{NSPoint, NSSize};
use core_foundation::base::{CFRelease, CFTypeRef};
use core_graphics::image::CGImage;
use dcap_core::bitmap::Bitmap;
use foreign_types::ForeignType;
use objc::rc::autoreleasepool;
use objc::runtime::Object;
use objc::{class, msg_send, sel, sel_impl};

use crate::cg;

#[link(name = "ImageIO", kind = "framework")]
extern "C" {
    fn CGImageSourceCreateWithData(data: *const c_void, options: *const c_void) -> *mut c_void;
    fn CGImageSourceCreateImageAtIndex(
        source: *mut c_void,
        index: usize,
        options: *const c_void,
    ) -> *mut core_graphics::sys::CGImage;
}

/// The system cursor as rendered by AppKit.
pub struct NativeCursor {
    /// Backing-resolution pixels.
    pub bitmap: Bitmap,
    /// Hotspot in points.
    pub hotspot: NSPoint,
    /// Image size in points.
    pub size: NSSize,
}

impl NativeCursor {
    /// Hotspot converted to image pixels.
    pub fn hotspot_pixels(&self) -> (i32, i32) {
        hotspot_in_pixels(
            (self.hotspot.x, self.hotspot.y),
            (self.size.width, self.size.height),
            (self.bitmap.width(), self.bitmap.height()),
        )
    }
}

pub fn hotspot_in_pixels(hotspot: (f64, f64), points: (f64, f64), pixels: (u32, u32)) -> (i32, i32) {
    let ratio = |px: u32, pt: f64| if pt > 0.0 { px as f64 / pt } else { 1.0 };
    (
        (hotspot.0 * ratio(pixels.0, points.0)).round() as i32,
        (hotspot.1 * ratio(pixels.1, points.1)).round() as i32,
    )
}

/// Identity of the current cursor object, `None` when there is none.
pub fn current_cursor_id() -> Option<usize> {
    autoreleasepool(|| unsafe {
        let cursor: *mut Object = msg_send![class!(NSCursor), currentCursor];
        (cursor != nil).then_some(cursor as usize)
    })
}

pub fn current_cursor() -> Option<NativeCursor> {
    autoreleasepool(|| unsafe {
        let cursor: *mut Object = msg_send![class!(NSCursor), currentCursor];
        if cursor == nil {
            return None;
        }
        let image: *mut Object = msg_send![cursor, image];
        if image == nil {
            return None;
        }
        let hotspot: NSPoint = msg_send![cursor, hotSpot];
        let size: NSSize = msg_send![image, size];

        let tiff: *mut Object = msg_send![image, TIFFRepresentation];
        if tiff == nil {
            return None;
        }
        let source = CGImageSourceCreateWithData(tiff as *const c_void, std::ptr::null());
        if source.is_null() {
            return None;
        }
        let raw = CGImageSourceCreateImageAtIndex(source, 0, std::ptr::null());
        CFRelease(source as CFTypeRef);
        if raw.is_null() {
            return None;
        }
        let cg_image = CGImage::from_ptr(raw);
        if cg_image.width() == 0 || cg_image.height() == 0 {
            return None;
        }
        let bitmap = cg::render_to_bitmap(&cg_image).ok()?;
        Some(NativeCursor {
            bitmap,
            hotspot,
            size,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hotspot_scales_with_backing_resolution() {
        assert_eq!(hotspot_in_pixels((4.0, 5.0), (16.0, 16.0), (32, 32)), (8, 10));
        assert_eq!(hotspot_in_pixels((4.0, 5.0), (0.0, 16.0), (32, 16)), (4, 5));
    }
}
