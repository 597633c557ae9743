#![allow(unsafe_code)] // CoreGraphics API calls require unsafe

use core_graphics::base::{kCGBitmapByteOrder32Little, kCGImageAlphaPremultipliedFirst};
use core_graphics::color_space::CGColorSpace;
use core_graphics::context::CGContext;
use core_graphics::display::{CGDirectDisplayID, CGDisplay};
use core_graphics::event::CGEvent;
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use core_graphics::image::CGImage;
use dcap_core::bitmap::Bitmap;
use dcap_core::CaptureError;
use thiserror::Error;
use tracing::debug;

/// Upper bound passed to the display list calls.
pub const MAX_DISPLAYS: usize = 32;

#[derive(Debug, Error)]
pub enum CgError {
    #[error("CGDisplayCreateImage returned null for display {0}")]
    ImageUnavailable(CGDirectDisplayID),
    #[error("unexpected pixel layout: {0} bits per pixel")]
    UnsupportedLayout(usize),
    #[error("image data too short: {actual} bytes, need {needed}")]
    ShortData { actual: usize, needed: usize },
}

impl From<CgError> for CaptureError {
    fn from(err: CgError) -> Self {
        CaptureError::NativeCallFailure(err.to_string())
    }
}

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGGetOnlineDisplayList(
        max_displays: u32,
        online_displays: *mut CGDirectDisplayID,
        display_count: *mut u32,
    ) -> i32;
    fn CGGetDisplaysWithPoint(
        point: CGPoint,
        max_displays: u32,
        displays: *mut CGDirectDisplayID,
        matching_display_count: *mut u32,
    ) -> i32;
    fn CGCursorIsVisible() -> i32;
}

/// Displays known to the window server, active or mirrored.
pub fn online_display_ids() -> Vec<CGDirectDisplayID> {
    let mut ids = [0 as CGDirectDisplayID; MAX_DISPLAYS];
    let mut count = 0u32;
    let err = unsafe { CGGetOnlineDisplayList(MAX_DISPLAYS as u32, ids.as_mut_ptr(), &mut count) };
    if err != 0 {
        debug!(error = err, "CGGetOnlineDisplayList failed");
        return Vec::new();
    }
    ids[..(count as usize).min(MAX_DISPLAYS)].to_vec()
}

/// Display containing a global point, if any.
pub fn display_at_point(point: CGPoint) -> Option<CGDirectDisplayID> {
    let mut id: CGDirectDisplayID = 0;
    let mut count = 0u32;
    let err = unsafe { CGGetDisplaysWithPoint(point, 1, &mut id, &mut count) };
    (err == 0 && count > 0).then_some(id)
}

pub fn cursor_visible() -> bool {
    unsafe { CGCursorIsVisible() != 0 }
}

/// Pointer location in global display points.
pub fn cursor_location() -> Option<CGPoint> {
    let source = CGEventSource::new(CGEventSourceStateID::CombinedSessionState).ok()?;
    let event = CGEvent::new(source).ok()?;
    Some(event.location())
}

pub fn display_image(id: CGDirectDisplayID) -> Result<CGImage, CgError> {
    CGDisplay::new(id).image().ok_or(CgError::ImageUnavailable(id))
}

/// Copy a display image, already 32-bit little-endian BGRA, row by row.
pub fn display_image_to_bitmap(image: &CGImage) -> Result<Bitmap, CaptureError> {
    let bits = image.bits_per_pixel();
    if bits != 32 {
        return Err(CgError::UnsupportedLayout(bits).into());
    }
    let (width, height) = (image.width() as u32, image.height() as u32);
    let stride = image.bytes_per_row();
    let data = image.data();
    let bytes = data.bytes();
    let needed = stride * height as usize;
    if bytes.len() < needed {
        return Err(CgError::ShortData {
            actual: bytes.len(),
            needed,
        }
        .into());
    }
    Bitmap::from_strided(width, height, stride, bytes)
}

/// Render an arbitrary image into straight-alpha BGRA.
pub fn render_to_bitmap(image: &CGImage) -> Result<Bitmap, CaptureError> {
    let (width, height) = (image.width(), image.height());
    let stride = width * 4;
    let mut data = vec![0u8; stride * height];
    let color_space = CGColorSpace::create_device_rgb();
    let ctx = CGContext::create_bitmap_context(
        Some(data.as_mut_ptr() as *mut _),
        width,
        height,
        8,
        stride,
        &color_space,
        kCGImageAlphaPremultipliedFirst | kCGBitmapByteOrder32Little,
    );
    ctx.draw_image(
        CGRect::new(
            &CGPoint::new(0.0, 0.0),
            &CGSize::new(width as f64, height as f64),
        ),
        image,
    );
    drop(ctx);
    unpremultiply_bgra(&mut data);
    Bitmap::from_vec(width as u32, height as u32, data)
}

/// Undo premultiplied alpha in place.
pub fn unpremultiply_bgra(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u32;
        match a {
            0 => px[..3].fill(0),
            255 => {}
            _ => {
                for c in &mut px[..3] {
                    *c = ((*c as u32 * 255 + a / 2) / a).min(255) as u8;
                }
            }
        }
    }
}
