//! Owned BGRA bitmaps and the compositing operations the grabbers need.

use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageBuffer, ImageEncoder, Rgba};

use crate::errors::CaptureError;
use crate::frame::FrameData;
use crate::geometry::Rect;

const BYTES_PER_PIXEL: usize = 4;

/// Opaque black in BGRA order.
pub const BLACK: [u8; 4] = [0, 0, 0, 255];

/// Tightly packed 32-bit BGRA image with straight alpha.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl Bitmap {
    /// Fully transparent bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    pub fn filled(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let mut bitmap = Self::new(width, height);
        bitmap.clear(bgra);
        bitmap
    }

    /// Take ownership of tightly packed BGRA bytes.
    pub fn from_vec(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(CaptureError::InvalidArgument(format!(
                "expected {expected} bytes for {width}x{height}, got {}",
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    /// Copy rows out of a strided source, dropping any row padding.
    pub fn from_strided(width: u32, height: u32, stride: usize, src: &[u8]) -> Result<Self, CaptureError> {
        let row_len = width as usize * BYTES_PER_PIXEL;
        if stride < row_len {
            return Err(CaptureError::InvalidArgument(format!(
                "stride {stride} is smaller than row length {row_len}"
            )));
        }
        if height > 0 {
            let needed = stride * (height as usize - 1) + row_len;
            if src.len() < needed {
                return Err(CaptureError::InvalidArgument(format!(
                    "buffer holds {} bytes, {needed} required",
                    src.len()
                )));
            }
        }
        let mut data = Vec::with_capacity(row_len * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            data.extend_from_slice(&src[start..start + row_len]);
        }
        Ok(Self { width, height, data })
    }

    pub fn from_frame(frame: &FrameData) -> Result<Self, CaptureError> {
        if frame.width() <= 0 || frame.height() <= 0 {
            return Err(CaptureError::InvalidArgument(format!(
                "frame has no area: {}x{}",
                frame.width(),
                frame.height()
            )));
        }
        Self::from_strided(
            frame.width() as u32,
            frame.height() as u32,
            frame.stride().max(0) as usize,
            frame.data(),
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.data[i..i + BYTES_PER_PIXEL]);
        Some(px)
    }

    pub fn clear(&mut self, bgra: [u8; 4]) {
        for px in self.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&bgra);
        }
    }

    /// Resampled copy. Channel order is preserved.
    pub fn resized(&self, width: u32, height: u32) -> Bitmap {
        if width == self.width && height == self.height {
            return self.clone();
        }
        match ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(self.width, self.height, &self.data[..]) {
            Some(view) => {
                let out = imageops::resize(&view, width, height, FilterType::Triangle);
                Bitmap {
                    width,
                    height,
                    data: out.into_raw(),
                }
            }
            None => Bitmap::new(width, height),
        }
    }

    /// Copy `src` into `dest`, scaling when sizes differ. Clipped to this bitmap.
    pub fn draw_scaled(&mut self, src: &Bitmap, dest: Rect) {
        if dest.is_empty() {
            return;
        }
        let scaled;
        let src = if dest.width as u32 == src.width && dest.height as u32 == src.height {
            src
        } else {
            scaled = src.resized(dest.width as u32, dest.height as u32);
            &scaled
        };
        self.copy_rows(src, dest.x, dest.y);
    }

    /// Alpha-blend `src` with its top-left corner at (`x`, `y`). Clipped.
    pub fn draw_over(&mut self, src: &Bitmap, x: i32, y: i32) {
        let target = Rect::new(x, y, src.width as i32, src.height as i32);
        let Some(visible) = target.intersect(&self.bounds()) else {
            return;
        };
        for row in 0..visible.height {
            let dy = (visible.y + row) as usize;
            let sy = (visible.y - y + row) as usize;
            for col in 0..visible.width {
                let dx = (visible.x + col) as usize;
                let sx = (visible.x - x + col) as usize;
                let si = (sy * src.width as usize + sx) * BYTES_PER_PIXEL;
                let di = (dy * self.width as usize + dx) * BYTES_PER_PIXEL;
                blend(&mut self.data[di..di + 4], &src.data[si..si + 4]);
            }
        }
    }

    /// Encode as PNG (RGBA on the wire).
    pub fn encode_png(&self) -> Result<Bytes, CaptureError> {
        let mut rgba = self.data.clone();
        for px in rgba.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.swap(0, 2);
        }
        let mut out = Vec::new();
        PngEncoder::new(&mut out).write_image(&rgba, self.width, self.height, ExtendedColorType::Rgba8)?;
        Ok(Bytes::from(out))
    }

    fn copy_rows(&mut self, src: &Bitmap, x: i32, y: i32) {
        let target = Rect::new(x, y, src.width as i32, src.height as i32);
        let Some(visible) = target.intersect(&self.bounds()) else {
            return;
        };
        let len = visible.width as usize * BYTES_PER_PIXEL;
        for row in 0..visible.height {
            let sy = (visible.y - y + row) as usize;
            let sx = (visible.x - x) as usize;
            let dy = (visible.y + row) as usize;
            let si = (sy * src.width as usize + sx) * BYTES_PER_PIXEL;
            let di = (dy * self.width as usize + visible.x as usize) * BYTES_PER_PIXEL;
            self.data[di..di + len].copy_from_slice(&src.data[si..si + len]);
        }
    }
}

fn blend(dst: &mut [u8], src: &[u8]) {
    let a = src[3] as u32;
    match a {
        0 => {}
        255 => dst.copy_from_slice(src),
        _ => {
            for c in 0..3 {
                dst[c] = ((src[c] as u32 * a + dst[c] as u32 * (255 - a) + 127) / 255) as u8;
            }
            dst[3] = (a + dst[3] as u32 * (255 - a) / 255).min(255) as u8;
        }
    }
}
