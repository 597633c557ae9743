#![allow(unsafe_code)] // Windows API calls require unsafe.

//! HCURSOR to BGRA conversion.

use dcap_core::bitmap::Bitmap;
use tracing::debug;
use windows::Win32::{Graphics::Gdi::*, UI::WindowsAndMessaging::*};

/// Cursors larger than this in either dimension are ignored.
pub const MAX_CURSOR_DIM: u32 = 256;

/// Cursor bitmap with its hotspot in pixels.
#[derive(Debug, Clone)]
pub struct IconImage {
    pub bitmap: Bitmap,
    pub hotspot_x: u32,
    pub hotspot_y: u32,
}

fn mask_bit(mask: &[u8], row_bytes: usize, x: u32, y: u32) -> u8 {
    let byte = mask
        .get(y as usize * row_bytes + (x / 8) as usize)
        .copied()
        .unwrap_or(0);
    (byte >> (7 - (x % 8))) & 1
}

/// True when any pixel carries a non-zero alpha.
pub fn has_alpha(bgra: &[u8]) -> bool {
    bgra.chunks_exact(4).any(|px| px[3] != 0)
}

/// Derive alpha from a 1bpp AND mask for colour cursors that have none.
pub fn apply_and_mask(bgra: &mut [u8], and_mask: &[u8], row_bytes: usize, width: u32, height: u32) {
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 4) as usize;
            if let Some(px) = bgra.get_mut(idx..idx + 4) {
                px[3] = if mask_bit(and_mask, row_bytes, x, y) == 1 { 0 } else { 255 };
            }
        }
    }
}

/// Monochrome cursor: AND mask on top, XOR mask below, both 1bpp.
///
/// `height` is the cursor height, half the mask bitmap's.
pub fn mono_to_bgra(mask: &[u8], row_bytes: usize, width: u32, height: u32) -> Vec<u8> {
    let half = row_bytes * height as usize;
    let (and_mask, xor_mask) = if mask.len() >= half {
        mask.split_at(half)
    } else {
        (mask, &[][..])
    };
    let mut out = vec![0u8; (width * height * 4) as usize];
    for y in 0..height {
        for x in 0..width {
            let px = match (
                mask_bit(and_mask, row_bytes, x, y),
                mask_bit(xor_mask, row_bytes, x, y),
            ) {
                (0, 0) => [0, 0, 0, 255],
                (0, _) => [255, 255, 255, 255],
                (_, 0) => [0, 0, 0, 0],
                // Screen inversion has no BGRA equivalent.
                _ => [128, 128, 128, 128],
            };
            let idx = ((y * width + x) * 4) as usize;
            out[idx..idx + 4].copy_from_slice(&px);
        }
    }
    out
}

unsafe fn bitmap_dims(hbitmap: HBITMAP) -> Option<BITMAP> {
    let mut bm = BITMAP::default();
    let read = GetObjectW(
        hbitmap.into(),
        std::mem::size_of::<BITMAP>() as i32,
        Some(&mut bm as *mut _ as *mut _),
    );
    (read != 0).then_some(bm)
}

unsafe fn read_color(hbitmap: HBITMAP, width: u32, height: u32) -> Option<Vec<u8>> {
    let hdc = CreateCompatibleDC(None);
    if hdc.is_invalid() {
        return None;
    }
    let mut bmi = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width as i32,
            biHeight: -(height as i32),
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0 as u32,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut bits = vec![0u8; (width * height * 4) as usize];
    let lines = GetDIBits(
        hdc,
        hbitmap,
        0,
        height,
        Some(bits.as_mut_ptr() as *mut _),
        &mut bmi,
        DIB_RGB_COLORS,
    );
    let _ = DeleteDC(hdc);
    (lines != 0).then_some(bits)
}

unsafe fn read_mask(hbitmap: HBITMAP, bm: &BITMAP) -> Option<Vec<u8>> {
    let len = (bm.bmWidthBytes * bm.bmHeight) as usize;
    let mut bits = vec![0u8; len];
    let read = GetBitmapBits(hbitmap, len as i32, bits.as_mut_ptr() as *mut _);
    (read != 0).then_some(bits)
}

unsafe fn convert(info: &ICONINFO) -> Option<IconImage> {
    let mask_bm = bitmap_dims(info.hbmMask)?;
    let mask = read_mask(info.hbmMask, &mask_bm)?;
    let row_bytes = mask_bm.bmWidthBytes as usize;

    let (width, height, bgra) = if info.hbmColor.is_invalid() {
        let width = mask_bm.bmWidth as u32;
        let height = (mask_bm.bmHeight / 2) as u32;
        (width, height, mono_to_bgra(&mask, row_bytes, width, height))
    } else {
        let color_bm = bitmap_dims(info.hbmColor)?;
        let width = color_bm.bmWidth as u32;
        let height = color_bm.bmHeight as u32;
        let mut bgra = read_color(info.hbmColor, width, height)?;
        if !has_alpha(&bgra) {
            apply_and_mask(&mut bgra, &mask, row_bytes, width, height);
        }
        (width, height, bgra)
    };

    if width == 0 || height == 0 || width > MAX_CURSOR_DIM || height > MAX_CURSOR_DIM {
        debug!(width, height, "cursor size out of range");
        return None;
    }
    let bitmap = Bitmap::from_vec(width, height, bgra).ok()?;
    Some(IconImage {
        bitmap,
        hotspot_x: info.xHotspot,
        hotspot_y: info.yHotspot,
    })
}

/// Read the colour and mask bitmaps behind `cursor`.
pub fn icon_image(cursor: HCURSOR) -> Option<IconImage> {
    unsafe {
        let mut info = ICONINFO::default();
        if GetIconInfo(HICON(cursor.0), &mut info).is_err() {
            return None;
        }
        let image = convert(&info);
        if !info.hbmColor.is_invalid() {
            let _ = DeleteObject(info.hbmColor.into());
        }
        if !info.hbmMask.is_invalid() {
            let _ = DeleteObject(info.hbmMask.into());
        }
        image
    }
}
