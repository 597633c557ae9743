//! Property-based tests for dcap-platform-win

use dcap_core::Rect;
use proptest::prelude::*;

use crate::cursor_icon::{apply_and_mask, mono_to_bgra};
use crate::monitor::MonitorRecord;

proptest! {
    #[test]
    fn logical_area_never_exceeds_physical(
        x in -8000i32..8000,
        y in -4000i32..4000,
        w in 1i32..8000,
        h in 1i32..5000,
        dpi in prop::sample::select(vec![96u16, 120, 144, 168, 192, 240]),
    ) {
        let bounds = Rect::new(x, y, w, h);
        let display = MonitorRecord {
            device_name: "\\\\.\\DISPLAY1".into(),
            bounds,
            work_area: bounds,
            is_primary: true,
            log_pixels: dpi,
        }
        .into_display(0);
        prop_assert!(display.scale_factor >= 1.0);
        prop_assert!(display.logical_monitor_area.width <= w);
        prop_assert!(display.logical_monitor_area.height <= h);
        prop_assert_eq!(display.monitor_area, bounds);
    }

    #[test]
    fn mono_output_has_one_pixel_per_cursor_cell(
        w in 1u32..64,
        h in 1u32..64,
        seed in any::<u8>(),
    ) {
        let row_bytes = (((w + 15) / 16) * 2) as usize;
        let mask = vec![seed; row_bytes * h as usize * 2];
        let out = mono_to_bgra(&mask, row_bytes, w, h);
        prop_assert_eq!(out.len(), (w * h * 4) as usize);
    }

    #[test]
    fn and_mask_alpha_is_binary(w in 1u32..32, h in 1u32..32, seed in any::<u8>()) {
        let row_bytes = (((w + 15) / 16) * 2) as usize;
        let mask = vec![seed; row_bytes * h as usize];
        let mut bgra = vec![7u8; (w * h * 4) as usize];
        apply_and_mask(&mut bgra, &mask, row_bytes, w, h);
        prop_assert!(bgra.chunks_exact(4).all(|px| px[3] == 0 || px[3] == 255));
    }
}
