//! Property-based tests for dcap-core

use proptest::prelude::*;

use crate::bitmap::Bitmap;
use crate::buffers::BufferPool;
use crate::display::{normalize_displays, virtual_screen_bounds, DisplayInfo};
use crate::geometry::{logical_from_physical, Rect};

fn arb_rect() -> impl Strategy<Value = Rect> {
    (-4000i32..4000, -4000i32..4000, 0i32..4000, 0i32..4000)
        .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
}

fn arb_displays() -> impl Strategy<Value = Vec<DisplayInfo>> {
    prop::collection::vec((arb_rect(), any::<bool>()), 1..6).prop_map(|items| {
        items
            .into_iter()
            .enumerate()
            .map(|(i, (area, primary))| DisplayInfo {
                is_primary: primary,
                ..DisplayInfo::unscaled(i.to_string(), i, area)
            })
            .collect()
    })
}

proptest! {
    /// Every returned display has positive area and scale, and exactly one is primary.
    #[test]
    fn normalized_snapshot_invariants(displays in arb_displays()) {
        let out = normalize_displays(displays);
        for d in &out {
            prop_assert!(d.monitor_area.width > 0);
            prop_assert!(d.monitor_area.height > 0);
            prop_assert!(d.scale_factor > 0.0);
        }
        if !out.is_empty() {
            prop_assert_eq!(out.iter().filter(|d| d.is_primary).count(), 1);
        }
    }

    /// Virtual bounds equal the minimal rectangle covering every monitor area.
    #[test]
    fn virtual_bounds_is_minimal_cover(displays in arb_displays()) {
        let displays = normalize_displays(displays);
        prop_assume!(!displays.is_empty());
        let bounds = virtual_screen_bounds(&displays).unwrap();
        for d in &displays {
            prop_assert!(d.monitor_area.left() >= bounds.left());
            prop_assert!(d.monitor_area.top() >= bounds.top());
            prop_assert!(d.monitor_area.right() <= bounds.right());
            prop_assert!(d.monitor_area.bottom() <= bounds.bottom());
        }
        prop_assert!(displays.iter().any(|d| d.monitor_area.left() == bounds.left()));
        prop_assert!(displays.iter().any(|d| d.monitor_area.top() == bounds.top()));
        prop_assert!(displays.iter().any(|d| d.monitor_area.right() == bounds.right()));
        prop_assert!(displays.iter().any(|d| d.monitor_area.bottom() == bounds.bottom()));
    }

    /// Dividing by the scale and multiplying back stays within rounding error.
    #[test]
    fn logical_round_trip_within_scale(
        x in 0i32..8000, w in 1i32..8000, scale in prop::sample::select(vec![1.0f64, 1.25, 1.5, 2.0, 3.0])
    ) {
        let physical = Rect::new(x, 0, w, 100);
        let logical = logical_from_physical(physical, scale);
        let back = (logical.width as f64 * scale).round() as i32;
        prop_assert!((back - physical.width).abs() as f64 <= scale);
    }

    /// Each rental goes back to the pool exactly once, clones included.
    #[test]
    fn pool_returns_every_rental_once(sizes in prop::collection::vec(0usize..4096, 1..16), clones in 0usize..4) {
        let pool = BufferPool::new(4);
        {
            let mut held = Vec::new();
            for size in &sizes {
                let buf = pool.rent(*size);
                for _ in 0..clones {
                    held.push(buf.clone());
                }
                held.push(buf);
            }
            prop_assert_eq!(pool.stats().outstanding(), sizes.len() * (clones + 1));
        }
        let stats = pool.stats();
        prop_assert_eq!(stats.rented, stats.returned);
        prop_assert_eq!(stats.rented, sizes.len() * (clones + 1));
    }

    /// Strided import keeps exactly width * 4 bytes per row.
    #[test]
    fn strided_import_drops_padding(w in 1u32..64, h in 1u32..64, pad in 0usize..32) {
        let stride = w as usize * 4 + pad;
        let src = vec![0x5Au8; stride * h as usize];
        let bmp = Bitmap::from_strided(w, h, stride, &src).unwrap();
        prop_assert_eq!(bmp.as_bytes().len(), (w * h * 4) as usize);
    }
}
