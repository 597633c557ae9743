//! Property-based tests for dcap-platform-mac

use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use dcap_core::Size;
use proptest::prelude::*;

use crate::monitor::display_from_bounds;

proptest! {
    #[test]
    fn integer_backing_scale_is_recovered(
        x in -4000i32..4000,
        y in -2000i32..2000,
        w in 640i32..3000,
        h in 480i32..2000,
        factor in 1i32..=3,
    ) {
        let bounds = CGRect::new(
            &CGPoint::new(f64::from(x), f64::from(y)),
            &CGSize::new(f64::from(w), f64::from(h)),
        );
        let d = display_from_bounds(1, 0, bounds, Size::new(w * factor, h * factor), true);
        prop_assert_eq!(d.scale_factor, f64::from(factor));
        prop_assert_eq!(d.monitor_area.x, x * factor);
        prop_assert_eq!(d.monitor_area.y, y * factor);
        prop_assert_eq!(d.monitor_area.width, w * factor);
        prop_assert_eq!(d.logical_monitor_area.width, w);
    }

    #[test]
    fn failed_probe_keeps_point_size(w in 1i32..5000, h in 1i32..5000) {
        let bounds = CGRect::new(&CGPoint::new(0.0, 0.0), &CGSize::new(f64::from(w), f64::from(h)));
        let d = display_from_bounds(7, 2, bounds, Size::default(), false);
        prop_assert_eq!(d.scale_factor, 1.0);
        prop_assert_eq!(d.monitor_area, d.logical_monitor_area);
        prop_assert_eq!(d.device_name, "7");
    }
}
