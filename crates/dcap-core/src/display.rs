//! Display snapshot model.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geometry::{Point, Rect};

/// One physical monitor as seen by the desktop client.
///
/// A `DisplayInfo` is an immutable snapshot produced by an enumeration pass.
/// Reloads replace the whole list; values are never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    /// Per-platform identifier, unique within one enumeration snapshot.
    pub device_name: String,
    /// Human readable label, not necessarily unique.
    pub display_name: String,
    /// Zero-based ordinal assigned during enumeration.
    pub index: usize,
    pub is_primary: bool,
    /// Bounds in device-independent units.
    pub logical_monitor_area: Rect,
    /// Bounds in native pixels. Authoritative for buffer placement and input math.
    pub monitor_area: Rect,
    /// Physical / logical ratio, always > 0.
    pub scale_factor: f64,
    /// Usable physical area excluding taskbars and docks.
    pub work_area: Rect,
}

impl DisplayInfo {
    /// A display whose logical and physical bounds coincide.
    pub fn unscaled(device_name: impl Into<String>, index: usize, monitor_area: Rect) -> Self {
        Self {
            device_name: device_name.into(),
            display_name: format!("Display {}", index + 1),
            index,
            is_primary: false,
            logical_monitor_area: monitor_area,
            monitor_area,
            scale_factor: 1.0,
            work_area: monitor_area,
        }
    }

    pub fn has_valid_area(&self) -> bool {
        !self.monitor_area.is_empty() && self.scale_factor > 0.0
    }
}

/// Enforce the snapshot invariants every enumerator promises its callers.
///
/// Zero-sized monitors are dropped. Exactly one display ends up primary: the
/// first flagged one, or the first enumerated when none is flagged. Order and
/// indexes are preserved.
pub fn normalize_displays(displays: Vec<DisplayInfo>) -> Vec<DisplayInfo> {
    let mut kept: Vec<DisplayInfo> = displays
        .into_iter()
        .filter(|d| {
            let valid = d.has_valid_area();
            if !valid {
                warn!(
                    device = %d.device_name,
                    area = ?d.monitor_area,
                    scale = d.scale_factor,
                    "dropping display with unusable bounds"
                );
            }
            valid
        })
        .collect();

    let primary = kept.iter().position(|d| d.is_primary).unwrap_or(0);
    for (i, display) in kept.iter_mut().enumerate() {
        display.is_primary = i == primary;
    }
    kept
}

/// Physical bounding box over every display's `monitor_area`.
pub fn virtual_screen_bounds(displays: &[DisplayInfo]) -> Option<Rect> {
    Rect::bounding(displays.iter().map(|d| &d.monitor_area))
}

pub fn primary_display(displays: &[DisplayInfo]) -> Option<&DisplayInfo> {
    displays
        .iter()
        .find(|d| d.is_primary)
        .or_else(|| displays.first())
}

pub fn find_display<'a>(displays: &'a [DisplayInfo], device_name: &str) -> Option<&'a DisplayInfo> {
    displays.iter().find(|d| d.device_name == device_name)
}

/// Resolve a pointer location reported by the OS into physical pixels.
///
/// Some pointer APIs report points and some report pixels. The location is
/// first multiplied by `scale` (the factor of the display under the pointer);
/// if that lands on no display, the unscaled value is tried. First match wins.
pub fn locate_pointer(x: f64, y: f64, scale: f64, displays: &[DisplayInfo]) -> Option<Point> {
    let on_any = |p: Point| displays.iter().any(|d| d.monitor_area.contains(p.x, p.y));

    let scaled = Point::new((x * scale).round() as i32, (y * scale).round() as i32);
    if on_any(scaled) {
        return Some(scaled);
    }
    let unscaled = Point::new(x.round() as i32, y.round() as i32);
    if on_any(unscaled) {
        return Some(unscaled);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(name: &str, index: usize, area: Rect, primary: bool) -> DisplayInfo {
        DisplayInfo {
            is_primary: primary,
            ..DisplayInfo::unscaled(name, index, area)
        }
    }

    #[test]
    fn normalize_drops_zero_sized_and_keeps_one_primary() {
        let displays = vec![
            display("a", 0, Rect::new(0, 0, 0, 1080), true),
            display("b", 1, Rect::new(0, 0, 1920, 1080), false),
            display("c", 2, Rect::new(1920, 0, 1920, 1080), true),
            display("d", 3, Rect::new(3840, 0, 1920, 1080), true),
        ];
        let out = normalize_displays(displays);
        let names: Vec<_> = out.iter().map(|d| d.device_name.as_str()).collect();
        assert_eq!(names, ["b", "c", "d"]);
        let primaries: Vec<_> = out.iter().filter(|d| d.is_primary).collect();
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].device_name, "c");
        assert_eq!(out[0].index, 1);
    }

    #[test]
    fn normalize_promotes_first_when_none_flagged() {
        let out = normalize_displays(vec![
            display("x", 0, Rect::new(0, 0, 800, 600), false),
            display("y", 1, Rect::new(800, 0, 800, 600), false),
        ]);
        assert!(out[0].is_primary);
        assert!(!out[1].is_primary);
    }

    #[test]
    fn virtual_bounds_is_union() {
        let displays = vec![
            display("0", 0, Rect::new(0, 0, 3840, 2160), true),
            display("1", 1, Rect::new(3840, 500, 1920, 1080), false),
        ];
        assert_eq!(
            virtual_screen_bounds(&displays),
            Some(Rect::new(0, 0, 5760, 2160))
        );
        assert_eq!(virtual_screen_bounds(&[]), None);
    }

    #[test]
    fn pointer_prefers_scaled_candidate() {
        let displays = vec![display("1", 0, Rect::new(0, 0, 2880, 1800), true)];
        assert_eq!(locate_pointer(100.0, 50.0, 2.0, &displays), Some(Point::new(200, 100)));
    }

    #[test]
    fn pointer_falls_back_to_unscaled() {
        let displays = vec![display("1", 0, Rect::new(0, 0, 1440, 900), true)];
        assert_eq!(locate_pointer(1000.0, 600.0, 2.0, &displays), Some(Point::new(1000, 600)));
        assert_eq!(locate_pointer(5000.0, 5000.0, 2.0, &displays), None);
    }

    #[test]
    fn primary_falls_back_to_first() {
        let displays = vec![display("a", 0, Rect::new(0, 0, 10, 10), false)];
        assert_eq!(primary_display(&displays).map(|d| d.device_name.as_str()), Some("a"));
        assert!(primary_display(&[]).is_none());
    }
}
