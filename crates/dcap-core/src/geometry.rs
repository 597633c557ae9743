//! Integer rectangles and coordinate conversions between logical and physical pixels.
//!
//! Physical pixels are native framebuffer pixels. Logical pixels are the
//! device-independent units used by the OS or compositor for layout.
//! `physical = logical * scale_factor`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Both dimensions are strictly positive.
    pub fn is_positive(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Axis-aligned rectangle stored as origin + size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from edge coordinates, as Win32 `RECT` reports them.
    pub const fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    pub const fn left(&self) -> i32 {
        self.x
    }

    pub const fn top(&self) -> i32 {
        self.y
    }

    pub const fn right(&self) -> i32 {
        self.x + self.width
    }

    pub const fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        let left = self.left().min(other.left());
        let top = self.top().min(other.top());
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::from_edges(left, top, right, bottom)
    }

    /// Overlapping area, or `None` when the rectangles are disjoint.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let left = self.left().max(other.left());
        let top = self.top().max(other.top());
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::from_edges(left, top, right, bottom))
    }

    /// Minimal bounding rectangle over every input, `None` for an empty iterator.
    pub fn bounding<'a, I>(rects: I) -> Option<Rect>
    where
        I: IntoIterator<Item = &'a Rect>,
    {
        rects
            .into_iter()
            .fold(None, |acc: Option<Rect>, r| match acc {
                Some(bounds) => Some(bounds.union(r)),
                None => Some(*r),
            })
    }
}

/// Divide a physical rectangle by `scale`, rounding every component.
pub fn logical_from_physical(physical: Rect, scale: f64) -> Rect {
    if scale <= 0.0 {
        return physical;
    }
    Rect::new(
        (physical.x as f64 / scale).round() as i32,
        (physical.y as f64 / scale).round() as i32,
        (physical.width as f64 / scale).round() as i32,
        (physical.height as f64 / scale).round() as i32,
    )
}

/// Backing scale from a logical and a measured physical size.
///
/// Takes the larger of the two axis ratios so a one-pixel rounding difference
/// on one axis cannot pull the factor below the true value. Non-square pixel
/// scaling is not representable.
pub fn backing_scale(logical: Size, physical: Size) -> f64 {
    if !logical.is_positive() || !physical.is_positive() {
        return 1.0;
    }
    let sx = physical.width as f64 / logical.width as f64;
    let sy = physical.height as f64 / logical.height as f64;
    sx.max(sy)
}

/// Map a fractional position inside `bounds` to an absolute point.
///
/// Components are truncated toward zero.
pub fn percentage_to_absolute(bounds: Rect, percent_x: f64, percent_y: f64) -> Point {
    let x = bounds.left() as f64 + bounds.width as f64 * percent_x;
    let y = bounds.top() as f64 + bounds.height as f64 * percent_y;
    Point::new(x as i32, y as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_edges_matches_win32_rect() {
        let r = Rect::from_edges(-1920, 0, 0, 1080);
        assert_eq!(r, Rect::new(-1920, 0, 1920, 1080));
        assert_eq!(r.right(), 0);
    }

    #[test]
    fn contains_is_half_open() {
        let r = Rect::new(0, 0, 10, 10);
        assert!(r.contains(0, 0));
        assert!(r.contains(9, 9));
        assert!(!r.contains(10, 5));
        assert!(!r.contains(5, 10));
    }

    #[test]
    fn bounding_covers_negative_origins() {
        let rects = [Rect::new(0, 0, 1920, 1080), Rect::new(-1280, -200, 1280, 1024)];
        assert_eq!(
            Rect::bounding(rects.iter()),
            Some(Rect::new(-1280, -200, 3200, 1280))
        );
        assert_eq!(Rect::bounding(std::iter::empty()), None);
    }

    #[test]
    fn intersect_disjoint_is_none() {
        let a = Rect::new(0, 0, 10, 10);
        assert_eq!(a.intersect(&Rect::new(10, 0, 5, 5)), None);
        assert_eq!(
            a.intersect(&Rect::new(5, 5, 10, 10)),
            Some(Rect::new(5, 5, 5, 5))
        );
    }

    #[test]
    fn logical_rounds_each_component() {
        let physical = Rect::new(2560, 0, 2560, 1440);
        assert_eq!(logical_from_physical(physical, 1.25), Rect::new(2048, 0, 2048, 1152));
        assert_eq!(logical_from_physical(physical, 1.0), physical);
    }

    #[test]
    fn backing_scale_takes_larger_ratio() {
        assert_eq!(backing_scale(Size::new(1440, 900), Size::new(2880, 1800)), 2.0);
        let s = backing_scale(Size::new(1512, 982), Size::new(3024, 1964));
        assert_eq!(s, 2.0);
        let odd = backing_scale(Size::new(1000, 1000), Size::new(1999, 2000));
        assert_eq!(odd, 2.0);
        assert_eq!(backing_scale(Size::new(0, 0), Size::new(10, 10)), 1.0);
    }

    #[test]
    fn percentage_truncates() {
        let bounds = Rect::new(100, 50, 1000, 500);
        assert_eq!(percentage_to_absolute(bounds, 0.5, 0.5), Point::new(600, 300));
        assert_eq!(percentage_to_absolute(bounds, 0.0009, 0.0), Point::new(100, 50));
        assert_eq!(percentage_to_absolute(bounds, 0.9999, 0.9999), Point::new(1099, 549));
    }
}
