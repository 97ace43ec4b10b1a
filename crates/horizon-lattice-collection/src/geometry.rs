//! Geometry types consumed from the layout engine.
//!
//! The coordinator never computes layout itself; these types only carry the
//! layout engine's answers (content size, item frames, visible rectangle).

/// A point in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    /// Create a new point.
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// The origin point (0, 0).
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };
}

/// A size in 2D space (width and height).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    /// Create a new size.
    #[inline]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// A zero size.
    pub const ZERO: Self = Self {
        width: 0.0,
        height: 0.0,
    };

    /// The extent of this size along `axis`.
    #[inline]
    pub fn extent(&self, axis: Axis) -> f32 {
        match axis {
            Axis::Vertical => self.height,
            Axis::Horizontal => self.width,
        }
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    /// Create a new rectangle from position and size.
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    /// A zero rectangle at the origin.
    pub const ZERO: Self = Self {
        origin: Point::ZERO,
        size: Size::ZERO,
    };

    #[inline]
    pub fn left(&self) -> f32 {
        self.origin.x
    }

    #[inline]
    pub fn top(&self) -> f32 {
        self.origin.y
    }

    #[inline]
    pub fn right(&self) -> f32 {
        self.origin.x + self.size.width
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.origin.y + self.size.height
    }

    /// Whether the rectangle has no area.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size.width <= 0.0 || self.size.height <= 0.0
    }

    /// Whether two rectangles overlap with a positive area.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left() < other.right()
            && other.left() < self.right()
            && self.top() < other.bottom()
            && other.top() < self.bottom()
    }

    /// The start coordinate along `axis`.
    #[inline]
    pub fn start(&self, axis: Axis) -> f32 {
        match axis {
            Axis::Vertical => self.top(),
            Axis::Horizontal => self.left(),
        }
    }

    /// The end coordinate along `axis`.
    #[inline]
    pub fn end(&self, axis: Axis) -> f32 {
        match axis {
            Axis::Vertical => self.bottom(),
            Axis::Horizontal => self.right(),
        }
    }

    /// Returns a copy spanning `[start, end)` along `axis`, keeping the
    /// cross-axis span unchanged.
    pub fn with_span(&self, axis: Axis, start: f32, end: f32) -> Rect {
        let extent = (end - start).max(0.0);
        match axis {
            Axis::Vertical => Rect::new(self.origin.x, start, self.size.width, extent),
            Axis::Horizontal => Rect::new(start, self.origin.y, extent, self.size.height),
        }
    }
}

/// The scrolling axis of a collection layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Axis {
    /// Content scrolls top to bottom.
    #[default]
    Vertical,
    /// Content scrolls left to right.
    Horizontal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_intersects() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Rect::new(5.0, 5.0, 10.0, 10.0)));
        // Touching edges do not intersect.
        assert!(!a.intersects(&Rect::new(10.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn test_with_span_vertical() {
        let rect = Rect::new(2.0, 10.0, 100.0, 50.0);
        let spanned = rect.with_span(Axis::Vertical, -20.0, 80.0);
        assert_eq!(spanned, Rect::new(2.0, -20.0, 100.0, 100.0));
    }

    #[test]
    fn test_with_span_horizontal_clamps_negative_extent() {
        let rect = Rect::new(0.0, 3.0, 10.0, 20.0);
        let spanned = rect.with_span(Axis::Horizontal, 50.0, 40.0);
        assert_eq!(spanned.size.width, 0.0);
        assert_eq!(spanned.origin.y, 3.0);
    }
}
