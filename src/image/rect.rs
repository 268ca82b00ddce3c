use std::fmt;

use nalgebra::{Point2, Rotation2, Vector2};

/// An axis-aligned rectangle.
///
/// Rectangles are allowed to have zero height and/or width. Negative dimensions are not allowed.
#[derive(Clone, Copy, PartialEq)]
pub struct Rect {
    center: Point2<f32>,
    size: Vector2<f32>,
}

impl Rect {
    /// Creates a rectangle extending outwards from a center point.
    #[inline]
    pub fn from_center(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self {
            center: Point2::new(x_center, y_center),
            size: Vector2::new(width, height),
        }
    }

    /// Creates a rectangle extending downwards and right from a point.
    #[inline]
    pub fn from_top_left(top_left_x: f32, top_left_y: f32, width: f32, height: f32) -> Self {
        Self::from_center(
            top_left_x + width * 0.5,
            top_left_y + height * 0.5,
            width,
            height,
        )
    }

    /// Scales the width and height of this [`Rect`] by the given amount.
    ///
    /// The center position of the [`Rect`] remains the same.
    #[must_use]
    pub fn scale(&self, scale: f32) -> Self {
        Self {
            center: self.center,
            size: self.size * scale,
        }
    }

    /// Symmetrically extends one dimension of `self` so that the resulting rectangle has the given
    /// aspect ratio (width divided by height).
    #[must_use]
    pub fn grow_to_fit_aspect(&self, target_aspect: f32) -> Self {
        let mut res = *self;
        let target_width = self.height() * target_aspect;
        if target_width >= self.width() {
            res.size.x = target_width;
        } else {
            res.size.y = self.width() / target_aspect;
        }

        res
    }

    /// Returns the X coordinate of the left side of the rectangle.
    #[inline]
    pub fn x(&self) -> f32 {
        self.center.x - self.size.x * 0.5
    }

    /// Returns the Y coordinate of the top side of the rectangle.
    #[inline]
    pub fn y(&self) -> f32 {
        self.center.y - self.size.y * 0.5
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.size.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.size.y
    }

    #[inline]
    pub fn x_center(&self) -> f32 {
        self.center.x
    }

    #[inline]
    pub fn y_center(&self) -> f32 {
        self.center.y
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.center.x, self.center.y)
    }

    /// Returns the number of pixels contained in `self`.
    #[inline]
    pub fn area(&self) -> f32 {
        self.size.x * self.size.y
    }

    /// Computes the intersection of `self` and `other`.
    ///
    /// Returns [`None`] when the intersection is empty (ie. the rectangles do not overlap).
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x_min = self.x().max(other.x());
        let y_min = self.y().max(other.y());
        let x_max = (self.x() + self.width()).min(other.x() + other.width());
        let y_max = (self.y() + self.height()).min(other.y() + other.height());
        if x_min > x_max || y_min > y_max {
            return None;
        }

        Some(Rect::from_top_left(
            x_min,
            y_min,
            x_max - x_min,
            y_max - y_min,
        ))
    }

    fn intersection_area(&self, other: &Self) -> f32 {
        self.intersection(other).map_or(0.0, |rect| rect.area())
    }

    fn union_area(&self, other: &Self) -> f32 {
        self.area() + other.area() - self.intersection_area(other)
    }

    /// Computes the Intersection over Union (IOU) of `self` and `other`.
    ///
    /// Two empty rectangles have an IOU of 0.
    pub fn iou(&self, other: &Self) -> f32 {
        let union = self.union_area(other);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / union
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect @ ({},{})/{}x{}",
            self.x(),
            self.y(),
            self.width(),
            self.height()
        )
    }
}

/// A [`Rect`], rotated around its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    rect: Rect,
    radians: f32,
}

impl RotatedRect {
    /// Creates a new rotated rectangle.
    ///
    /// `radians` is the clockwise rotation to apply to the [`Rect`].
    #[inline]
    pub fn new(rect: Rect, radians: f32) -> Self {
        Self { rect, radians }
    }

    /// Returns the underlying non-rotated rectangle.
    #[inline]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Returns the rectangle's clockwise rotation in radians.
    #[inline]
    pub fn rotation_radians(&self) -> f32 {
        self.radians
    }

    /// Transforms a point from the rectangle's own coordinate system to the parent system.
    ///
    /// The origin of the inner coordinate system is the top left corner of the non-rotated
    /// rectangle, its axes are rotated along with the rectangle.
    pub fn transform_out(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.rect.size * 0.5;
        let rel = Vector2::new(x, y) - half;
        let out = self.rect.center + Rotation2::new(self.radians) * rel;
        (out.x, out.y)
    }
}

impl From<Rect> for RotatedRect {
    fn from(rect: Rect) -> Self {
        Self::new(rect, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn top_left_and_center_agree() {
        let rect = Rect::from_top_left(10.0, 20.0, 4.0, 6.0);
        assert_eq!(rect, Rect::from_center(12.0, 23.0, 4.0, 6.0));
        assert_eq!(rect.x(), 10.0);
        assert_eq!(rect.y(), 20.0);
        assert_eq!(rect.area(), 24.0);
    }

    #[test]
    fn scale() {
        let rect = Rect::from_center(0.0, 0.0, 2.0, 1.0);
        assert_eq!(rect.scale(3.0), Rect::from_center(0.0, 0.0, 6.0, 3.0));
    }

    #[test]
    fn fit_aspect() {
        let wide = Rect::from_top_left(0.0, 0.0, 640.0, 480.0);
        let square = wide.grow_to_fit_aspect(1.0);
        assert_eq!(square, Rect::from_center(320.0, 240.0, 640.0, 640.0));
        assert_eq!(square.y(), -80.0);

        let tall = Rect::from_top_left(0.0, 0.0, 100.0, 200.0);
        assert_eq!(
            tall.grow_to_fit_aspect(1.0),
            Rect::from_center(50.0, 100.0, 200.0, 200.0)
        );
    }

    #[test]
    fn intersection() {
        let a = Rect::from_top_left(0.0, 0.0, 2.0, 2.0);
        let b = Rect::from_top_left(1.0, 1.0, 2.0, 2.0);
        assert_eq!(
            a.intersection(&b),
            Some(Rect::from_top_left(1.0, 1.0, 1.0, 1.0))
        );

        let far = Rect::from_top_left(5.0, 5.0, 1.0, 1.0);
        assert_eq!(a.intersection(&far), None);
    }

    #[test]
    fn iou() {
        let a = Rect::from_top_left(0.0, 0.0, 2.0, 2.0);
        let b = Rect::from_top_left(1.0, 1.0, 2.0, 2.0);
        assert_abs_diff_eq!(a.iou(&b), 1.0 / 7.0);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(
            a.iou(&Rect::from_top_left(10.0, 10.0, 1.0, 1.0)),
            0.0
        );

        let empty = Rect::from_center(0.0, 0.0, 0.0, 0.0);
        assert_eq!(empty.iou(&empty), 0.0);
    }

    #[test]
    fn rotated_transform_out() {
        let rect = Rect::from_top_left(10.0, 20.0, 4.0, 2.0);
        let upright = RotatedRect::from(rect);
        assert_eq!(upright.transform_out(0.0, 0.0), (10.0, 20.0));
        assert_eq!(upright.transform_out(4.0, 2.0), (14.0, 22.0));

        // A quarter turn clockwise moves the inner top edge to the right side.
        let quarter = RotatedRect::new(rect, FRAC_PI_2);
        let (x, y) = quarter.transform_out(2.0, 0.0);
        assert_abs_diff_eq!(x, 13.0, epsilon = 1e-5);
        assert_abs_diff_eq!(y, 21.0, epsilon = 1e-5);
        let (x, y) = quarter.transform_out(2.0, 1.0);
        assert_abs_diff_eq!(x, 12.0, epsilon = 1e-5);
        assert_abs_diff_eq!(y, 21.0, epsilon = 1e-5);
    }
}
