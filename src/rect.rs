use imageproc::point::Point;
use num_traits::Num;

/// Inclusive axis-aligned bounds of a point set.
///
/// Extents are measured between extreme coordinates, so a set of points sharing one row
/// has `extent_y() == 0` even though it covers one row of pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox<T> {
    pub min_x: T,
    pub min_y: T,
    pub max_x: T,
    pub max_y: T,
}

impl<T> BoundingBox<T>
where
    T: Copy + PartialOrd + Num,
{
    pub fn extent_x(&self) -> T {
        self.max_x - self.min_x
    }

    pub fn extent_y(&self) -> T {
        self.max_y - self.min_y
    }

    /// True when the box collapses to a line or a point in either axis.
    pub fn is_degenerate(&self) -> bool {
        self.extent_x() == T::zero() || self.extent_y() == T::zero()
    }
}

/// Calculates the axis-aligned bounding box of an arbitrary point sequence.
///
/// Works for integer and floating-point coordinates alike: only `PartialOrd` is
/// required, so the comparisons are done by hand rather than through `Ord::min`.
///
/// # Arguments
///
/// * `points` - The vertices to enclose, in any order.
///
/// # Returns
///
/// `None` for an empty slice, otherwise the tightest enclosing box.
///
/// # Examples
///
/// ```
/// use imageproc::point::Point;
/// use segment_outline::rect::bounding_box;
///
/// let diamond = [
///     Point::new(50, 10),
///     Point::new(90, 50),
///     Point::new(50, 90),
///     Point::new(10, 50),
/// ];
///
/// let bounds = bounding_box(&diamond).unwrap();
/// assert_eq!((bounds.min_x, bounds.min_y), (10, 10));
/// assert_eq!((bounds.extent_x(), bounds.extent_y()), (80, 80));
/// ```
pub fn bounding_box<T>(points: &[Point<T>]) -> Option<BoundingBox<T>>
where
    T: Copy + PartialOrd + Num,
{
    let (first, rest) = points.split_first()?;
    let mut bounds = BoundingBox {
        min_x: first.x,
        min_y: first.y,
        max_x: first.x,
        max_y: first.y,
    };

    for p in rest {
        if p.x < bounds.min_x {
            bounds.min_x = p.x;
        }
        if p.x > bounds.max_x {
            bounds.max_x = p.x;
        }
        if p.y < bounds.min_y {
            bounds.min_y = p.y;
        }
        if p.y > bounds.max_y {
            bounds.max_y = p.y;
        }
    }

    Some(bounds)
}
