//! Pixel-exact area of traced contours.
//!
//! Shoelace area measures the polygon through pixel centres, which loses half a pixel
//! along every edge and collapses one-pixel-wide shapes to nearly nothing. Filling the
//! contour into a small bitmap and counting pixels gives the number of pixels a person
//! would count as covered.

use image::{GrayImage, Luma};
use imageproc::{drawing::draw_polygon_mut, point::Point};
use tracing::trace;

use crate::error::{Result, SegmentError};
use crate::rect::bounding_box;

/// Number of pixels covered by `contour`, or `0` for degenerate contours.
///
/// See [`checked_pixel_area`] for when a contour is degenerate.
pub fn exact_pixel_area(contour: &[Point<i32>]) -> u64 {
    checked_pixel_area(contour).unwrap_or_else(|err| {
        trace!(%err, "degenerate contour counted as zero area");
        0
    })
}

/// Fills `contour` (boundary included) into a bitmap the size of its bounding box and
/// counts the set pixels.
///
/// The contour may be open or explicitly closed. Coordinates are translated so that the
/// bounding box starts at the origin, so any position works, negative ones included.
///
/// # Errors
///
/// Returns [`SegmentError::Geometry`] when the contour is empty or its bounding box has a
/// zero extent in either axis.
pub fn checked_pixel_area(contour: &[Point<i32>]) -> Result<u64> {
    let bounds = bounding_box(contour)
        .ok_or_else(|| SegmentError::Geometry("contour has no points".into()))?;
    if bounds.is_degenerate() {
        return Err(SegmentError::Geometry(format!(
            "contour bounding box is {}x{}",
            bounds.extent_x(),
            bounds.extent_y()
        )));
    }

    let width = u32::try_from(bounds.extent_x() + 1)
        .map_err(|e| SegmentError::Geometry(e.to_string()))?;
    let height = u32::try_from(bounds.extent_y() + 1)
        .map_err(|e| SegmentError::Geometry(e.to_string()))?;

    let mut local: Vec<Point<i32>> = contour
        .iter()
        .map(|p| Point::new(p.x - bounds.min_x, p.y - bounds.min_y))
        .collect();
    // draw_polygon_mut closes the ring itself and panics on a repeated end point.
    while local.len() > 1 && local.first() == local.last() {
        local.pop();
    }

    let mut bitmap = GrayImage::new(width, height);
    draw_polygon_mut(&mut bitmap, &local, Luma([255]));
    Ok(bitmap.pixels().filter(|p| p[0] != 0).count() as u64)
}
