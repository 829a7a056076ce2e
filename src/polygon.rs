//! Selection of reportable outlines and their conversion to output space.

use image::GrayImage;
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::area::exact_pixel_area;
use crate::contours::{ContourSet, trace};

/// One reported outline: its pixel area and a closed ring in output coordinates.
///
/// Output space has its origin at the bottom-left corner (`y_out = height - y_raster`).
/// On the wire a polygon is the pair `[area, [[x, y], ...]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WirePolygon", from = "WirePolygon")]
pub struct PolygonResult {
    pub area: u64,
    pub ring: Vec<Point<i32>>,
}

#[derive(Serialize, Deserialize)]
struct WirePolygon(u64, Vec<[i32; 2]>);

impl From<PolygonResult> for WirePolygon {
    fn from(polygon: PolygonResult) -> Self {
        WirePolygon(
            polygon.area,
            polygon.ring.into_iter().map(|p| [p.x, p.y]).collect(),
        )
    }
}

impl From<WirePolygon> for PolygonResult {
    fn from(WirePolygon(area, ring): WirePolygon) -> Self {
        PolygonResult {
            area,
            ring: ring.into_iter().map(|[x, y]| Point::new(x, y)).collect(),
        }
    }
}

/// Keeps root contours covering at least `area_ratio_minimum` of the raster and converts
/// them to closed output-space rings.
///
/// Holes and anything nested inside another contour are never reported on their own.
/// The result is sorted by area, largest first; equal areas keep tracing order.
///
/// # Arguments
///
/// * `set` - Contours and hierarchy from [`trace`].
/// * `(width, height)` - Dimensions of the traced raster.
/// * `area_ratio_minimum` - Fraction of `width * height` a contour must reach.
pub fn filter_and_transform(
    set: &ContourSet,
    (width, height): (u32, u32),
    area_ratio_minimum: f64,
) -> Vec<PolygonResult> {
    let minimum_area = area_ratio_minimum * (width as f64 * height as f64);
    let height = height as i32;

    let mut polygons: Vec<PolygonResult> = set
        .roots()
        .filter_map(|index| {
            let contour = &set.contours[index].points;
            let area = exact_pixel_area(contour);
            if (area as f64) < minimum_area {
                return None;
            }
            Some(PolygonResult {
                area,
                ring: to_output_ring(contour, height),
            })
        })
        .collect();

    // Stable, so ties stay in tracing order.
    polygons.sort_by(|a, b| b.area.cmp(&a.area));

    debug!(
        roots = set.roots().count(),
        kept = polygons.len(),
        minimum_area,
        "filtered contours"
    );
    polygons
}

/// Traces `raster` and returns its reportable polygons.
pub fn extract_polygons(raster: &GrayImage, area_ratio_minimum: f64) -> Vec<PolygonResult> {
    let set = trace(raster);
    filter_and_transform(&set, raster.dimensions(), area_ratio_minimum)
}

/// Flips the vertical axis and closes the ring by repeating the first point.
fn to_output_ring(contour: &[Point<i32>], height: i32) -> Vec<Point<i32>> {
    let mut ring: Vec<Point<i32>> = Vec::with_capacity(contour.len() + 1);
    ring.extend(contour.iter().map(|p| Point::new(p.x, height - p.y)));
    if let Some(&first) = ring.first() {
        ring.push(first);
    }
    ring
}
