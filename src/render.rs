//! Image outputs: the mask PNG returned to clients and a polygon overlay for debugging.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;
use palette::{FromColor, Hsl, Srgb};

use crate::error::{Result, SegmentError};
use crate::polygon::PolygonResult;

/// Hue step between consecutive overlay colours; keeps neighbours far apart for any count.
const GOLDEN_ANGLE_DEGREES: f32 = 137.507_77;

/// Encodes any image as PNG bytes.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| SegmentError::Encode(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// Renders a binary mask as white RGBA whose alpha channel is the mask itself.
pub fn mask_to_rgba(mask: &GrayImage) -> RgbaImage {
    RgbaImage::from_fn(mask.width(), mask.height(), |x, y| {
        let alpha = if mask.get_pixel(x, y)[0] != 0 { 255 } else { 0 };
        Rgba([255, 255, 255, alpha])
    })
}

/// [`mask_to_rgba`] followed by PNG encoding.
pub fn render_mask_png(mask: &GrayImage) -> Result<Vec<u8>> {
    encode_png(&DynamicImage::ImageRgba8(mask_to_rgba(mask)))
}

/// Colour used for the `index`-th outline in an overlay.
pub fn outline_color(index: usize) -> Rgb<u8> {
    let hue = (index as f32 * GOLDEN_ANGLE_DEGREES) % 360.0;
    let hsl: Hsl = Hsl::new(hue, 0.9, 0.5);
    let srgb: Srgb = Srgb::from_color(hsl);
    let srgb: Srgb<u8> = srgb.into_format();
    Rgb([srgb.red, srgb.green, srgb.blue])
}

/// Draws every polygon ring onto a copy of `image`, each in its own colour.
///
/// Rings are expected in output space (origin bottom-left) and are flipped back into
/// the raster space of `image` before drawing.
pub fn draw_polygon_overlay(image: &RgbImage, polygons: &[PolygonResult]) -> RgbImage {
    let mut canvas = image.clone();
    let height = image.height() as f32;

    for (index, polygon) in polygons.iter().enumerate() {
        let color = outline_color(index);
        for segment in polygon.ring.windows(2) {
            let start = (segment[0].x as f32, height - segment[0].y as f32);
            let end = (segment[1].x as f32, height - segment[1].y as f32);
            draw_line_segment_mut(&mut canvas, start, end, color);
        }
    }
    canvas
}
