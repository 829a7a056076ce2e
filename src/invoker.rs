//! Conversion of request points into a predictor prompt, and the guarded predictor call.

use crate::error::{Result, SegmentError};
use crate::predictor::{LABEL_EXCLUDE, LABEL_INCLUDE, Prediction, Predictor, Prompt};

/// A request point in normalized image coordinates (`0.0..=1.0`, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromptPoint {
    pub x: f64,
    pub y: f64,
    pub include: bool,
}

impl PromptPoint {
    pub fn include(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            include: true,
        }
    }

    pub fn exclude(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            include: false,
        }
    }
}

/// Scales normalized points to pixel coordinates of a `width x height` image.
///
/// Coordinates outside `0.0..=1.0` are clamped onto the image edge.
///
/// # Errors
///
/// * [`SegmentError::EmptyPointSet`] for an empty point list.
/// * [`SegmentError::InvalidRequest`] for a NaN or infinite coordinate.
pub fn build_prompt(points: &[PromptPoint], (width, height): (u32, u32)) -> Result<Prompt> {
    if points.is_empty() {
        return Err(SegmentError::EmptyPointSet);
    }

    let mut prompt = Prompt {
        coords: Vec::with_capacity(points.len()),
        labels: Vec::with_capacity(points.len()),
    };
    for point in points {
        if !point.x.is_finite() || !point.y.is_finite() {
            return Err(SegmentError::InvalidRequest(format!(
                "point ({}, {}) is not finite",
                point.x, point.y
            )));
        }
        let x = point.x.clamp(0.0, 1.0) * width as f64;
        let y = point.y.clamp(0.0, 1.0) * height as f64;
        prompt.coords.push([x as f32, y as f32]);
        prompt.labels.push(if point.include {
            LABEL_INCLUDE
        } else {
            LABEL_EXCLUDE
        });
    }
    Ok(prompt)
}

/// Runs `predictor` for `points` against the image it currently holds.
///
/// `dimensions` must be those of that image. An empty point list is rejected here and
/// never reaches the predictor.
pub fn predict<P>(
    predictor: &mut P,
    points: &[PromptPoint],
    dimensions: (u32, u32),
    threshold: f32,
    multimask: bool,
) -> Result<Prediction>
where
    P: Predictor + ?Sized,
{
    if !threshold.is_finite() {
        return Err(SegmentError::InvalidRequest(format!(
            "threshold {threshold} is not finite"
        )));
    }
    let prompt = build_prompt(points, dimensions)?;
    Ok(predictor.predict(&prompt, threshold, multimask)?)
}
