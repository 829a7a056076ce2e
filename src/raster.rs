//! Conversion of predictor output into the binary raster the contour tracer consumes.

use image::{GrayImage, Luma};

use crate::error::{PredictorError, Result};
use crate::predictor::Prediction;

pub const FOREGROUND: Luma<u8> = Luma([255]);
pub const BACKGROUND: Luma<u8> = Luma([0]);

/// Collapses a prediction to a single strictly binary raster.
///
/// When the predictor returned several candidates the highest-scoring one is kept (the
/// first on ties). Any non-zero mask value becomes [`FOREGROUND`], zero becomes
/// [`BACKGROUND`].
///
/// # Errors
///
/// A prediction with no masks, or whose chosen mask has a zero dimension, is reported
/// as a predictor failure.
pub fn binarize(prediction: &Prediction) -> Result<GrayImage> {
    let best = best_candidate(&prediction.scores);
    let mask = prediction
        .masks
        .get(best)
        .ok_or_else(|| PredictorError::new("predictor returned no masks"))?;

    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return Err(PredictorError::new("predictor returned an empty mask").into());
    }

    Ok(GrayImage::from_fn(width, height, |x, y| {
        if mask.get_pixel(x, y)[0] != 0 {
            FOREGROUND
        } else {
            BACKGROUND
        }
    }))
}

fn best_candidate(scores: &[f32]) -> usize {
    scores
        .iter()
        .enumerate()
        .fold(None::<(usize, f32)>, |best, (i, &s)| match best {
            Some((_, b)) if b >= s => best,
            _ => Some((i, s)),
        })
        .map_or(0, |(i, _)| i)
}
