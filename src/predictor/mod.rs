//! The narrow interface the pipeline uses to talk to a point-prompted mask predictor.
//!
//! A predictor is stateful: [`Predictor::set_image`] loads an image embedding and every
//! following [`Predictor::predict`] call runs against it until the next `set_image`.

mod region_grow;

pub use region_grow::{RegionGrowConfig, RegionGrowPredictor};

use image::{GrayImage, ImageBuffer, Luma, RgbImage};

use crate::error::PredictorError;

/// Raw per-pixel mask scores; positive values lean towards foreground.
pub type LogitMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Label value for a point whose surroundings belong to the mask.
pub const LABEL_INCLUDE: u8 = 1;
/// Label value for a point whose surroundings must stay outside the mask.
pub const LABEL_EXCLUDE: u8 = 0;

/// Prompt points in the parallel-array form predictors consume.
///
/// `coords[i]` is a pixel coordinate `[x, y]` in the loaded image and `labels[i]` is
/// [`LABEL_INCLUDE`] or [`LABEL_EXCLUDE`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prompt {
    pub coords: Vec<[f32; 2]>,
    pub labels: Vec<u8>,
}

impl Prompt {
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Iterates `(coordinate, is_include)` pairs.
    pub fn points(&self) -> impl Iterator<Item = ([f32; 2], bool)> + '_ {
        self.coords
            .iter()
            .zip(&self.labels)
            .map(|(c, l)| (*c, *l == LABEL_INCLUDE))
    }
}

/// Output of one prediction: one or more candidate masks with their quality scores.
///
/// `masks`, `scores` and `logits` are index-aligned. Masks use `0` for background and
/// any non-zero value for foreground.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub masks: Vec<GrayImage>,
    pub scores: Vec<f32>,
    pub logits: Vec<LogitMap>,
}

/// A point-prompted segmentation model treated as a black box.
///
/// `threshold` is the model's binarization cut-off on its logits; it is passed per
/// call so that no request leaves configuration behind for the next one.
pub trait Predictor: Send {
    /// Computes and stores the embedding for `image`, replacing any previous one.
    fn set_image(&mut self, image: &RgbImage) -> Result<(), PredictorError>;

    /// Predicts masks for `prompt` against the currently loaded image.
    ///
    /// Callers must never pass an empty prompt.
    fn predict(
        &mut self,
        prompt: &Prompt,
        threshold: f32,
        multimask: bool,
    ) -> Result<Prediction, PredictorError>;
}

impl<P: Predictor + ?Sized> Predictor for Box<P> {
    fn set_image(&mut self, image: &RgbImage) -> Result<(), PredictorError> {
        (**self).set_image(image)
    }

    fn predict(
        &mut self,
        prompt: &Prompt,
        threshold: f32,
        multimask: bool,
    ) -> Result<Prediction, PredictorError> {
        (**self).predict(prompt, threshold, multimask)
    }
}
