use std::collections::VecDeque;

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{LogitMap, Prediction, Predictor, Prompt};
use crate::error::PredictorError;

const MULTIMASK_SCALES: [f32; 3] = [0.5, 1.0, 1.5];

const NEIGHBOURS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Settings for [`RegionGrowPredictor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionGrowConfig {
    /// Euclidean RGB distance from an include seed's colour at which the logit reaches zero.
    pub tolerance: f32,
    /// Gaussian blur applied when the image is loaded; `0` disables it.
    pub blur_sigma: f32,
}

impl Default for RegionGrowConfig {
    fn default() -> Self {
        Self {
            tolerance: 32.0,
            blur_sigma: 1.0,
        }
    }
}

/// A model-free predictor growing 8-connected regions of similar colour from include points.
///
/// The "embedding" is the blurred image; exclude points both block growth at their own
/// pixel and pull the logit down wherever a pixel is closer in colour to them than to the
/// include seeds.
#[derive(Debug, Clone)]
pub struct RegionGrowPredictor {
    config: RegionGrowConfig,
    embedding: Option<RgbImage>,
}

impl RegionGrowPredictor {
    pub fn new(config: RegionGrowConfig) -> Self {
        Self {
            config,
            embedding: None,
        }
    }

    pub fn config(&self) -> &RegionGrowConfig {
        &self.config
    }
}

impl Default for RegionGrowPredictor {
    fn default() -> Self {
        Self::new(RegionGrowConfig::default())
    }
}

impl Predictor for RegionGrowPredictor {
    fn set_image(&mut self, image: &RgbImage) -> Result<(), PredictorError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PredictorError::new("cannot embed an empty image"));
        }
        let embedding = if self.config.blur_sigma > 0.0 {
            gaussian_blur_f32(image, self.config.blur_sigma)
        } else {
            image.clone()
        };
        debug!(
            width = image.width(),
            height = image.height(),
            "region-grow embedding computed"
        );
        self.embedding = Some(embedding);
        Ok(())
    }

    fn predict(
        &mut self,
        prompt: &Prompt,
        threshold: f32,
        multimask: bool,
    ) -> Result<Prediction, PredictorError> {
        let embedding = self
            .embedding
            .as_ref()
            .ok_or_else(|| PredictorError::new("predict called before set_image"))?;
        if prompt.is_empty() {
            return Err(PredictorError::new("prompt contains no points"));
        }
        if prompt.coords.len() != prompt.labels.len() {
            return Err(PredictorError::new(format!(
                "prompt has {} coordinates but {} labels",
                prompt.coords.len(),
                prompt.labels.len()
            )));
        }

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for (coord, is_include) in prompt.points() {
            let seed = seed_pixel(embedding, coord);
            if is_include {
                include.push(seed);
            } else {
                exclude.push(seed);
            }
        }
        let include_colours: Vec<Rgb<u8>> = include
            .iter()
            .map(|&(x, y)| *embedding.get_pixel(x, y))
            .collect();
        let exclude_colours: Vec<Rgb<u8>> = exclude
            .iter()
            .map(|&(x, y)| *embedding.get_pixel(x, y))
            .collect();

        let scales: &[f32] = if multimask { &MULTIMASK_SCALES } else { &[1.0] };
        let mut prediction = Prediction {
            masks: Vec::with_capacity(scales.len()),
            scores: Vec::with_capacity(scales.len()),
            logits: Vec::with_capacity(scales.len()),
        };
        for scale in scales {
            let tolerance = self.config.tolerance * scale;
            let logits = logit_map(embedding, &include_colours, &exclude_colours, tolerance);
            let mask = grow(&logits, &include, &exclude, threshold);
            prediction.scores.push(mask_score(&logits, &mask, tolerance));
            prediction.masks.push(mask);
            prediction.logits.push(logits);
        }
        Ok(prediction)
    }
}

fn seed_pixel(image: &RgbImage, [x, y]: [f32; 2]) -> (u32, u32) {
    let clamp = |v: f32, len: u32| -> u32 {
        if v.is_nan() || v <= 0.0 {
            0
        } else {
            (v.floor() as u32).min(len - 1)
        }
    };
    (clamp(x, image.width()), clamp(y, image.height()))
}

fn colour_distance(a: &Rgb<u8>, b: &Rgb<u8>) -> f32 {
    a.0.iter()
        .zip(b.0.iter())
        .map(|(&p, &q)| {
            let d = p as f32 - q as f32;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

fn nearest(colour: &Rgb<u8>, seeds: &[Rgb<u8>]) -> f32 {
    seeds
        .iter()
        .map(|s| colour_distance(colour, s))
        .fold(f32::INFINITY, f32::min)
}

fn logit_map(
    embedding: &RgbImage,
    include: &[Rgb<u8>],
    exclude: &[Rgb<u8>],
    tolerance: f32,
) -> LogitMap {
    LogitMap::from_fn(embedding.width(), embedding.height(), |x, y| {
        let colour = embedding.get_pixel(x, y);
        let to_include = nearest(colour, include);
        let mut logit = tolerance - to_include;
        if !exclude.is_empty() {
            logit = logit.min(nearest(colour, exclude) - to_include);
        }
        Luma([logit])
    })
}

/// Breadth-first growth over pixels whose logit exceeds `threshold`.
fn grow(
    logits: &LogitMap,
    include: &[(u32, u32)],
    exclude: &[(u32, u32)],
    threshold: f32,
) -> GrayImage {
    let (width, height) = logits.dimensions();
    let mut mask = GrayImage::new(width, height);
    let mut blocked = GrayImage::new(width, height);
    for &(x, y) in exclude {
        blocked.put_pixel(x, y, Luma([1]));
    }

    let accepts = |mask: &GrayImage, x: u32, y: u32| {
        mask.get_pixel(x, y)[0] == 0
            && blocked.get_pixel(x, y)[0] == 0
            && logits.get_pixel(x, y)[0] > threshold
    };

    let mut queue = VecDeque::new();
    for &(x, y) in include {
        if accepts(&mask, x, y) {
            mask.put_pixel(x, y, Luma([255]));
            queue.push_back((x, y));
        }
    }

    while let Some((x, y)) = queue.pop_front() {
        for (dx, dy) in NEIGHBOURS {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                continue;
            }
            let (nx, ny) = (nx as u32, ny as u32);
            if accepts(&mask, nx, ny) {
                mask.put_pixel(nx, ny, Luma([255]));
                queue.push_back((nx, ny));
            }
        }
    }
    mask
}

/// Mean logit inside the mask, normalized by the tolerance into `[0, 1]`.
fn mask_score(logits: &LogitMap, mask: &GrayImage, tolerance: f32) -> f32 {
    if tolerance <= 0.0 {
        return 0.0;
    }
    let (sum, count) = mask
        .pixels()
        .zip(logits.pixels())
        .filter(|(m, _)| m[0] != 0)
        .fold((0.0f32, 0u32), |(sum, count), (_, l)| {
            (sum + (l[0] / tolerance).clamp(0.0, 1.0), count + 1)
        });
    if count == 0 { 0.0 } else { sum / count as f32 }
}
