//! End-to-end segmentation of one request against a shared, stateful predictor.

use image::GrayImage;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::{CacheLookup, CacheState, EmbeddingCache};
use crate::error::{Result, SegmentError};
use crate::invoker::{self, PromptPoint};
use crate::polygon::{PolygonResult, extract_polygons};
use crate::predictor::Predictor;
use crate::raster::binarize;

/// One segmentation request, independent of any wire format.
#[derive(Debug, Clone)]
pub struct SegmentationRequest {
    /// Points in normalized coordinates.
    pub points: Vec<PromptPoint>,
    /// Encoded image (PNG, JPEG, ...).
    pub image: Vec<u8>,
    /// Predictor binarization cut-off.
    pub threshold: f32,
    /// Minimum fraction of the image area a polygon must cover; `0.0` keeps everything.
    pub area_ratio: f64,
    /// Ask the predictor for several candidates and keep the best-scoring one.
    pub multimask: bool,
}

/// Result of a successful segmentation.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Binary mask of the chosen candidate, in raster space.
    pub mask: GrayImage,
    /// Root outlines, largest first.
    pub polygons: Vec<PolygonResult>,
    pub scores: Vec<f32>,
    pub cache: CacheLookup,
}

struct Session<P> {
    predictor: P,
    cache: EmbeddingCache,
}

/// Serializes access to one predictor and its embedding cache.
///
/// The embed-then-predict sequence of a request runs under a single lock, so concurrent
/// requests queue instead of predicting against each other's images. Contour
/// extraction runs after the lock is released.
pub struct Segmenter<P> {
    session: Mutex<Session<P>>,
}

impl<P: Predictor> Segmenter<P> {
    pub fn new(predictor: P) -> Self {
        Self {
            session: Mutex::new(Session {
                predictor,
                cache: EmbeddingCache::new(),
            }),
        }
    }

    /// Current cache state, mostly for diagnostics and tests.
    pub fn cache_state(&self) -> CacheState {
        self.session.lock().cache.state()
    }

    /// Segments `request`.
    ///
    /// Returns `Ok(None)` without touching the cache or the predictor when the request
    /// has no points.
    ///
    /// # Errors
    ///
    /// Decode, predictor and invalid-request failures are returned as-is with no partial
    /// result. After a predictor failure the cache is emptied.
    pub fn segment(&self, request: &SegmentationRequest) -> Result<Option<Segmentation>> {
        if request.points.is_empty() {
            debug!("no points in request; skipping prediction");
            return Ok(None);
        }
        if !request.area_ratio.is_finite() || request.area_ratio < 0.0 {
            return Err(SegmentError::InvalidRequest(format!(
                "area_ratio {} must be a finite value >= 0",
                request.area_ratio
            )));
        }

        let (mask, scores, lookup) = {
            let mut session = self.session.lock();
            let Session { predictor, cache } = &mut *session;

            let lookup = cache.ensure(&request.image, predictor)?;
            let dimensions = cache
                .state()
                .dimensions()
                .ok_or_else(|| SegmentError::Internal("no image loaded after ensure".into()))?;

            // A malformed prediction is a predictor failure too, so binarize before unlocking.
            let outcome = invoker::predict(
                predictor,
                &request.points,
                dimensions,
                request.threshold,
                request.multimask,
            )
            .and_then(|prediction| Ok((binarize(&prediction)?, prediction.scores)));

            match outcome {
                Ok((mask, scores)) => (mask, scores, lookup),
                Err(err @ SegmentError::Predictor(_)) => {
                    warn!(%err, "prediction failed");
                    cache.invalidate();
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        };

        let polygons = extract_polygons(&mask, request.area_ratio);
        debug!(
            cache = ?lookup,
            polygons = polygons.len(),
            width = mask.width(),
            height = mask.height(),
            "segmented request"
        );

        Ok(Some(Segmentation {
            mask,
            polygons,
            scores,
            cache: lookup,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PredictorError;
    use crate::predictor::{Prediction, Prompt};
    use crate::render::encode_png;
    use image::{DynamicImage, Luma, Rgb, RgbImage};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Predicts a fixed square around the first point; counts every call.
    #[derive(Clone, Default)]
    struct SquarePredictor {
        embeddings: Arc<AtomicUsize>,
        predictions: Arc<AtomicUsize>,
        dimensions: Option<(u32, u32)>,
        fail_predict: bool,
        no_masks: bool,
        delay: Option<Duration>,
    }

    impl Predictor for SquarePredictor {
        fn set_image(&mut self, image: &RgbImage) -> std::result::Result<(), PredictorError> {
            self.embeddings.fetch_add(1, Ordering::SeqCst);
            self.dimensions = Some(image.dimensions());
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            Ok(())
        }

        fn predict(
            &mut self,
            prompt: &Prompt,
            _threshold: f32,
            _multimask: bool,
        ) -> std::result::Result<Prediction, PredictorError> {
            self.predictions.fetch_add(1, Ordering::SeqCst);
            if self.fail_predict {
                return Err(PredictorError::new("model crashed"));
            }
            if self.no_masks {
                return Ok(Prediction {
                    masks: Vec::new(),
                    scores: Vec::new(),
                    logits: Vec::new(),
                });
            }
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            let (width, height) = self.dimensions.expect("set_image first");
            let [cx, cy] = prompt.coords[0];
            let mask = GrayImage::from_fn(width, height, |x, y| {
                let inside = (x as f32 - cx).abs() < 5.0 && (y as f32 - cy).abs() < 5.0;
                Luma([if inside { 255 } else { 0 }])
            });
            Ok(Prediction {
                masks: vec![mask],
                scores: vec![0.9],
                logits: Vec::new(),
            })
        }
    }

    fn image_bytes(width: u32, height: u32) -> Vec<u8> {
        encode_png(&DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([10, 20, 30]),
        )))
        .unwrap()
    }

    fn request(points: Vec<PromptPoint>, image: Vec<u8>) -> SegmentationRequest {
        SegmentationRequest {
            points,
            image,
            threshold: 0.0,
            area_ratio: 0.0,
            multimask: false,
        }
    }

    #[test]
    fn test_empty_points_short_circuit() {
        let predictor = SquarePredictor::default();
        let segmenter = Segmenter::new(predictor.clone());
        let result = segmenter
            .segment(&request(Vec::new(), b"not even an image".to_vec()))
            .unwrap();

        assert!(result.is_none());
        assert_eq!(predictor.embeddings.load(Ordering::SeqCst), 0);
        assert_eq!(predictor.predictions.load(Ordering::SeqCst), 0);
        assert_eq!(segmenter.cache_state(), CacheState::Empty);
    }

    #[test]
    fn test_points_are_scaled_and_polygons_extracted() {
        let predictor = SquarePredictor::default();
        let segmenter = Segmenter::new(predictor.clone());
        let result = segmenter
            .segment(&request(
                vec![PromptPoint::include(0.5, 0.5)],
                image_bytes(40, 20),
            ))
            .unwrap()
            .unwrap();

        // Square of pixels 16..=24 by 6..=14 around (20, 10).
        assert_eq!(result.cache, CacheLookup::Miss);
        assert_eq!(result.mask.dimensions(), (40, 20));
        assert_eq!(result.polygons.len(), 1);
        assert_eq!(result.polygons[0].area, 81);
        assert!(result.polygons[0].ring.contains(&imageproc::point::Point::new(16, 14)));
        assert_eq!(result.scores, vec![0.9]);
    }

    #[test]
    fn test_refinement_reuses_embedding() {
        let predictor = SquarePredictor::default();
        let segmenter = Segmenter::new(predictor.clone());
        let bytes = image_bytes(30, 30);

        let first = segmenter
            .segment(&request(vec![PromptPoint::include(0.2, 0.2)], bytes.clone()))
            .unwrap()
            .unwrap();
        let second = segmenter
            .segment(&request(
                vec![PromptPoint::include(0.2, 0.2), PromptPoint::exclude(0.8, 0.8)],
                bytes,
            ))
            .unwrap()
            .unwrap();

        assert_eq!(first.cache, CacheLookup::Miss);
        assert_eq!(second.cache, CacheLookup::Hit);
        assert_eq!(predictor.embeddings.load(Ordering::SeqCst), 1);
        assert_eq!(predictor.predictions.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_predictor_failure_invalidates_cache() {
        let predictor = SquarePredictor {
            fail_predict: true,
            ..Default::default()
        };
        let segmenter = Segmenter::new(predictor.clone());
        let err = segmenter
            .segment(&request(
                vec![PromptPoint::include(0.5, 0.5)],
                image_bytes(8, 8),
            ))
            .unwrap_err();

        assert!(matches!(err, SegmentError::Predictor(_)));
        assert_eq!(segmenter.cache_state(), CacheState::Empty);
    }

    #[test]
    fn test_decode_error_is_reported() {
        let segmenter = Segmenter::new(SquarePredictor::default());
        let err = segmenter
            .segment(&request(
                vec![PromptPoint::include(0.5, 0.5)],
                b"garbage".to_vec(),
            ))
            .unwrap_err();
        assert!(matches!(err, SegmentError::Decode(_)));
    }

    #[test]
    fn test_negative_area_ratio_is_rejected() {
        let segmenter = Segmenter::new(SquarePredictor::default());
        let mut req = request(vec![PromptPoint::include(0.5, 0.5)], image_bytes(8, 8));
        req.area_ratio = -0.1;
        let err = segmenter.segment(&req).unwrap_err();
        assert!(matches!(err, SegmentError::InvalidRequest(_)));
    }

    #[test]
    fn test_prediction_without_masks_invalidates_cache() {
        let predictor = SquarePredictor {
            no_masks: true,
            ..Default::default()
        };
        let segmenter = Segmenter::new(predictor.clone());
        let err = segmenter
            .segment(&request(
                vec![PromptPoint::include(0.5, 0.5)],
                image_bytes(8, 8),
            ))
            .unwrap_err();

        assert!(matches!(err, SegmentError::Predictor(_)));
        assert_eq!(segmenter.cache_state(), CacheState::Empty);
        assert_eq!(predictor.embeddings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_requests_never_mix_images() {
        let predictor = SquarePredictor {
            delay: Some(Duration::from_millis(2)),
            ..Default::default()
        };
        let segmenter = Arc::new(Segmenter::new(predictor.clone()));
        let images = [((40, 20), image_bytes(40, 20)), ((16, 24), image_bytes(16, 24))];

        thread::scope(|scope| {
            for worker in 0..6 {
                let segmenter = Arc::clone(&segmenter);
                let images = &images;
                scope.spawn(move || {
                    for round in 0..5 {
                        let (dimensions, bytes) = &images[(worker + round) % 2];
                        let result = segmenter
                            .segment(&request(vec![PromptPoint::include(0.5, 0.5)], bytes.clone()))
                            .unwrap()
                            .unwrap();
                        // The mask is built from the embedding the predictor held at predict time.
                        assert_eq!(result.mask.dimensions(), *dimensions);
                        assert_eq!(result.polygons.len(), 1);
                    }
                });
            }
        });

        assert_eq!(predictor.predictions.load(Ordering::SeqCst), 30);
        assert!(predictor.embeddings.load(Ordering::SeqCst) <= 30);
    }
}
