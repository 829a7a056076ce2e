//! Single-slot, content-addressed cache in front of the predictor's image embedding.
//!
//! Refining a selection re-sends the same image with every click. Hashing the upload
//! and comparing against the digest of the embedding the predictor currently holds
//! skips the expensive decode-and-embed step for all but the first request per image.

use std::fmt;

use image::RgbImage;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Result, SegmentError};
use crate::predictor::Predictor;

/// SHA-256 digest of the raw uploaded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn of(bytes: &[u8]) -> Self {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(bytes));
        Self(digest)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// What the predictor currently has loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheState {
    #[default]
    Empty,
    Valid {
        digest: ContentDigest,
        width: u32,
        height: u32,
    },
}

/// Outcome of [`EmbeddingCache::ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// The embedding for these bytes was already loaded.
    Hit,
    /// The image was decoded and embedded.
    Miss,
}

impl CacheState {
    /// Whether an upload with `digest` can reuse the loaded embedding.
    pub fn lookup(&self, digest: &ContentDigest) -> CacheLookup {
        match self {
            CacheState::Valid { digest: current, .. } if current == digest => CacheLookup::Hit,
            _ => CacheLookup::Miss,
        }
    }

    /// Dimensions of the loaded image.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match *self {
            CacheState::Valid { width, height, .. } => Some((width, height)),
            CacheState::Empty => None,
        }
    }
}

/// Tracks which image the predictor holds an embedding for.
///
/// The cache never owns the embedding itself: that lives inside the predictor. It only
/// records the digest that embedding was computed from, so the two must always be used
/// together under one lock.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    state: CacheState,
    recomputations: u64,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Number of embeddings computed so far.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    /// Makes sure `predictor` holds the embedding of `image_bytes`.
    ///
    /// On a digest match this returns immediately. Otherwise the bytes are decoded to
    /// 8-bit RGB (whatever their original colour type) and handed to
    /// [`Predictor::set_image`].
    ///
    /// # Errors
    ///
    /// * [`SegmentError::Decode`] if the bytes are not a supported image; the cache is
    ///   left as it was.
    /// * [`SegmentError::Predictor`] if embedding fails; the cache is reset to
    ///   [`CacheState::Empty`] since the predictor's state is then unknown.
    pub fn ensure<P>(&mut self, image_bytes: &[u8], predictor: &mut P) -> Result<CacheLookup>
    where
        P: Predictor + ?Sized,
    {
        let digest = ContentDigest::of(image_bytes);
        if self.state.lookup(&digest) == CacheLookup::Hit {
            debug!(%digest, "embedding cache hit");
            return Ok(CacheLookup::Hit);
        }

        let image = decode_rgb(image_bytes)?;
        let (width, height) = image.dimensions();
        debug!(%digest, width, height, "embedding cache miss");

        if let Err(err) = predictor.set_image(&image) {
            self.invalidate();
            return Err(err.into());
        }
        self.recomputations += 1;
        self.state = CacheState::Valid {
            digest,
            width,
            height,
        };
        Ok(CacheLookup::Miss)
    }

    /// Forgets the loaded embedding so the next [`ensure`](Self::ensure) recomputes it.
    pub fn invalidate(&mut self) {
        if self.state != CacheState::Empty {
            warn!("embedding cache invalidated");
        }
        self.state = CacheState::Empty;
    }
}

/// Decodes any supported image format into an 8-bit RGB raster.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| SegmentError::Decode(e.to_string()))?
        .into_rgb8();
    if image.width() == 0 || image.height() == 0 {
        return Err(SegmentError::Decode("image has no pixels".into()));
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PredictorError;
    use crate::predictor::{Prediction, Prompt};
    use crate::render::encode_png;
    use image::{DynamicImage, GrayImage, Luma, LumaA, Rgb, RgbImage, Rgba, RgbaImage};

    #[derive(Default)]
    struct CountingPredictor {
        embeddings: usize,
        last_dimensions: Option<(u32, u32)>,
        fail_next: bool,
    }

    impl Predictor for CountingPredictor {
        fn set_image(&mut self, image: &RgbImage) -> std::result::Result<(), PredictorError> {
            if std::mem::take(&mut self.fail_next) {
                return Err(PredictorError::new("out of memory"));
            }
            self.embeddings += 1;
            self.last_dimensions = Some(image.dimensions());
            Ok(())
        }

        fn predict(
            &mut self,
            _prompt: &Prompt,
            _threshold: f32,
            _multimask: bool,
        ) -> std::result::Result<Prediction, PredictorError> {
            unreachable!("the cache never predicts")
        }
    }

    fn png(width: u32, height: u32, colour: Rgb<u8>) -> Vec<u8> {
        encode_png(&DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width, height, colour,
        )))
        .unwrap()
    }

    #[test]
    fn test_identical_bytes_embed_once() {
        let mut cache = EmbeddingCache::new();
        let mut predictor = CountingPredictor::default();
        let bytes = png(4, 3, Rgb([1, 2, 3]));

        assert_eq!(cache.ensure(&bytes, &mut predictor).unwrap(), CacheLookup::Miss);
        assert_eq!(cache.ensure(&bytes, &mut predictor).unwrap(), CacheLookup::Hit);
        assert_eq!(predictor.embeddings, 1);
        assert_eq!(predictor.last_dimensions, Some((4, 3)));
        assert_eq!(cache.recomputations(), 1);
        assert_eq!(cache.state().dimensions(), Some((4, 3)));
    }

    #[test]
    fn test_new_image_replaces_slot() {
        let mut cache = EmbeddingCache::new();
        let mut predictor = CountingPredictor::default();
        let first = png(4, 3, Rgb([1, 2, 3]));
        let second = png(5, 6, Rgb([9, 9, 9]));

        cache.ensure(&first, &mut predictor).unwrap();
        assert_eq!(cache.ensure(&second, &mut predictor).unwrap(), CacheLookup::Miss);
        assert_eq!(cache.ensure(&first, &mut predictor).unwrap(), CacheLookup::Miss);
        assert_eq!(predictor.embeddings, 3);
        assert_eq!(
            cache.state(),
            CacheState::Valid {
                digest: ContentDigest::of(&first),
                width: 4,
                height: 3
            }
        );
    }

    #[test]
    fn test_decode_failure_leaves_cache_untouched() {
        let mut cache = EmbeddingCache::new();
        let mut predictor = CountingPredictor::default();
        let bytes = png(2, 2, Rgb([0, 0, 0]));
        cache.ensure(&bytes, &mut predictor).unwrap();
        let before = cache.state();

        let err = cache.ensure(b"definitely not an image", &mut predictor).unwrap_err();
        assert!(matches!(err, SegmentError::Decode(_)));
        assert_eq!(cache.state(), before);
        assert_eq!(cache.ensure(&bytes, &mut predictor).unwrap(), CacheLookup::Hit);
    }

    #[test]
    fn test_predictor_failure_invalidates() {
        let mut cache = EmbeddingCache::new();
        let mut predictor = CountingPredictor::default();
        let bytes = png(2, 2, Rgb([0, 0, 0]));
        cache.ensure(&bytes, &mut predictor).unwrap();

        predictor.fail_next = true;
        let other = png(3, 3, Rgb([7, 7, 7]));
        let err = cache.ensure(&other, &mut predictor).unwrap_err();
        assert!(matches!(err, SegmentError::Predictor(_)));
        assert_eq!(cache.state(), CacheState::Empty);
        assert_eq!(cache.ensure(&bytes, &mut predictor).unwrap(), CacheLookup::Miss);
    }

    #[test]
    fn test_non_rgb_inputs_are_converted() {
        let gray = encode_png(&DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 2, Luma([9]))))
            .unwrap();
        let gray_alpha = encode_png(&DynamicImage::ImageLumaA8(
            image::GrayAlphaImage::from_pixel(2, 2, LumaA([9, 100])),
        ))
        .unwrap();
        let rgba = encode_png(&DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            2,
            5,
            Rgba([1, 2, 3, 4]),
        )))
        .unwrap();

        assert_eq!(decode_rgb(&gray).unwrap().get_pixel(0, 0), &Rgb([9, 9, 9]));
        assert_eq!(decode_rgb(&gray_alpha).unwrap().dimensions(), (2, 2));
        assert_eq!(decode_rgb(&rgba).unwrap().get_pixel(1, 4), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_digest_display_is_hex() {
        let digest = ContentDigest::of(b"abc");
        assert_eq!(
            digest.to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(CacheState::Empty.lookup(&digest), CacheLookup::Miss);
    }
}
