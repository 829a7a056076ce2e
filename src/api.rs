//! JSON payload exchanged with the browser front-end.
//!
//! The response is the request object echoed back with `image` replaced by the mask PNG
//! and `contours` filled in.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::invoker::PromptPoint;
use crate::polygon::PolygonResult;
use crate::render::render_mask_png;
use crate::segmenter::{Segmentation, SegmentationRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Include,
    Exclude,
}

/// A clicked point, normalized to `0.0..=1.0` in both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WirePoint {
    pub x: f64,
    pub y: f64,
    pub category: Category,
}

impl From<WirePoint> for PromptPoint {
    fn from(point: WirePoint) -> Self {
        PromptPoint {
            x: point.x,
            y: point.y,
            include: point.category == Category::Include,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentPayload {
    /// The points of interest to segment with.
    pub points: Vec<WirePoint>,
    /// Image bytes; a base64 string (optionally a `data:` URL) on the wire.
    #[serde(with = "base64_image")]
    pub image: Vec<u8>,
    #[serde(default)]
    pub threshold: f32,
    #[serde(default)]
    pub area_ratio: f64,
    #[serde(default)]
    pub contours: Vec<PolygonResult>,
}

impl SegmentPayload {
    /// Splits the payload into a pipeline request and the echo that becomes the response.
    ///
    /// The image bytes move into the request; the echo keeps everything else.
    pub fn into_request(mut self) -> (SegmentationRequest, SegmentPayload) {
        let request = SegmentationRequest {
            points: self.points.iter().copied().map(PromptPoint::from).collect(),
            image: std::mem::take(&mut self.image),
            threshold: self.threshold,
            area_ratio: self.area_ratio,
            multimask: false,
        };
        (request, self)
    }

    /// Fills the echo with a segmentation result.
    ///
    /// `None` (no points were given) produces an empty `image` and no contours.
    pub fn with_segmentation(mut self, segmentation: Option<Segmentation>) -> Result<Self> {
        match segmentation {
            Some(segmentation) => {
                self.image = render_mask_png(&segmentation.mask)?;
                self.contours = segmentation.polygons;
            }
            None => {
                self.image.clear();
                self.contours.clear();
            }
        }
        Ok(self)
    }
}

/// Decodes an `image` field: plain base64, or a `data:<mime>;base64,<payload>` URL.
pub fn decode_image_field(text: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    let encoded = match text.strip_prefix("data:") {
        Some(url) => url.split_once(',').map_or(url, |(_, data)| data),
        None => text,
    };
    STANDARD.decode(encoded.trim())
}

mod base64_image {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        super::decode_image_field(&text)
            .map_err(|e| D::Error::custom(format!("invalid base64 image: {e}")))
    }
}
