//! Point-prompted image segmentation served over HTTP.
//!
//! A client sends an image and a handful of include/exclude clicks; the service runs a
//! promptable [`predictor::Predictor`], binarizes its best mask and traces the mask into
//! polygons ranked by pixel area. Image embeddings are kept in a single-slot,
//! content-addressed [`cache::EmbeddingCache`] so refinement clicks on the same image
//! skip the expensive embedding step.
//!
//! The pipeline stages are organized into modules roughly in the order a request
//! passes through them.

pub mod api;
pub mod area;
pub mod cache;
pub mod config;
pub mod contours;
pub mod error;
pub mod invoker;
pub mod polygon;
pub mod predictor;
pub mod raster;
pub mod rect;
pub mod render;
pub mod segmenter;
pub mod server;

pub use error::{ConfigError, PredictorError, Result, SegmentError};
pub use polygon::PolygonResult;
pub use segmenter::{Segmentation, SegmentationRequest, Segmenter};
