//! HTTP routing: the segmentation endpoint, CORS, and the static front-end.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::api::SegmentPayload;
use crate::config::ServerConfig;
use crate::error::SegmentError;
use crate::predictor::Predictor;
use crate::segmenter::Segmenter;

/// Path of the segmentation endpoint used by the front-end.
pub const SEGMENT_ROUTE: &str = "/backend/sam_trigger";

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Failures surfaced to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    /// The body was not a valid segmentation payload.
    Rejected(JsonRejection),
    Segment(SegmentError),
    /// The blocking worker panicked or was cancelled.
    Internal(String),
}

impl From<SegmentError> for ApiError {
    fn from(err: SegmentError) -> Self {
        ApiError::Segment(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Rejected(rejection) => {
                let status = match rejection.status() {
                    StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, "BAD_REQUEST", rejection.body_text())
            }
            ApiError::Segment(err) => {
                let (status, code) = match &err {
                    SegmentError::Decode(_) => (StatusCode::BAD_REQUEST, "DECODE_ERROR"),
                    SegmentError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
                    SegmentError::EmptyPointSet => (StatusCode::BAD_REQUEST, "EMPTY_POINT_SET"),
                    SegmentError::Predictor(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "PREDICTOR_ERROR")
                    }
                    SegmentError::Geometry(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "GEOMETRY_ERROR")
                    }
                    SegmentError::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ENCODE_ERROR"),
                    SegmentError::Internal(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                    }
                };
                (status, code, err.to_string())
            }
            ApiError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
            }
        };

        if status.is_server_error() {
            error!(%status, code, "{message}");
        } else {
            warn!(%status, code, "{message}");
        }

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        });
        (status, body).into_response()
    }
}

/// Builds the service router around a shared segmenter.
pub fn create_router<P>(segmenter: Arc<Segmenter<P>>, config: &ServerConfig) -> Router
where
    P: Predictor + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    Router::new()
        .route(SEGMENT_ROUTE, post(segment_handler::<P>))
        .route("/health", get(health_handler))
        .with_state(segmenter)
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn segment_handler<P>(
    State(segmenter): State<Arc<Segmenter<P>>>,
    payload: Result<Json<SegmentPayload>, JsonRejection>,
) -> Result<Json<SegmentPayload>, ApiError>
where
    P: Predictor + 'static,
{
    let Json(payload) = payload.map_err(ApiError::Rejected)?;
    let (request, echo) = payload.into_request();
    let points = request.points.len();

    // Prediction and PNG encoding are CPU-bound and may wait on the predictor lock.
    let response = tokio::task::spawn_blocking(move || {
        let segmentation = segmenter.segment(&request)?;
        echo.with_segmentation(segmentation)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("segmentation worker failed: {e}")))??;

    info!(points, contours = response.contours.len(), "segmentation served");
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn error_of(err: SegmentError) -> (StatusCode, ErrorResponse) {
        let response = ApiError::from(err).into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_segment_errors_map_to_status_and_code() {
        let (status, body) = error_of(SegmentError::Internal("no image loaded".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "INTERNAL_ERROR");
        assert_eq!(body.error, "internal error: no image loaded");

        let (status, body) = error_of(SegmentError::InvalidRequest("bad ratio".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "INVALID_REQUEST");

        let (status, body) = error_of(SegmentError::Encode("png".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "ENCODE_ERROR");
    }
}
