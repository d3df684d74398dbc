use crate::server::SharedState;
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use fire_classifier::{PredictionResult, PredictorError};
use serde_json::json;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

const ROUTE: &str = "/classify-image/";
const FILE_FIELD: &str = "file";

#[derive(Error, Debug)]
pub enum ClassifyImageError {
    #[error("Missing required form field `{0}`")]
    MissingField(&'static str),
    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("{0}")]
    Predictor(#[from] PredictorError),
}

impl ClassifyImageError {
    fn status(&self) -> StatusCode {
        match self {
            ClassifyImageError::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ClassifyImageError::Multipart(e) => e.status(),
            ClassifyImageError::Predictor(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ClassifyImageError::Predictor(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ClassifyImageError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Server-side failures are logged in full but only described generically to the client.
        let detail = if status.is_server_error() {
            tracing::error!("Image classification failed: {}", self);
            "Internal server error".to_string()
        } else {
            tracing::warn!("Rejected classification request: {}", self);
            self.to_string()
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// Classifies the image uploaded in the `file` form field.
#[instrument(skip(state, multipart))]
pub async fn classify_image(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<PredictionResult>, ClassifyImageError> {
    state.metrics.record_request(ROUTE);

    let image = read_file_field(&mut multipart)
        .await?
        .ok_or(ClassifyImageError::MissingField(FILE_FIELD))?;

    let start = Instant::now();
    let result = state.predictor.predict(image).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    state.metrics.record_prediction_duration(elapsed_ms, ROUTE);

    match result {
        Ok(prediction) => {
            tracing::debug!(
                label = %prediction.label,
                fire_probability = prediction.fire_probability,
                elapsed_ms,
                "Prediction served"
            );
            Ok(Json(prediction))
        }
        Err(e) => {
            state
                .metrics
                .record_prediction_failure(ROUTE, e.is_client_error());
            Err(e.into())
        }
    }
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Option<Bytes>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            return field.bytes().await.map(Some);
        }
    }
    Ok(None)
}
