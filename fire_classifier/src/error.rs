use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictorError {
    #[error("Invalid predictor configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to download weights from {url}: {reason}")]
    Download { url: String, reason: String },
    #[error("Error decoding image: {0}")]
    InvalidImage(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Unexpected model output: {0}")]
    OutputShape(String),
}

impl PredictorError {
    /// Whether the failure was caused by the submitted image rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PredictorError::InvalidImage(_))
    }
}

impl From<config::ConfigError> for PredictorError {
    fn from(err: config::ConfigError) -> Self {
        PredictorError::Config(err.to_string())
    }
}

impl From<ort::Error> for PredictorError {
    fn from(err: ort::Error) -> Self {
        PredictorError::Inference(err.to_string())
    }
}
