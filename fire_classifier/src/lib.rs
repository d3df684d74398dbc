mod ort_predictor;
mod preprocess;
mod weights;

pub mod config;
pub mod error;
pub mod prediction;

pub use error::PredictorError;
pub use ort_predictor::OrtPredictor;
pub use prediction::{PredictionResult, Predictor};
pub use weights::ModelSource;
