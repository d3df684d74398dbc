use crate::{
    config::{load_predictor_config, PredictorConfig},
    error::PredictorError,
    prediction::{scores_to_prediction, PredictionResult, Predictor},
    preprocess::image_to_tensor,
};
use async_trait::async_trait;
use bytes::Bytes;
use ndarray::{Array, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Instant,
};

/// ONNX Runtime classifier backed by a round-robin pool of sessions.
#[derive(Clone)]
pub struct OrtPredictor {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    config: Arc<PredictorConfig>,
}

impl OrtPredictor {
    /// Loads the predictor YAML at `path`, resolves the weights and builds the session pool.
    pub async fn from_config_file(path: impl AsRef<Path>) -> Result<Self, PredictorError> {
        let path = path.as_ref();
        tracing::info!("Loading predictor configuration from {}", path.display());
        let config = load_predictor_config(path)?;
        let model_path = config
            .model_source()?
            .resolve(&config.cache_dir())
            .await?;
        Self::new(config, &model_path)
    }

    pub fn new(config: PredictorConfig, model_path: &Path) -> Result<Self, PredictorError> {
        let num_instances = config.model.num_instances;
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_path)?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!(
            "Created {} ONNX sessions from {}",
            num_instances,
            model_path.display()
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            config: Arc::new(config),
        })
    }

    fn classify(&self, image_data: &[u8]) -> Result<PredictionResult, PredictorError> {
        let start = Instant::now();
        let input = image_to_tensor(image_data, &self.config.image)?;
        let scores = self.run_inference(&input)?;
        let prediction = scores_to_prediction(&scores, self.config.model.output, &self.config.classes)?;

        tracing::debug!(
            label = %prediction.label,
            probability = prediction.probability,
            fire_probability = prediction.fire_probability,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Image classified"
        );
        Ok(prediction)
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, PredictorError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| PredictorError::Inference(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);
        let input_view = input.as_standard_layout();
        let tensor_ref = TensorRef::from_array_view(input_view.view())?;
        let outputs = session.run(ort::inputs![self.config.model.input_name.as_str() => tensor_ref])?;

        let output_name = self.config.model.output_name.as_str();
        let output = outputs.get(output_name).ok_or_else(|| {
            PredictorError::OutputShape(format!("model has no output named {:?}", output_name))
        })?;
        let (_shape, data) = output.try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }
}

#[async_trait]
impl Predictor for OrtPredictor {
    async fn predict(&self, image: Bytes) -> Result<PredictionResult, PredictorError> {
        let predictor = self.clone();
        tokio::task::spawn_blocking(move || predictor.classify(&image))
            .await
            .map_err(|e| PredictorError::Inference(format!("inference task failed: {}", e)))?
    }
}
