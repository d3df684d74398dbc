use crate::{error::PredictorError, weights::ModelSource};
use serde::Deserialize;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

#[derive(Debug, Deserialize, Clone)]
pub struct PredictorConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub image: ImageConfig,
    pub classes: ClassesConfig,
    /// Directory of the YAML file; relative weight paths resolve against it.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub weights: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    #[serde(default = "default_output_name")]
    pub output_name: String,
    #[serde(default)]
    pub output: OutputKind,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    #[default]
    Logits,
    Probabilities,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImageConfig {
    #[serde(default = "default_image_size")]
    pub size: u32,
    #[serde(default = "default_mean")]
    pub mean: [f32; 3],
    #[serde(default = "default_std")]
    pub std: [f32; 3],
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            size: default_image_size(),
            mean: default_mean(),
            std: default_std(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassesConfig {
    pub names: Vec<String>,
    pub positive: String,
}

impl ClassesConfig {
    pub fn positive_index(&self) -> Option<usize> {
        self.names.iter().position(|name| name == &self.positive)
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("models/.cache")
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(5)
}

fn default_input_name() -> String {
    "input".into()
}

fn default_output_name() -> String {
    "output".into()
}

fn default_image_size() -> u32 {
    224
}

fn default_mean() -> [f32; 3] {
    [0.485, 0.456, 0.406]
}

fn default_std() -> [f32; 3] {
    [0.229, 0.224, 0.225]
}

impl PredictorConfig {
    pub fn model_source(&self) -> Result<ModelSource, PredictorError> {
        ModelSource::parse(&self.model.weights, &self.base_dir)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.base_dir.join(&self.model.cache_dir)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.classes.names.is_empty() {
            return Err("classes.names must not be empty".into());
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = self.classes.names.iter().find(|name| !seen.insert(*name)) {
            return Err(format!("Duplicate class name: {}", duplicate));
        }
        if self.classes.positive_index().is_none() {
            return Err(format!(
                "Positive class {:?} is not one of {:?}",
                self.classes.positive, self.classes.names
            ));
        }
        if self.image.size == 0 {
            return Err("image.size must be greater than zero".into());
        }
        if self.image.std.iter().any(|s| *s == 0.0) {
            return Err("image.std components must be non-zero".into());
        }
        if self.model.num_instances == 0 {
            return Err("model.num_instances must be greater than zero".into());
        }
        if let Ok(ModelSource::Local(path)) = self.model_source() {
            if !path.exists() {
                return Err(format!("Model file not found: {:?}", path));
            }
        }
        Ok(())
    }
}

pub fn load_predictor_config(path: &Path) -> Result<PredictorConfig, PredictorError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .build()?;

    let mut predictor_config = settings.try_deserialize::<PredictorConfig>()?;
    predictor_config.base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    if let Err(e) = predictor_config.validate() {
        tracing::error!("Predictor configuration validation failed: {}", e);
        return Err(PredictorError::Config(e));
    }

    Ok(predictor_config)
}
