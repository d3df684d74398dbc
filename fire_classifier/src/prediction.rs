use crate::{
    config::{ClassesConfig, OutputKind},
    error::PredictorError,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, io::Read};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: String,
    pub probability: f32,
    pub fire_probability: f32,
    pub probabilities: BTreeMap<String, f32>,
}

#[async_trait]
pub trait Predictor: Send + Sync + 'static {
    async fn predict(&self, image: Bytes) -> Result<PredictionResult, PredictorError>;

    /// Reads an open binary stream to the end and classifies its contents.
    async fn predict_from_reader(
        &self,
        reader: &mut (dyn Read + Send),
    ) -> Result<PredictionResult, PredictorError> {
        let mut image_data = Vec::new();
        reader.read_to_end(&mut image_data)?;
        self.predict(Bytes::from(image_data)).await
    }
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Turns one row of raw model scores into a labelled result.
pub fn scores_to_prediction(
    scores: &[f32],
    output: OutputKind,
    classes: &ClassesConfig,
) -> Result<PredictionResult, PredictorError> {
    if scores.len() != classes.names.len() {
        return Err(PredictorError::OutputShape(format!(
            "expected {} scores, got {}",
            classes.names.len(),
            scores.len()
        )));
    }

    let probabilities = match output {
        OutputKind::Logits => softmax(scores),
        OutputKind::Probabilities => scores.to_vec(),
    };

    let (best, probability) = probabilities
        .iter()
        .copied()
        .enumerate()
        .reduce(|accum, row| if row.1 > accum.1 { row } else { accum })
        .ok_or_else(|| PredictorError::OutputShape("empty output".into()))?;

    let positive = classes
        .positive_index()
        .ok_or_else(|| PredictorError::Config(format!("unknown class {}", classes.positive)))?;

    Ok(PredictionResult {
        label: classes.names[best].clone(),
        probability,
        fire_probability: probabilities[positive],
        probabilities: classes
            .names
            .iter()
            .cloned()
            .zip(probabilities.iter().copied())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io, sync::Mutex};

    #[derive(Default)]
    struct RecordingPredictor {
        received: Mutex<Vec<Bytes>>,
    }

    #[async_trait]
    impl Predictor for RecordingPredictor {
        async fn predict(&self, image: Bytes) -> Result<PredictionResult, PredictorError> {
            self.received.lock().unwrap().push(image);
            scores_to_prediction(&[0.6, 0.4], OutputKind::Probabilities, &classes())
        }
    }

    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "upload interrupted"))
        }
    }

    fn classes() -> ClassesConfig {
        ClassesConfig {
            names: vec!["fire".into(), "no_fire".into()],
            positive: "fire".into(),
        }
    }

    #[tokio::test]
    async fn test_predict_from_reader_forwards_stream_contents() {
        let predictor = RecordingPredictor::default();
        let mut reader = io::Cursor::new(b"\xff\xd8 jpeg bytes".to_vec());

        let prediction = predictor.predict_from_reader(&mut reader).await.unwrap();

        assert_eq!(prediction.label, "fire");
        let received = predictor.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].as_ref(), b"\xff\xd8 jpeg bytes");
    }

    #[tokio::test]
    async fn test_predict_from_reader_maps_read_failure_to_io() {
        let predictor = RecordingPredictor::default();

        let result = predictor.predict_from_reader(&mut BrokenReader).await;

        assert!(matches!(result, Err(PredictorError::Io(_))));
        assert!(predictor.received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_softmax_sums_to_one_and_keeps_order() {
        let probs = softmax(&[2.0, 1.0, -3.0]);
        let sum: f32 = probs.iter().sum();

        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);
    }

    #[test]
    fn test_softmax_handles_large_logits() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_logits_to_prediction() {
        let prediction = scores_to_prediction(&[-1.0, 3.0], OutputKind::Logits, &classes()).unwrap();

        assert_eq!(prediction.label, "no_fire");
        assert!(prediction.probability > 0.98);
        assert!((prediction.fire_probability + prediction.probability - 1.0).abs() < 1e-6);
        assert_eq!(prediction.probabilities.len(), 2);
    }

    #[test]
    fn test_probabilities_pass_through() {
        let prediction =
            scores_to_prediction(&[0.9, 0.1], OutputKind::Probabilities, &classes()).unwrap();

        assert_eq!(prediction.label, "fire");
        assert_eq!(prediction.fire_probability, 0.9);
        assert_eq!(prediction.probabilities["no_fire"], 0.1);
    }

    #[test]
    fn test_score_count_must_match_classes() {
        let result = scores_to_prediction(&[0.2, 0.3, 0.5], OutputKind::Probabilities, &classes());
        assert!(matches!(result, Err(PredictorError::OutputShape(_))));
    }

    #[test]
    fn test_result_serializes_as_json_object() {
        let prediction =
            scores_to_prediction(&[0.75, 0.25], OutputKind::Probabilities, &classes()).unwrap();
        let json = serde_json::to_value(&prediction).unwrap();

        assert_eq!(json["label"], "fire");
        assert_eq!(json["fire_probability"], 0.75);
        assert_eq!(json["probabilities"]["no_fire"], 0.25);
    }
}
