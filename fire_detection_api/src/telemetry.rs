use crate::config::LogLevel;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// The HTTP metrics layer reads the global meter provider when it is built, so the
// provider behind `/metrics` has to be installed once per process.
static METRICS: Mutex<Option<Arc<Metrics>>> = Mutex::new(None);

pub struct Metrics {
    request_counter: Counter<u64>,
    prediction_duration: Histogram<u64>,
    prediction_failures: Counter<u64>,
    pub registry: Registry,
}

impl Metrics {
    /// Returns the process-wide metrics, installing the Prometheus-backed global provider on first use.
    pub fn global() -> anyhow::Result<Arc<Self>> {
        let mut installed = METRICS
            .lock()
            .map_err(|e| anyhow::anyhow!("metrics lock poisoned: {}", e))?;
        if let Some(metrics) = installed.as_ref() {
            return Ok(metrics.clone());
        }

        let metrics = Arc::new(Self::install()?);
        *installed = Some(metrics.clone());
        Ok(metrics)
    }

    fn install() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("fire_detection_api");
        global::set_meter_provider(provider);

        // The exporter appends `_total` to counters.
        let request_counter = meter
            .u64_counter("requests")
            .with_description("Total number of requests")
            .build();

        let prediction_duration = meter
            .u64_histogram("prediction_duration_ms")
            .with_boundaries(latency_boundaries(5.0, 2.0, 10))
            .with_description("Duration of image classification in milliseconds")
            .build();

        let prediction_failures = meter
            .u64_counter("prediction_failures")
            .with_description("Classification requests that returned an error")
            .build();

        Ok(Metrics {
            request_counter,
            prediction_duration,
            prediction_failures,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = [KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_prediction_duration(&self, duration_ms: u64, route: &str) {
        let attributes = [KeyValue::new("route", route.to_string())];
        self.prediction_duration.record(duration_ms, &attributes);
    }

    pub fn record_prediction_failure(&self, route: &str, client_error: bool) {
        let attributes = [
            KeyValue::new("route", route.to_string()),
            KeyValue::new("client_error", client_error),
        ];
        self.prediction_failures.add(1, &attributes);
    }
}

/// Installs the JSON subscriber. `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(log_level: LogLevel) {
    let default_directive = format!("{},ort=info", log_level.as_str());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_level(true)
                .with_current_span(true),
        )
        .init();
}

/// Exponential histogram boundaries: `start`, `start * factor`, ... (`count` values).
fn latency_boundaries(start: f64, factor: f64, count: usize) -> Vec<f64> {
    std::iter::successors(Some(start), |bound| Some(bound * factor))
        .take(count)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_boundaries() {
        assert_eq!(
            latency_boundaries(5.0, 2.0, 5),
            vec![5.0, 10.0, 20.0, 40.0, 80.0]
        );
        assert!(latency_boundaries(5.0, 2.0, 0).is_empty());
    }

    #[test]
    fn test_global_metrics_are_shared() {
        let first = Metrics::global().unwrap();
        let second = Metrics::global().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
