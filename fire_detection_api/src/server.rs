use crate::{config::Config, routes::api_routes, telemetry::Metrics};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use fire_classifier::Predictor;
use std::{future::Future, sync::Arc};
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct SharedState {
    pub predictor: Arc<dyn Predictor>,
    pub metrics: Arc<Metrics>,
}

pub fn build_router(state: SharedState, max_body_bytes: usize) -> Router {
    let metrics_layer = HttpMetricsLayerBuilder::new().build();

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(metrics_layer)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(predictor: Arc<dyn Predictor>, config: &Config) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let app_state = SharedState {
            predictor,
            metrics: Metrics::global()?,
        };
        let router = build_router(app_state, config.upload.max_body_bytes);

        let listener = TcpListener::bind(&addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
