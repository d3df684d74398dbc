use crate::{config::Config, server::HttpServer};
use fire_classifier::{OrtPredictor, Predictor};
use std::{path::Path, sync::Arc};
use tokio::signal;

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let predictor = load_predictor(&config.predictor.config_path).await?;

    let server = HttpServer::new(predictor, &config).await?;

    server
        .run(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown.");
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Builds the single predictor shared by every request; any failure here aborts startup.
pub async fn load_predictor(config_path: &Path) -> anyhow::Result<Arc<dyn Predictor>> {
    match OrtPredictor::from_config_file(config_path).await {
        Ok(predictor) => Ok(Arc::new(predictor)),
        Err(e) => {
            tracing::error!("Failed to initialize predictor: {}", e);
            Err(e.into())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_predictor_config_aborts_startup() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_predictor(&dir.path().join("config.yaml")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_predictor_config_aborts_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "model:\n  weights: absent.onnx\nclasses:\n  names: [fire, no_fire]\n  positive: fire\n",
        )
        .unwrap();

        let err = load_predictor(&path).await.err().unwrap();
        assert!(err.to_string().contains("Model file not found"));
    }

    #[test]
    fn test_shipped_predictor_config_is_valid_once_weights_exist() {
        let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("app/config.yaml");
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("app")).unwrap();
        std::fs::create_dir_all(dir.path().join("models")).unwrap();
        std::fs::copy(&shipped, dir.path().join("app/config.yaml")).unwrap();
        std::fs::write(dir.path().join("models/fire_classifier.onnx"), b"onnx").unwrap();

        let config =
            fire_classifier::config::load_predictor_config(&dir.path().join("app/config.yaml"))
                .unwrap();

        assert_eq!(config.classes.positive, "fire");
        assert_eq!(config.image.size, 224);
    }
}
