use crate::error::PredictorError;
use std::path::{Path, PathBuf};

/// Where the ONNX weights live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Local(PathBuf),
    Remote(String),
}

impl ModelSource {
    pub fn parse(raw: &str, base_dir: &Path) -> Result<Self, PredictorError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PredictorError::Config("model.weights must not be empty".into()));
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(ModelSource::Remote(raw.to_string()));
        }
        Ok(ModelSource::Local(base_dir.join(raw)))
    }

    /// Returns a local path to the weights, downloading them into `cache_dir` first if needed.
    pub async fn resolve(&self, cache_dir: &Path) -> Result<PathBuf, PredictorError> {
        match self {
            ModelSource::Local(path) => {
                if !path.exists() {
                    return Err(PredictorError::Config(format!(
                        "Model file not found: {:?}",
                        path
                    )));
                }
                Ok(path.clone())
            }
            ModelSource::Remote(url) => {
                let target = cache_dir.join(cached_file_name(url)?);
                if target.exists() {
                    tracing::info!("Using cached weights at {}", target.display());
                    return Ok(target);
                }
                download(url, &target).await?;
                Ok(target)
            }
        }
    }
}

fn cached_file_name(url: &str) -> Result<String, PredictorError> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && !name.contains(':'))
        .map(str::to_string)
        .ok_or_else(|| PredictorError::Config(format!("Cannot derive a file name from {}", url)))
}

async fn download(url: &str, target: &Path) -> Result<(), PredictorError> {
    let download_error = |reason: String| PredictorError::Download {
        url: url.to_string(),
        reason,
    };

    tracing::info!("Downloading weights from {}", url);
    let response = reqwest::get(url)
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|e| download_error(e.to_string()))?;
    let body = response
        .bytes()
        .await
        .map_err(|e| download_error(e.to_string()))?;

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Write next to the target and rename so an interrupted download never looks cached.
    let partial = target.with_extension("part");
    tokio::fs::write(&partial, &body).await?;
    tokio::fs::rename(&partial, target).await?;

    tracing::info!("Weights downloaded to {} ({} bytes)", target.display(), body.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sources() {
        let base = Path::new("/etc/fire");
        assert_eq!(
            ModelSource::parse("model.onnx", base).unwrap(),
            ModelSource::Local(PathBuf::from("/etc/fire/model.onnx"))
        );
        assert_eq!(
            ModelSource::parse("/opt/model.onnx", base).unwrap(),
            ModelSource::Local(PathBuf::from("/opt/model.onnx"))
        );
        assert_eq!(
            ModelSource::parse("https://host/models/fire.onnx", base).unwrap(),
            ModelSource::Remote("https://host/models/fire.onnx".into())
        );
        assert!(ModelSource::parse("  ", base).is_err());
    }

    #[test]
    fn test_cached_file_name() {
        assert_eq!(
            cached_file_name("https://host/models/fire.onnx?download=1").unwrap(),
            "fire.onnx"
        );
        assert!(cached_file_name("https://host/models/").is_err());
    }

    #[tokio::test]
    async fn test_resolve_uses_cached_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fire.onnx"), b"onnx").unwrap();

        let source = ModelSource::Remote("https://unreachable.invalid/fire.onnx".into());
        let path = source.resolve(dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join("fire.onnx"));
    }

    #[tokio::test]
    async fn test_resolve_missing_local_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = ModelSource::Local(dir.path().join("absent.onnx"));
        assert!(source.resolve(dir.path()).await.is_err());
    }
}
