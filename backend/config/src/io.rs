//! Config file reading.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, info};

use crate::schema::EngineConfig;

/// Load and parse the engine config from disk.
///
/// Returns `Ok(Default::default())` if the file doesn't exist.
pub async fn load_config(path: &Path) -> Result<EngineConfig> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(EngineConfig::default());
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: EngineConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join(format!("plugbus-missing-{}.yaml", uuid::Uuid::new_v4()));
        let cfg = load_config(&path).await.unwrap();
        assert!(cfg.plugins.is_none());
    }

    #[tokio::test]
    async fn malformed_yaml_names_the_file() {
        let path = std::env::temp_dir().join(format!("plugbus-bad-{}.yaml", uuid::Uuid::new_v4()));
        fs::write(&path, "plugins: [unclosed").await.unwrap();
        let err = load_config(&path).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config YAML"));
        fs::remove_file(&path).await.unwrap();
    }
}
