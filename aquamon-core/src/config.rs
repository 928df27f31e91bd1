use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

use crate::telemetry::DEFAULT_HISTORY_LIMIT;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConf,
    #[serde(default)]
    pub history: HistoryConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StoreConf {
    pub host: String,
    pub port: u16,
    /// random `aquamon-<uuid>` when absent
    pub client_id: Option<String>,
    /// ex: "plant-01" -> topics "plant-01/telemetry/...", "plant-01/actuators/..."
    #[serde(default = "default_prefix")]
    pub topic_prefix: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HistoryConf {
    /// size of the "last N" telemetry query feeding history
    pub window: usize,
}

fn default_prefix() -> String {
    "aquamon".into()
}

fn default_keep_alive() -> u64 {
    15
}

impl Default for StoreConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: None,
            topic_prefix: default_prefix(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

impl Default for HistoryConf {
    fn default() -> Self {
        Self {
            window: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Lit `AQUAMON_CONFIG` (défaut `aquamon.yaml`)
pub async fn load_config() -> AppConfig {
    let path = std::env::var("AQUAMON_CONFIG").unwrap_or_else(|_| "aquamon.yaml".into());
    load_config_from(&path).await
}

pub async fn load_config_from<P: AsRef<Path>>(path: P) -> AppConfig {
    let path = path.as_ref();
    if !path.exists() {
        warn!("[config] no {}, using defaults", path.display());
        return AppConfig::default();
    }
    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return AppConfig::default();
    }
    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        warn!("[config] invalid {}: {e}", path.display());
        AppConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let cfg = load_config_from("/definitely/not/here.yaml").await;
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.history.window, 50);
        assert_eq!(cfg.store.port, 1883);
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "store:\n  host: broker.lan\n  port: 8883\n  topic_prefix: plant-01").unwrap();

        let cfg = load_config_from(file.path()).await;
        assert_eq!(cfg.store.host, "broker.lan");
        assert_eq!(cfg.store.port, 8883);
        assert_eq!(cfg.store.topic_prefix, "plant-01");
        assert_eq!(cfg.store.keep_alive_secs, 15);
        assert_eq!(cfg.history.window, 50);
    }

    #[tokio::test]
    async fn test_invalid_file_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "store: [not, a, map").unwrap();
        assert_eq!(load_config_from(file.path()).await, AppConfig::default());
    }
}
