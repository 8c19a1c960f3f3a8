use crate::types::*;
use score_annotate::FRAME_INTERVAL;
use score_cache::{DEFAULT_PREVIEW_BOX, DisplayMetrics, Size};
use score_store::DEFAULT_DB_NAME;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "sheet-reader";

/// Where parts are downloaded from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RemoteSource {
    /// Object storage reachable over HTTP
    Http { base_url: String },
    /// Local mirror of the bucket
    Directory { path: PathBuf },
}

/// Reader configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Root of the local stores
    pub data_dir: PathBuf,
    pub db_name: String,
    pub remote: RemoteSource,
    /// Signed-in user, annotations go to the anonymous namespace when unset
    pub user_id: Option<String>,
    pub display: DisplayMetrics,
    pub preview_box: Size,
    /// Frame interval of the annotation redraw loop
    pub redraw_interval_ms: u64,
    /// Directory holding the PDFium library, if not installed system-wide
    pub pdfium_library_dir: Option<PathBuf>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        Self {
            remote: RemoteSource::Directory {
                path: data_dir.join("mirror"),
            },
            data_dir,
            db_name: DEFAULT_DB_NAME.to_string(),
            user_id: None,
            display: DisplayMetrics::default(),
            preview_box: DEFAULT_PREVIEW_BOX,
            redraw_interval_ms: FRAME_INTERVAL.as_millis() as u64,
            pdfium_library_dir: None,
        }
    }
}

impl ReaderConfig {
    /// Default location of the config file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Load configuration from JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let config: Self = serde_json::from_slice(&bytes)
            .map_err(|e| RuntimeError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await? {
            Self::load(path).await
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to JSON file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RuntimeError::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.db_name.is_empty() {
            return Err(RuntimeError::Config("db_name must not be empty".to_string()));
        }
        let d = &self.display;
        if !(d.width > 0.0 && d.height > 0.0 && d.density > 0.0) {
            return Err(RuntimeError::Config(format!(
                "display metrics must be positive, got {}x{} @{}",
                d.width, d.height, d.density
            )));
        }
        if !(self.preview_box.width > 0.0 && self.preview_box.height > 0.0) {
            return Err(RuntimeError::Config("preview box must be positive".to_string()));
        }
        if self.redraw_interval_ms == 0 {
            return Err(RuntimeError::Config(
                "redraw_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn redraw_interval(&self) -> Duration {
        Duration::from_millis(self.redraw_interval_ms)
    }
}
