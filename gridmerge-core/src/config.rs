//! Merge Configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use image::imageops::FilterType;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConfig {
    /// Upper bound on fetch tasks in flight at once, clamped to 1..=Semaphore::MAX_PERMITS
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Applied to the HTTP transport only; unset means no client-side bound
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub resize_filter: ResizeFilter,
    /// Policy cap on `width * height`, not a measure of available memory.
    /// Larger canvases are refused with `CompositeFailure` before any fetch;
    /// raise it for legitimately bigger outputs.
    #[serde(default = "default_max_canvas_pixels")]
    pub max_canvas_pixels: u64,
}

fn default_max_concurrency() -> usize { 8 }
fn default_user_agent() -> String { format!("gridmerge/{}", crate::ENGINE_VERSION) }
fn default_max_canvas_pixels() -> u64 { 8192 * 8192 }

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            request_timeout_secs: None,
            user_agent: default_user_agent(),
            resize_filter: ResizeFilter::default(),
            max_canvas_pixels: default_max_canvas_pixels(),
        }
    }
}

impl MergeConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: MergeConfig = serde_json::from_str(r#"{"maxConcurrency": 2}"#).unwrap();
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.resize_filter, ResizeFilter::Triangle);
        assert_eq!(config.max_canvas_pixels, 8192 * 8192);
        assert!(config.user_agent.starts_with("gridmerge/"));
        assert!(config.request_timeout_secs.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"resizeFilter": "catmullrom", "requestTimeoutSecs": 15}}"#).unwrap();

        let config = MergeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.resize_filter, ResizeFilter::CatmullRom);
        assert_eq!(config.request_timeout_secs, Some(15));
        assert_eq!(config.max_concurrency, 8);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MergeConfig::load_from_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_unknown_filter_rejected() {
        let err = serde_json::from_str::<MergeConfig>(r#"{"resizeFilter": "bicubic"}"#);
        assert!(err.is_err());
    }
}
