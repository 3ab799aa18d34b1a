use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    DEFAULT_JPEG_QUALITY, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS, DEFAULT_TARGET_FPS,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tuning knobs of the real-time loop. Missing fields take their defaults
/// when loaded from JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    /// Frames per second the loop attempts.
    pub target_fps: u32,
    /// Consecutive failures per tick before the loop gives up.
    pub max_retries: u32,
    /// Pause between retries of the same tick.
    pub retry_delay_ms: u64,
    pub jpeg_quality: u8,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ProcessorConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_fps == 0 {
            return Err(ConfigError::Invalid {
                field: "target_fps",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid {
                field: "max_retries",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid {
                field: "jpeg_quality",
                reason: format!("must be between 1 and 100, got {}", self.jpeg_quality),
            });
        }
        Ok(())
    }

    /// `1000 / target_fps` ms. Assumes a validated config.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = ProcessorConfig::default();
        assert_eq!(config.target_fps, 30);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 1000);
        assert_eq!(config.jpeg_quality, 92);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case(30, 33_333)]
    #[case(1, 1_000_000)]
    #[case(100, 10_000)]
    fn test_frame_interval(#[case] fps: u32, #[case] expected_micros: u128) {
        let config = ProcessorConfig {
            target_fps: fps,
            ..ProcessorConfig::default()
        };
        assert_eq!(config.frame_interval().as_micros(), expected_micros);
    }

    #[rstest]
    #[case::zero_fps(ProcessorConfig { target_fps: 0, ..ProcessorConfig::default() }, "target_fps")]
    #[case::zero_retries(ProcessorConfig { max_retries: 0, ..ProcessorConfig::default() }, "max_retries")]
    #[case::zero_quality(ProcessorConfig { jpeg_quality: 0, ..ProcessorConfig::default() }, "jpeg_quality")]
    #[case::quality_too_high(ProcessorConfig { jpeg_quality: 101, ..ProcessorConfig::default() }, "jpeg_quality")]
    fn test_validate_rejects(#[case] config: ProcessorConfig, #[case] expected_field: &str) {
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected_field),
            other => panic!("expected invalid {expected_field}, got {other:?}"),
        }
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"target_fps": 10, "retry_delay_ms": 250}"#).unwrap();

        let config = ProcessorConfig::load(&path).unwrap();
        assert_eq!(config.target_fps, 10);
        assert_eq!(config.retry_delay(), Duration::from_millis(250));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_load_rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"target_fsp": 10}"#).unwrap();
        assert!(matches!(
            ProcessorConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"max_retries": 0}"#).unwrap();
        assert!(matches!(
            ProcessorConfig::load(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ProcessorConfig::load(Path::new("/nonexistent/config.json")),
            Err(ConfigError::Read { .. })
        ));
    }
}
