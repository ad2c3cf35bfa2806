//! Engine configuration
//!
//! All tunables live in one serializable tree loadable from a TOML file.
//! Every field has a sensible default so an empty file (or none at all) gives
//! a working engine; `validate` catches the values that would misbehave at
//! runtime.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is outside its meaningful range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How the frame phases are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadingModel {
    /// Update, cull, and draw run sequentially on the calling thread
    #[default]
    SingleThreaded,
    /// Draw of frame N overlaps update/cull of frame N+1 on a draw thread
    DrawThreaded,
}

/// Cull traversal tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CullConfig {
    /// Multiplier on eye distances fed to LOD selection; values above 1.0
    /// bias toward coarser levels
    pub lod_scale: f32,

    /// Skip drawables whose bounding radius over eye distance falls below
    /// this ratio; 0.0 disables small-feature culling
    pub small_feature_ratio: f32,
}

impl Default for CullConfig {
    fn default() -> Self {
        Self {
            lod_scale: 1.0,
            small_feature_ratio: 0.0,
        }
    }
}

/// Database pager tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PagerConfig {
    /// Background loader threads
    pub worker_threads: usize,

    /// Upper bound on subgraphs merged per frame boundary; keeps a burst of
    /// completed loads from stretching one frame
    pub max_merges_per_frame: usize,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 1,
            max_merges_per_frame: 8,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frame phase scheduling
    pub threading: ThreadingModel,

    /// Cull traversal tuning
    pub cull: CullConfig,

    /// Database pager tuning
    pub pager: PagerConfig,
}

impl EngineConfig {
    /// Load a configuration from a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.cull.lod_scale.is_finite() || self.cull.lod_scale <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "cull.lod_scale must be positive, got {}",
                self.cull.lod_scale
            )));
        }
        if !self.cull.small_feature_ratio.is_finite() || self.cull.small_feature_ratio < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "cull.small_feature_ratio must be >= 0, got {}",
                self.cull.small_feature_ratio
            )));
        }
        if self.pager.worker_threads == 0 {
            return Err(ConfigError::Invalid(
                "pager.worker_threads must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            threading = "draw_threaded"

            [cull]
            lod_scale = 2.0
            "#,
        )
        .unwrap();
        assert_eq!(config.threading, ThreadingModel::DrawThreaded);
        assert!((config.cull.lod_scale - 2.0).abs() < f32::EPSILON);
        // untouched sections keep their defaults
        assert_eq!(config.pager.worker_threads, 1);
    }

    #[test]
    fn test_invalid_lod_scale_rejected() {
        let config = EngineConfig {
            cull: CullConfig {
                lod_scale: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
