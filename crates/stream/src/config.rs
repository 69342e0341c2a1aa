use std::path::Path;

use serde::{Deserialize, Serialize};
use tilestream_tiling::{MAXIMUM_TILE_LEVEL, TilingScheme};

/// Errors from loading or validating scheduler configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Tuning knobs for the tile scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Largest projected error, in pixels, a tile may show without refining.
    pub maximum_screen_space_error: f64,
    /// Coarsest level eligible for selection. Coarser tiles always refine.
    pub minimum_level: u32,
    /// Tiles at this level are selected without refining further.
    pub maximum_level: u32,
    /// Number of tiles the LRU queue keeps once older tiles are eligible for eviction.
    pub tile_cache_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            maximum_screen_space_error: 2.0,
            minimum_level: 0,
            maximum_level: 20,
            tile_cache_size: 100,
        }
    }
}

impl SchedulerConfig {
    /// Load and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sse = self.maximum_screen_space_error;
        if sse.is_nan() || sse <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "maximum_screen_space_error must be positive, got {}",
                self.maximum_screen_space_error
            )));
        }
        if self.minimum_level > self.maximum_level {
            return Err(ConfigError::Invalid(format!(
                "minimum_level {} exceeds maximum_level {}",
                self.minimum_level, self.maximum_level
            )));
        }
        if self.maximum_level > MAXIMUM_TILE_LEVEL {
            return Err(ConfigError::Invalid(format!(
                "maximum_level {} is deeper than the addressable level {MAXIMUM_TILE_LEVEL}",
                self.maximum_level
            )));
        }
        Ok(())
    }

    /// [`SchedulerConfig::validate`], plus the levels `tiling` can address.
    pub fn validate_for(&self, tiling: &dyn TilingScheme) -> Result<(), ConfigError> {
        self.validate()?;
        let deepest = tiling.maximum_level();
        if self.maximum_level > deepest {
            return Err(ConfigError::Invalid(format!(
                "maximum_level {} is deeper than the tiling scheme's level {deepest}",
                self.maximum_level
            )));
        }
        Ok(())
    }
}
