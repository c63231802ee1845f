//! JSON configuration file adapter.
//!
//! Implements [`ConfigPort`] on a single JSON document. Saves go through a
//! sibling temporary file and a rename, so a crash mid-write never leaves
//! a truncated config behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::RobotConfig;

pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigPort for JsonConfigFile {
    fn load(&self) -> Result<RobotConfig, ConfigError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("ConfigFile: {} not found, using defaults", self.path.display());
                return Ok(RobotConfig::default());
            }
            Err(e) => {
                warn!("ConfigFile: read {} failed: {}", self.path.display(), e);
                return Err(ConfigError::IoError);
            }
        };

        let cfg: RobotConfig = serde_json::from_str(&text).map_err(|e| {
            warn!("ConfigFile: {} is not valid config: {}", self.path.display(), e);
            ConfigError::Corrupted
        })?;
        cfg.validate().map_err(ConfigError::ValidationFailed)?;
        info!("ConfigFile: loaded {}", self.path.display());
        Ok(cfg)
    }

    fn save(&self, config: &RobotConfig) -> Result<(), ConfigError> {
        config.validate().map_err(ConfigError::ValidationFailed)?;

        let text = serde_json::to_string_pretty(config).map_err(|_| ConfigError::IoError)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                warn!("ConfigFile: write {} failed: {}", self.path.display(), e);
                ConfigError::IoError
            })?;
        info!("ConfigFile: saved {}", self.path.display());
        Ok(())
    }
}
