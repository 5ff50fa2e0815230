//! Retention sweep configuration.

use std::time::Duration;

use common::config::{AgedDirConfig, CleanerConfig};
use thiserror::Error;

/// Settings for one retention sweeper, derived from the `[cleaner]` section.
#[derive(Clone, Debug)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub sweep_interval: Duration,
    /// Log actions without executing them.
    pub dry_run: bool,
    pub general_dirs: Vec<String>,
    pub general_dirs_max_bytes: u64,
    pub aged_dirs: Vec<AgedDirConfig>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self::from(&CleanerConfig::default())
    }
}

impl From<&CleanerConfig> for RetentionConfig {
    fn from(config: &CleanerConfig) -> Self {
        Self {
            enabled: config.enabled,
            sweep_interval: config.sweep_interval,
            dry_run: config.dry_run,
            general_dirs: config.general_dirs.clone(),
            general_dirs_max_bytes: config.general_dirs_max_bytes,
            aged_dirs: config.aged_dirs.clone(),
        }
    }
}

impl RetentionConfig {
    /// Validate the retention configuration.
    ///
    /// Checks:
    /// - The sweep interval is positive
    /// - Every static target is an absolute path
    /// - Every aged directory has a positive max age
    pub fn validate(&self) -> Result<(), RetentionConfigError> {
        if self.sweep_interval.is_zero() {
            return Err(RetentionConfigError::InvalidSweepInterval(
                self.sweep_interval,
            ));
        }

        for dir in &self.general_dirs {
            check_target(dir)?;
        }

        for aged in &self.aged_dirs {
            check_target(&aged.path)?;
            if aged.max_age.is_zero() {
                return Err(RetentionConfigError::InvalidMaxAge {
                    path: aged.path.clone(),
                    duration: aged.max_age,
                });
            }
        }

        Ok(())
    }
}

fn check_target(path: &str) -> Result<(), RetentionConfigError> {
    if path.starts_with('/') && path.len() > 1 {
        Ok(())
    } else {
        Err(RetentionConfigError::InvalidTargetPath(path.to_string()))
    }
}

/// Errors from validating retention configuration.
#[derive(Error, Debug)]
pub enum RetentionConfigError {
    #[error("Invalid sweep interval: {0:?} must be positive")]
    InvalidSweepInterval(Duration),

    /// Static targets must be absolute and must not be the filesystem root.
    #[error("Invalid sweep target '{0}': expected an absolute directory path")]
    InvalidTargetPath(String),

    #[error("Invalid max age for '{path}': {duration:?} must be positive")]
    InvalidMaxAge { path: String, duration: Duration },
}
