//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Request handling never reads process-wide environment variables.

use crate::constants::{DEFAULT_BATCH_VOLUME_ML, DEFAULT_DATA_DIR, FORMULATIONS_DIR_NAME};
use crate::{FormulationError, FormulationResult};
use mixlab_files::DEFAULT_MAX_OBJECT_BYTES;
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    default_batch_volume_ml: f64,
    max_cover_bytes: u64,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`FormulationError::InvalidInput`] if the data directory is empty, the default
    /// batch volume is negative or not finite, or the cover limit is zero.
    pub fn new(
        data_dir: PathBuf,
        default_batch_volume_ml: f64,
        max_cover_bytes: u64,
    ) -> FormulationResult<Self> {
        if data_dir.as_os_str().is_empty() {
            return Err(FormulationError::InvalidInput(
                "data_dir cannot be empty".into(),
            ));
        }
        if !default_batch_volume_ml.is_finite() || default_batch_volume_ml < 0.0 {
            return Err(FormulationError::InvalidInput(format!(
                "default batch volume must be a non-negative number, got {default_batch_volume_ml}"
            )));
        }
        if max_cover_bytes == 0 {
            return Err(FormulationError::InvalidInput(
                "max_cover_bytes must be greater than zero".into(),
            ));
        }

        Ok(Self {
            data_dir,
            default_batch_volume_ml,
            max_cover_bytes,
        })
    }

    /// Configuration rooted at `data_dir` with every other value at its default.
    pub fn with_data_dir(data_dir: PathBuf) -> FormulationResult<Self> {
        Self::new(data_dir, DEFAULT_BATCH_VOLUME_ML, DEFAULT_MAX_OBJECT_BYTES)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn formulations_dir(&self) -> PathBuf {
        self.data_dir.join(FORMULATIONS_DIR_NAME)
    }

    pub fn default_batch_volume_ml(&self) -> f64 {
        self.default_batch_volume_ml
    }

    pub fn max_cover_bytes(&self) -> u64 {
        self.max_cover_bytes
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolve the data directory from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_DATA_DIR`].
pub fn data_dir_from_env_value(value: Option<String>) -> PathBuf {
    PathBuf::from(non_blank(value).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()))
}

/// Parse the default batch volume from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_BATCH_VOLUME_ML`].
pub fn default_batch_volume_from_env_value(value: Option<String>) -> FormulationResult<f64> {
    match non_blank(value) {
        None => Ok(DEFAULT_BATCH_VOLUME_ML),
        Some(v) => v.parse::<f64>().map_err(|_| {
            FormulationError::InvalidInput(format!("MIXLAB_DEFAULT_BATCH_ML is not a number: {v}"))
        }),
    }
}

/// Parse the cover upload limit (in bytes) from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_MAX_OBJECT_BYTES`].
pub fn max_cover_bytes_from_env_value(value: Option<String>) -> FormulationResult<u64> {
    match non_blank(value) {
        None => Ok(DEFAULT_MAX_OBJECT_BYTES),
        Some(v) => v.parse::<u64>().map_err(|_| {
            FormulationError::InvalidInput(format!(
                "MIXLAB_MAX_COVER_BYTES is not a whole number: {v}"
            ))
        }),
    }
}
