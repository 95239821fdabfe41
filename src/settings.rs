use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::BatchError;

pub const SETTINGS_FILE: &str = "mesh_pass.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Worker count for the pass scheduler; `None` uses rayon's default.
    #[serde(default)]
    pub worker_threads: Option<usize>,
    /// Visible-element count from which the filter and sort stages split
    /// work across the pool.
    #[serde(default = "BatchSettings::default_parallel_threshold")]
    pub parallel_threshold: usize,
    /// Smallest batch-index staging buffer requested from the pool, in
    /// elements.
    #[serde(default = "BatchSettings::default_staging_min_capacity")]
    pub staging_min_capacity: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            worker_threads: None,
            parallel_threshold: Self::default_parallel_threshold(),
            staging_min_capacity: Self::default_staging_min_capacity(),
        }
    }
}

impl BatchSettings {
    pub fn load() -> Self {
        Self::load_from_path(SETTINGS_FILE)
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(settings) => {
                    info!("Loaded mesh pass settings from {:?}", path);
                    settings
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default mesh pass settings.",
                        path, err
                    );
                    BatchSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Mesh pass settings file {:?} not found. Using default settings.",
                    path
                );
                BatchSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default mesh pass settings.",
                    path, err
                );
                BatchSettings::default()
            }
        }
    }

    pub fn from_json(contents: &str) -> Result<Self, BatchError> {
        let settings = serde_json::from_str::<BatchSettings>(contents)?;
        Ok(settings.validate())
    }

    fn validate(mut self) -> Self {
        if self.worker_threads == Some(0) {
            warn!("Worker thread count must be greater than zero. Using the default pool size.");
            self.worker_threads = None;
        }

        if self.parallel_threshold == 0 {
            warn!("Parallel threshold must be greater than zero. Using default value.");
            self.parallel_threshold = Self::default_parallel_threshold();
        }

        if self.staging_min_capacity == 0 {
            warn!("Staging buffer capacity must be greater than zero. Using default value.");
            self.staging_min_capacity = Self::default_staging_min_capacity();
        }

        self
    }

    const fn default_parallel_threshold() -> usize {
        1024
    }

    const fn default_staging_min_capacity() -> usize {
        1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = BatchSettings {
            worker_threads: Some(0),
            parallel_threshold: 0,
            staging_min_capacity: 0,
        }
        .validate();

        assert_eq!(validated, BatchSettings::default());
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = BatchSettings {
            worker_threads: Some(6),
            parallel_threshold: 64,
            staging_min_capacity: 4096,
        };

        assert_eq!(valid.clone().validate(), valid);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let settings = BatchSettings::from_json(r#"{ "worker_threads": 3 }"#).unwrap();

        assert_eq!(settings.worker_threads, Some(3));
        assert_eq!(
            settings.parallel_threshold,
            BatchSettings::default().parallel_threshold
        );
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = BatchSettings::from_json("{ not json").unwrap_err();
        assert!(matches!(err, BatchError::Settings(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = BatchSettings::load_from_path("does/not/exist/mesh_pass.json");
        assert_eq!(settings, BatchSettings::default());
    }
}
