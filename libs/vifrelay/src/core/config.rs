// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Relay configuration via `vifrelay.yaml`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{RelayError, Result};

/// Prefix composed in front of every device suffix.
pub const DEFAULT_NAME_PREFIX: &str = "virt";

/// Longest composed device name, in bytes (a 32-byte C buffer minus the NUL).
pub const DEFAULT_MAX_NAME_LEN: usize = 31;

/// Relay worker thread-name prefix.
pub const DEFAULT_WORKER_NAME_PREFIX: &str = "vif-rcv";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Prefix prepended to the caller-supplied device suffix.
    pub name_prefix: String,

    /// Maximum composed device name length in bytes.
    pub max_name_len: usize,

    /// Frames delivered per acquisition of the interface context.
    ///
    /// `1` hands frames over one by one. Larger values batch deliveries while
    /// keeping per-device order.
    pub frames_per_schedule: usize,

    /// OS thread-name prefix for relay workers.
    pub worker_name_prefix: String,

    /// Stack size for relay workers; platform default when unset.
    pub worker_stack_size: Option<usize>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            max_name_len: DEFAULT_MAX_NAME_LEN,
            frames_per_schedule: 1,
            worker_name_prefix: DEFAULT_WORKER_NAME_PREFIX.to_string(),
            worker_stack_size: None,
        }
    }
}

impl RelayConfig {
    /// Configuration file name.
    pub const FILE_NAME: &'static str = "vifrelay.yaml";

    /// Load configuration from a directory. Returns error if the file is
    /// missing or cannot be parsed.
    pub fn load(dir: &Path) -> Result<Self> {
        Self::from_file(&dir.join(Self::FILE_NAME))
    }

    /// Load configuration from a directory, falling back to defaults if the
    /// file does not exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join(Self::FILE_NAME);
        if !path.exists() {
            tracing::debug!("{} not found, using default relay config", path.display());
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config = Self::from_yaml(&content).map_err(|e| match e {
            RelayError::Configuration(msg) => {
                RelayError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;

        tracing::debug!("Loaded relay config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| RelayError::Configuration(format!("Failed to parse: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| RelayError::Configuration(format!("Failed to serialize: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_name_len == 0 {
            return Err(RelayError::Configuration(
                "max_name_len must be at least 1".to_string(),
            ));
        }
        if self.name_prefix.len() >= self.max_name_len {
            return Err(RelayError::Configuration(format!(
                "name_prefix '{}' leaves no room for a device suffix (max_name_len {})",
                self.name_prefix, self.max_name_len
            )));
        }
        if self.frames_per_schedule == 0 {
            return Err(RelayError::Configuration(
                "frames_per_schedule must be at least 1".to_string(),
            ));
        }
        if self.worker_stack_size == Some(0) {
            return Err(RelayError::Configuration(
                "worker_stack_size must be non-zero when set".to_string(),
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
        let config = RelayConfig::default();
        assert_eq!(config.name_prefix, "virt");
        assert_eq!(config.max_name_len, 31);
        assert_eq!(config.frames_per_schedule, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = RelayConfig::from_yaml("frames_per_schedule: 8\n").unwrap();
        assert_eq!(config.frames_per_schedule, 8);
        assert_eq!(config.name_prefix, "virt");
        assert_eq!(config.worker_stack_size, None);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = RelayConfig::from_yaml("frame_per_schedule: 8\n").unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn test_zero_batch_rejected() {
        let err = RelayConfig::from_yaml("frames_per_schedule: 0\n").unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn test_prefix_must_leave_room() {
        let config = RelayConfig {
            name_prefix: "abcd".to_string(),
            max_name_len: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = RelayConfig {
            name_prefix: "snb".to_string(),
            worker_stack_size: Some(256 * 1024),
            ..Default::default()
        };
        let yaml = config.to_yaml().unwrap();
        assert_eq!(RelayConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(RelayConfig::FILE_NAME),
            "name_prefix: tap\nmax_name_len: 15\n",
        )
        .unwrap();

        let config = RelayConfig::load(dir.path()).unwrap();
        assert_eq!(config.name_prefix, "tap");
        assert_eq!(config.max_name_len, 15);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = RelayConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config, RelayConfig::default());
    }
}
