//! CLI configuration (`canon.yaml`)

use canon_evolution::DEFAULT_RENAME_THRESHOLD;
use canon_runtime::RunOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Config file picked up from the working directory when `--config` is absent
pub const CONFIG_FILE_NAME: &str = "canon.yaml";

/// Environment variable overriding the registry root
pub const REGISTRY_ENV: &str = "CANON_REGISTRY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Settings shared by every command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CanonConfig {
    /// Registry directory holding `schemas/` and `transforms/`
    pub registry_root: PathBuf,
    pub validate_input: bool,
    pub validate_output: bool,
    pub verify_checksum: bool,
    /// Edit distance below which a removed/added pair counts as a rename
    pub rename_threshold: usize,
}

impl Default for CanonConfig {
    fn default() -> Self {
        Self {
            registry_root: PathBuf::from("."),
            validate_input: true,
            validate_output: true,
            verify_checksum: true,
            rename_threshold: DEFAULT_RENAME_THRESHOLD,
        }
    }
}

impl CanonConfig {
    /// Load `explicit`, or `./canon.yaml` when present, or the defaults
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an explicitly named file is missing or
    /// any config file is malformed.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let implicit = Path::new(CONFIG_FILE_NAME);
                if implicit.is_file() {
                    Self::from_file(implicit)
                } else {
                    debug!("No {} found, using defaults", CONFIG_FILE_NAME);
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse a config file; a relative `registry_root` is taken relative to the file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if config.registry_root.is_relative() {
            if let Some(dir) = path.parent() {
                config.registry_root = dir.join(&config.registry_root);
            }
        }
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Parse config YAML; an empty document yields the defaults
    ///
    /// # Errors
    ///
    /// Returns the YAML error for malformed input or unknown keys.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Apply the `CANON_REGISTRY` value, then the `--registry` flag
    #[must_use]
    pub fn with_overrides(mut self, env_registry: Option<String>, flag_registry: Option<PathBuf>) -> Self {
        if let Some(root) = env_registry.filter(|value| !value.trim().is_empty()) {
            self.registry_root = PathBuf::from(root);
        }
        if let Some(root) = flag_registry {
            self.registry_root = root;
        }
        self
    }

    /// Runtime options carrying the configured checks
    #[must_use]
    pub fn run_options(&self) -> RunOptions {
        RunOptions::new(&self.registry_root)
            .with_input_validation(self.validate_input)
            .with_output_validation(self.validate_output)
            .with_checksum_verification(self.verify_checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CanonConfig::default();
        assert_eq!(config.registry_root, PathBuf::from("."));
        assert!(config.validate_input && config.validate_output && config.verify_checksum);
        assert_eq!(config.rename_threshold, 4);
        assert_eq!(CanonConfig::from_yaml("").unwrap(), config);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = CanonConfig::from_yaml("registry_root: /srv/registry\nverify_checksum: false\n").unwrap();
        assert_eq!(config.registry_root, PathBuf::from("/srv/registry"));
        assert!(!config.verify_checksum);
        assert!(config.validate_input);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(CanonConfig::from_yaml("registry: x\n").is_err());
    }

    #[test]
    fn test_relative_root_resolves_against_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canon.yaml");
        std::fs::write(&path, "registry_root: registry\n").unwrap();
        let config = CanonConfig::from_file(&path).unwrap();
        assert_eq!(config.registry_root, dir.path().join("registry"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = CanonConfig::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_flag_beats_env_beats_file() {
        let config = CanonConfig::default();
        let from_env = config.clone().with_overrides(Some("/env".to_string()), None);
        assert_eq!(from_env.registry_root, PathBuf::from("/env"));

        let from_flag = config.with_overrides(Some("/env".to_string()), Some(PathBuf::from("/flag")));
        assert_eq!(from_flag.registry_root, PathBuf::from("/flag"));
    }

    #[test]
    fn test_run_options_mirror_config() {
        let config = CanonConfig {
            validate_output: false,
            ..CanonConfig::default()
        };
        let options = config.run_options();
        assert!(options.validate_input);
        assert!(!options.validate_output);
        assert_eq!(options.registry_root, PathBuf::from("."));
    }
}
