//! Engine configuration, loaded from YAML.
//!
//! ```yaml
//! default_module: projects
//! max_stack_depth: 256
//! warnings_as_errors: false
//! warn_unused_parameters: true
//! ```
//!
//! Every key is optional.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::context::DEFAULT_MAX_STACK_DEPTH;
use crate::errors::{ErrorKind, SelError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Module for rules that appear before any `module` declaration. The
    /// global scope when unset.
    pub default_module: Option<String>,
    pub max_stack_depth: usize,
    /// Rejects a compilation that produced only warnings.
    pub warnings_as_errors: bool,
    pub warn_unused_parameters: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_module: None,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            warnings_as_errors: false,
            warn_unused_parameters: true,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, SelError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| {
            SelError::new(
                ErrorKind::Config {
                    message: e.to_string(),
                },
                "config",
            )
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SelError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            SelError::new(
                ErrorKind::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                },
                "config",
            )
        })?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = EngineConfig::from_yaml_str("default_module: projects\n").unwrap();
        assert_eq!(config.default_module.as_deref(), Some("projects"));
        assert_eq!(config.max_stack_depth, DEFAULT_MAX_STACK_DEPTH);
        assert!(config.warn_unused_parameters);
        assert_eq!(EngineConfig::from_yaml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = EngineConfig::from_yaml_str("max_depth: 3\n").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Config { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = EngineConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Io { .. }));
    }
}
