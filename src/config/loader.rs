//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::BridgeConfig;
use crate::config::validation::{validate_config, ValidationErrors};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<BridgeConfig, ConfigError> {
    let config: BridgeConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_toml() {
        assert!(matches!(parse_config("[listener"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn rejects_semantic_errors() {
        let err = parse_config(
            r#"
            [timeouts]
            upgrade_secs = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("upgrade_secs"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/bridge.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
