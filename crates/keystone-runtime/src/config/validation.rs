//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{ImmediateConfig, KeystoneConfig, LocatorConfig, LogFormat, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &KeystoneConfig) -> ConfigResult<()> {
    validate_locator_config(&config.locator)?;
    validate_immediate_config(&config.immediate)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_locator_config(locator: &LocatorConfig) -> ConfigResult<()> {
    if locator.name.trim().is_empty() {
        return Err(ConfigError::missing_field("locator.name"));
    }
    if locator.name.contains(char::is_whitespace) {
        return Err(ConfigError::validation("Locator name cannot contain whitespace"));
    }
    Ok(())
}

fn validate_immediate_config(immediate: &ImmediateConfig) -> ConfigResult<()> {
    if immediate.thread_inactivity_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "Immediate thread inactivity timeout must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    if logging.format == LogFormat::Json && !cfg!(feature = "json-log") {
        return Err(ConfigError::validation(
            "JSON log format requires the `json-log` feature",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&KeystoneConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_empty_locator_name() {
        let mut config = KeystoneConfig::default();
        config.locator.name = "  ".to_string();
        assert!(matches!(validate_config(&config), Err(ConfigError::MissingField { .. })));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = KeystoneConfig::default();
        config.immediate.thread_inactivity_timeout_ms = 0;
        assert!(matches!(validate_config(&config), Err(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn test_validate_file_output_requires_path() {
        let mut config = KeystoneConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("keystone.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
