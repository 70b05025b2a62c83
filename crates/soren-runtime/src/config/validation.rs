//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{DeliverySettings, LogOutput, LoggingConfig, SorenConfig};

/// Validates the entire configuration.
///
/// Connection settings come first: without an agent address or a plugin id
/// nothing else matters.
pub fn validate_config(config: &SorenConfig) -> ConfigResult<()> {
    if config.agent_uri.trim().is_empty() {
        return Err(ConfigError::missing_field("agent_uri"));
    }
    if config.plugin_id.trim().is_empty() {
        return Err(ConfigError::missing_field("plugin_id"));
    }
    config.identity()?;
    config.credentials()?;

    validate_delivery(&config.delivery)?;
    validate_logging(&config.logging)?;
    Ok(())
}

fn validate_delivery(delivery: &DeliverySettings) -> ConfigResult<()> {
    if delivery.max_attempts == 0 {
        return Err(ConfigError::validation(
            "delivery.max_attempts must be at least 1",
        ));
    }
    if delivery.request_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "delivery.request_timeout_ms must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> SorenConfig {
        SorenConfig {
            agent_uri: "nats://127.0.0.1:4222".into(),
            plugin_id: "widgets-svc".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        validate_config(&valid()).unwrap();
    }

    #[test]
    fn test_missing_agent_uri() {
        let config = SorenConfig {
            agent_uri: String::new(),
            ..valid()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field } if field == "agent_uri"));
    }

    #[test]
    fn test_missing_plugin_id() {
        let config = SorenConfig {
            plugin_id: " ".into(),
            ..valid()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field } if field == "plugin_id"));
    }

    #[test]
    fn test_malformed_gateway_id() {
        let config = SorenConfig {
            plugin_id: "bin.*.".into(),
            ..valid()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_invalid_credential() {
        let config = SorenConfig {
            agent_cred: Some("not base64!".into()),
            ..valid()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidCredential { .. })
        ));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = valid();
        config.delivery.max_attempts = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = valid();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }
}
