use crate::config::{parse_interval, Config};
use crate::error::{Result, ValidationError, Vm2DhcpError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_platform(config, &mut errors);
        Self::validate_registry(config, &mut errors);
        Self::validate_filter(config, &mut errors);
        Self::validate_metrics(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Vm2DhcpError::ConfigValidation { errors })
        }
    }

    fn validate_platform(config: &Config, errors: &mut Vec<ValidationError>) {
        let platform = &config.platform;

        if platform.address.trim().is_empty() {
            errors.push(ValidationError::new(
                "platform.address",
                "Platform address cannot be empty",
            ));
        }

        if platform.custom_attribute_namespace.is_empty() {
            errors.push(ValidationError::new(
                "platform.custom_attribute_namespace",
                "Custom attribute namespace cannot be empty",
            ));
        }

        if platform.page_size == 0 {
            errors.push(ValidationError::new(
                "platform.page_size",
                "Page size must be greater than 0",
            ));
        }

        if parse_interval(&platform.poll_interval).is_none() {
            errors.push(ValidationError::new(
                "platform.poll_interval",
                format!("Invalid duration format: {}", platform.poll_interval),
            ));
        }

        if platform.networks.iter().any(|n| n.trim().is_empty()) {
            errors.push(ValidationError::new(
                "platform.networks",
                "Network names cannot be empty",
            ));
        }
    }

    fn validate_registry(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.registry.address.trim().is_empty() {
            errors.push(ValidationError::new(
                "registry.address",
                "Registry address cannot be empty",
            ));
        }

        if config.registry.port == 0 {
            errors.push(ValidationError::new(
                "registry.port",
                "Registry port must be greater than 0",
            ));
        }

        if config.registry.key_name.is_empty() {
            errors.push(ValidationError::new(
                "registry.key_name",
                "Key name cannot be empty",
            ));
        }
    }

    fn validate_filter(config: &Config, errors: &mut Vec<ValidationError>) {
        let pattern = &config.filter.unmanaged_guest_pattern;
        if let Err(e) = regex::Regex::new(pattern) {
            errors.push(ValidationError::new(
                "filter.unmanaged_guest_pattern",
                format!("Invalid pattern '{}': {}", pattern, e),
            ));
        }
    }

    fn validate_metrics(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.metrics.enabled && config.metrics.port == 0 {
            errors.push(ValidationError::new(
                "metrics.port",
                "Metrics port must be greater than 0 when metrics are enabled",
            ));
        }
    }
}
