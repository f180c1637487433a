// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! This module provides validation logic to ensure configuration values are
//! consistent and within valid ranges.

use crate::{CircuitConfig, ConfigError, ConfigResult, LOG_FORMATS, LOG_LEVELS};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &CircuitConfig) -> ConfigResult<()> {
    let errors = collect_errors(config);
    if errors.is_empty() {
        return Ok(());
    }

    let error_messages = errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::ValidationError(format!(
        "Configuration validation failed:\n{}",
        error_messages
    )))
}

/// Every validation problem of `config`, in section order
pub fn collect_errors(config: &CircuitConfig) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();
    validate_split(config, &mut errors);
    validate_logging(config, &mut errors);
    errors
}

fn validate_split(config: &CircuitConfig, errors: &mut Vec<ConfigValidationError>) {
    let split = &config.split;
    if split.read_chunk_size == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "split.read_chunk_size".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    if split.membership_window_divisor == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "split.membership_window_divisor".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    if split.membership_min_window == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "split.membership_min_window".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    for (field, value) in [
        ("split.synapse_type", &split.synapse_type),
        ("split.id_mapping_file", &split.id_mapping_file),
        ("split.circuit_config_file", &split.circuit_config_file),
    ] {
        if value.trim().is_empty() {
            errors.push(ConfigValidationError::MissingRequired {
                field: field.to_string(),
            });
        }
    }
}

fn validate_logging(config: &CircuitConfig, errors: &mut Vec<ConfigValidationError>) {
    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("{:?} is not one of {}", config.logging.level, LOG_LEVELS.join(", ")),
        });
    }
    if !LOG_FORMATS.contains(&config.logging.format.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.format".to_string(),
            reason: format!("{:?} is not one of {}", config.logging.format, LOG_FORMATS.join(", ")),
        });
    }
}
