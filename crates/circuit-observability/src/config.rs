// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text or json)
    pub format: LogFormat,

    /// Directory of the log file, console only when `None`
    pub file_dir: Option<PathBuf>,
}

/// Log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Parse `text` or `json`, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "text" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

impl LoggingConfig {
    /// Build from the plain string settings of a configuration file;
    /// an unknown format falls back to text
    pub fn from_settings(level: &str, format: &str, file_dir: Option<PathBuf>) -> Self {
        Self {
            level: level.to_ascii_lowercase(),
            format: LogFormat::from_name(format).unwrap_or(LogFormat::Text),
            file_dir,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Text,
            file_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings() {
        let config = LoggingConfig::from_settings("WARN", "JSON", None);
        assert_eq!(config.level, "warn");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(LoggingConfig::from_settings("info", "yaml", None).format, LogFormat::Text);
    }
}
