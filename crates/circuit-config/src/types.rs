// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `circuit_configuration.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitConfig {
    pub split: SplitConfig,
    pub logging: LoggingConfig,
}

/// Population splitting and subcircuit extraction
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Rows read from an edge population per window
    pub read_chunk_size: usize,
    /// Membership tests on at least `read_chunk_size` elements run in
    /// parallel sub-windows of `read_chunk_size / membership_window_divisor`
    pub membership_window_divisor: usize,
    /// Lower bound on the parallel sub-window size
    pub membership_min_window: usize,
    /// Worker threads for parallel membership tests (0 = all but one core)
    pub max_threads: usize,
    /// Suffix of edge populations connecting two different node populations
    pub synapse_type: String,
    /// Name of the audit file written next to the outputs
    pub id_mapping_file: String,
    /// Name of the descriptor written after an attribute split
    pub circuit_config_file: String,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 500_000_000,
            membership_window_divisor: 500,
            membership_min_window: 500,
            max_threads: 0,
            synapse_type: "chemical".to_string(),
            id_mapping_file: "id_mapping.json".to_string(),
            circuit_config_file: "circuit_config.json".to_string(),
        }
    }
}

/// Logging settings consumed by the observability layer
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// text or json
    pub format: String,
    /// Directory for log files; console only when unset
    pub file_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file_dir: None,
        }
    }
}

/// Accepted values of `logging.level`
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Accepted values of `logging.format`
pub const LOG_FORMATS: &[&str] = &["text", "json"];
