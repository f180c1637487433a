// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{validate_config, CircuitConfig, ConfigError, ConfigResult};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// File name searched for in the working directory and its parents
pub const CONFIG_FILE_NAME: &str = "circuit_configuration.toml";

/// Find the configuration file
///
/// Search order:
/// 1. `CIRCUIT_CONFIG_PATH` environment variable
/// 2. Current working directory: `./circuit_configuration.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("CIRCUIT_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by CIRCUIT_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.as_path();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent;
                }
                None => break,
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\n\
         Set CIRCUIT_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found, contains invalid TOML, or fails validation
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<CircuitConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let config: CircuitConfig = toml::from_str(&content)?;
    finalize(config, cli_args)
}

/// Like `load_config`, but falls back to defaults when no file can be found
pub fn load_config_or_default(
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<CircuitConfig> {
    match find_config_file() {
        Ok(path) => load_config(Some(&path), cli_args),
        Err(ConfigError::FileNotFound(_)) if env::var("CIRCUIT_CONFIG_PATH").is_err() => {
            finalize(CircuitConfig::default(), cli_args)
        }
        Err(e) => Err(e),
    }
}

fn finalize(
    mut config: CircuitConfig,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<CircuitConfig> {
    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }
    validate_config(&config)?;
    Ok(config)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `CIRCUIT_READ_CHUNK_SIZE` -> `split.read_chunk_size`
/// - `CIRCUIT_MAX_THREADS` -> `split.max_threads`
/// - `CIRCUIT_LOG_LEVEL` -> `logging.level`
/// - `CIRCUIT_LOG_FORMAT` -> `logging.format`
///
/// Unparseable numeric values are ignored.
pub fn apply_environment_overrides(config: &mut CircuitConfig) {
    if let Ok(value) = env::var("CIRCUIT_READ_CHUNK_SIZE") {
        if let Ok(size) = value.trim().parse::<usize>() {
            config.split.read_chunk_size = size;
        }
    }
    if let Ok(value) = env::var("CIRCUIT_MAX_THREADS") {
        if let Ok(threads) = value.trim().parse::<usize>() {
            config.split.max_threads = threads;
        }
    }
    if let Ok(value) = env::var("CIRCUIT_LOG_LEVEL") {
        config.logging.level = value.to_lowercase();
    }
    if let Ok(value) = env::var("CIRCUIT_LOG_FORMAT") {
        config.logging.format = value.to_lowercase();
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - Map of CLI arguments (e.g., `{"read_chunk_size": "1000", "log_level": "debug"}`)
///
/// # Errors
///
/// Unlike environment overrides, an explicit CLI value that does not parse is an error.
pub fn apply_cli_overrides(
    config: &mut CircuitConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    if let Some(value) = cli_args.get("read_chunk_size") {
        config.split.read_chunk_size = parse_usize("read_chunk_size", value)?;
    }
    if let Some(value) = cli_args.get("max_threads") {
        config.split.max_threads = parse_usize("max_threads", value)?;
    }
    if let Some(value) = cli_args.get("synapse_type") {
        config.split.synapse_type = value.clone();
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.to_lowercase();
    }
    if let Some(value) = cli_args.get("log_format") {
        config.logging.format = value.to_lowercase();
    }
    if let Some(value) = cli_args.get("log_dir") {
        config.logging.file_dir = Some(PathBuf::from(value));
    }
    Ok(())
}

fn parse_usize(name: &str, value: &str) -> ConfigResult<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|e| ConfigError::InvalidValue(format!("{} = {:?}: {}", name, value, e)))
}
