// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization
//!
//! Console output in text or JSON, filtered by the configured level and the
//! per-crate debug flags. With the `file-logging` feature a JSON log file is
//! written as well.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;
use crate::config::{LogFormat, LoggingConfig};

/// Keeps background log writers alive; logs are flushed when dropped
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
    log_file: Option<PathBuf>,
}

impl LoggingGuard {
    /// Path of the log file, if one is being written
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

/// Build the filter directive for the given flags and configuration
pub fn filter_directive(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> String {
    debug_flags.to_filter_string(&config.level)
}

/// Install the global subscriber
///
/// # Errors
///
/// Fails if the filter does not parse, the log directory cannot be created,
/// or a global subscriber is already installed.
pub fn init_logging(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<LoggingGuard> {
    let directive = filter_directive(debug_flags, config);
    let env_filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter: {}", directive))?;

    let mut layers = Vec::new();

    let console_layer = match config.format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .with_filter(env_filter.clone())
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_filter(env_filter.clone())
            .boxed(),
    };
    layers.push(console_layer);

    #[cfg(feature = "file-logging")]
    let mut file_guard = None;
    let mut log_file = None;

    if let Some(dir) = &config.file_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

        #[cfg(feature = "file-logging")]
        {
            let appender = tracing_appender::rolling::never(dir, "circuit.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            file_guard = Some(guard);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .with_filter(env_filter.clone())
                .boxed();
            layers.push(file_layer);
            log_file = Some(dir.join("circuit.log"));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow!("Failed to install subscriber: {}", e))?;

    if config.file_dir.is_some() && log_file.is_none() {
        tracing::warn!(
            target: "circuit-tools",
            "Log directory configured but file logging is not compiled in"
        );
    }

    Ok(LoggingGuard {
        #[cfg(feature = "file-logging")]
        _file_guard: file_guard,
        log_file,
    })
}

/// Initialize logging with default settings
pub fn init_logging_default(debug_flags: &CrateDebugFlags) -> Result<LoggingGuard> {
    init_logging(debug_flags, &LoggingConfig::default())
}
