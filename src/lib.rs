// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # circuit-tools
//!
//! Population splitting and subcircuit extraction for node/edge circuits.
//! This crate re-exports the workspace members and connects the
//! configuration file to logging and to the split options.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! circuit-tools = "0.0.1-beta.18"
//! ```
//!
//! ```rust,no_run
//! use circuit_tools::prelude::*;
//! use std::path::Path;
//!
//! let config = circuit_tools::config::load_config_or_default(None)?;
//! let _logging = circuit_tools::init_logging(&config)?;
//!
//! let report = split_subcircuit(
//!     Path::new("out"),
//!     "Layer1",
//!     Path::new("circuit/circuit_config.json"),
//!     true,
//!     true,
//!     &circuit_tools::split_options(&config),
//! )?;
//! for warning in &report.warnings {
//!     eprintln!("{}", warning);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: circuit-config, circuit-observability      │
//! │  (TOML settings, tracing setup)                         │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Storage: circuit-container                             │
//! │  (groups, typed datasets, windowed reads, append)       │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Algorithms: circuit-split                              │
//! │  (id mapping, edge copy, indices, descriptors)          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Feature Flags
//!
//! - **`file-logging`**: also write a JSON log file when `logging.file_dir` is set
//!
//! ## License
//!
//! Apache-2.0

pub use circuit_config as config;
pub use circuit_container as container;
pub use circuit_observability as observability;
pub use circuit_split as split;

use circuit_config::CircuitConfig;
use circuit_observability::{parse_debug_flags, LoggingGuard};
use circuit_split::SplitOptions;

/// Split options from the `[split]` section
pub fn split_options(config: &CircuitConfig) -> SplitOptions {
    SplitOptions::from(&config.split)
}

/// Logging settings from the `[logging]` section
pub fn logging_config(config: &CircuitConfig) -> circuit_observability::LoggingConfig {
    circuit_observability::LoggingConfig::from_settings(
        &config.logging.level,
        &config.logging.format,
        config.logging.file_dir.clone(),
    )
}

/// Install the global subscriber from the `[logging]` section and the
/// process debug flags
///
/// # Errors
///
/// Fails if a subscriber is already installed or the log directory cannot
/// be created.
pub fn init_logging(config: &CircuitConfig) -> anyhow::Result<LoggingGuard> {
    let guard = circuit_observability::init_logging(&parse_debug_flags(), &logging_config(config))?;
    tracing::debug!(
        target: "circuit-tools",
        "Logging initialised (level={}, format={})",
        config.logging.level,
        config.logging.format
    );
    Ok(guard)
}

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use circuit_config::{load_config, CircuitConfig};
    pub use circuit_container::{Column, ContainerReader, ContainerWriter, DType};
    pub use circuit_split::{
        simple_split_subcircuit, split_population, split_subcircuit, EdgeAccounting, IdMappings,
        SplitError, SplitErrorKind, SplitOptions, SplitReport, SplitResult, SplitStage,
    };
}
