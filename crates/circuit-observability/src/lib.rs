// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # circuit-observability
//!
//! Logging setup shared by the circuit tools, with per-crate debug flag support.
//!
//! ## Features
//! - `file-logging`: additional JSON log file next to the console output

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Crate names (tracing targets) accepted by the debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "circuit-tools",
    "circuit-split",
    "circuit-container",
    "circuit-config",
];
