// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Circuit Container
//!
//! Hierarchical columnar container used for node and edge population files.
//!
//! A container is a tree of named groups. Groups carry string attributes and
//! typed datasets; every dataset is a column of rows with a fixed element
//! type and row width.
//!
//! ## File layout
//! ```text
//! [Header]
//! - Magic: "CIRCT" (5 bytes)
//! - Version: u32 (4 bytes)
//! [Data]
//! - Dataset segments, raw little-endian values
//! [Footer]
//! - Bincode-serialized group tree (names, attributes, dataset extents)
//! [Trailer]
//! - Footer offset: u64
//! - Footer length: u64
//! - Magic: "CIRCT" (5 bytes)
//! - Version: u32 (4 bytes)
//! ```
//!
//! ## Usage
//! ```ignore
//! use circuit_container::{Column, ContainerReader, ContainerWriter};
//!
//! let mut writer = ContainerWriter::create("edges.circ")?;
//! writer.write_dataset("edges/pop/source_node_id", &Column::from(vec![0u64, 1, 1]))?;
//! writer.finish()?;
//!
//! let reader = ContainerReader::open("edges.circ")?;
//! let ids = reader.read_window("edges/pop/source_node_id", 1..3)?;
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use thiserror::Error;

mod column;
mod dtype;
mod layout;
mod reader;
mod writer;

pub use column::{Column, ColumnData, Scalar};
pub use dtype::DType;
pub use layout::{DatasetLayout, GroupLayout, Storage};
pub use reader::ContainerReader;
pub use writer::ContainerWriter;

/// Container I/O errors
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Version mismatch: file version {file_version}, expected {expected_version}")]
    VersionMismatch {
        file_version: u32,
        expected_version: u32,
    },

    #[error("Invalid magic number: expected CIRCT, got {0:?}")]
    InvalidMagic([u8; 5]),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    #[error("Type mismatch in {context}: expected {expected}, got {actual}")]
    DTypeMismatch {
        context: String,
        expected: DType,
        actual: DType,
    },

    #[error("Width mismatch: expected {expected}, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("Negative value {0} where an unsigned id was expected")]
    NegativeValue(i64),

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Dataset {0} is already stored and cannot be appended to")]
    Sealed(String),

    #[error("Corrupted container: {0}")]
    Corrupted(String),
}

pub type Result<T> = std::result::Result<T, ContainerError>;

/// Magic number for container files: "CIRCT"
pub const MAGIC: &[u8; 5] = b"CIRCT";

/// Current format version (increment when format changes)
pub const FORMAT_VERSION: u32 = 1;

/// File extension used for node and edge containers
pub const FILE_EXTENSION: &str = "circ";

/// Size of the fixed header (magic + version)
pub(crate) const HEADER_LEN: u64 = 9;

/// Size of the fixed trailer (footer offset + footer length + magic + version)
pub(crate) const TRAILER_LEN: u64 = 25;
