// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Error types for split operations.

Every fatal condition carries a [`SplitErrorKind`] so callers can tell
structural problems, consistency failures and missing inputs apart without
matching on messages.
*/

use circuit_config::ConfigError;
use circuit_container::ContainerError;

/// Result type for split operations
pub type SplitResult<T> = Result<T, SplitError>;

/// Errors that can occur while splitting populations
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    /// Wrong number of populations or groups, or an unexpected subgroup
    #[error("Structural error: {0}")]
    Structural(String),

    /// Exhaustive split did not account for every input edge
    #[error("Written edges mismatch: expected={expected}, actual={actual}")]
    Consistency { expected: u64, actual: u64 },

    /// Written files do not line up with the network descriptor
    #[error("Output layout error: {0}")]
    OutputLayout(String),

    /// Referenced population, attribute, node set or file is absent
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// Caller passed arguments the operation cannot honour
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Coarse classification of a [`SplitError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitErrorKind {
    Structural,
    Consistency,
    MissingInput,
    Usage,
    Storage,
    Environment,
}

impl SplitError {
    pub fn kind(&self) -> SplitErrorKind {
        match self {
            SplitError::Structural(_) => SplitErrorKind::Structural,
            SplitError::Consistency { .. } | SplitError::OutputLayout(_) => {
                SplitErrorKind::Consistency
            }
            SplitError::MissingInput(_) => SplitErrorKind::MissingInput,
            SplitError::InvalidArgument(_) => SplitErrorKind::Usage,
            SplitError::ThreadPool(_) | SplitError::Config(_) => SplitErrorKind::Environment,
            SplitError::Container(ContainerError::NotFound(_)) => SplitErrorKind::MissingInput,
            SplitError::Io(e) | SplitError::Container(ContainerError::Io(e))
                if e.kind() == std::io::ErrorKind::NotFound =>
            {
                SplitErrorKind::MissingInput
            }
            SplitError::Container(_) | SplitError::Io(_) | SplitError::Json(_) => {
                SplitErrorKind::Storage
            }
        }
    }

    pub(crate) fn missing(what: impl Into<String>) -> Self {
        SplitError::MissingInput(what.into())
    }

    pub(crate) fn structural(what: impl Into<String>) -> Self {
        SplitError::Structural(what.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            SplitError::Consistency { expected: 4, actual: 3 }.kind(),
            SplitErrorKind::Consistency
        );
        assert_eq!(
            SplitError::Container(ContainerError::NotFound("edges/x".into())).kind(),
            SplitErrorKind::MissingInput
        );
        assert_eq!(
            SplitError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")).kind(),
            SplitErrorKind::MissingInput
        );
        assert_eq!(
            SplitError::Container(ContainerError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "nodes.circ"
            )))
            .kind(),
            SplitErrorKind::MissingInput
        );
        assert_eq!(
            SplitError::Container(ContainerError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "nodes.circ"
            )))
            .kind(),
            SplitErrorKind::Storage
        );
        assert_eq!(
            SplitError::Container(ContainerError::Corrupted("bad".into())).kind(),
            SplitErrorKind::Storage
        );
    }

    #[test]
    fn test_consistency_message() {
        let err = SplitError::Consistency { expected: 4, actual: 3 };
        assert_eq!(err.to_string(), "Written edges mismatch: expected=4, actual=3");
    }
}
