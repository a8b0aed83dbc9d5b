// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use crate::storage::StorageError;

/// Error type for the specimen alignment engine.
///
/// Most of these never escape an alignment pass: `InvalidDimension` is
/// recovered by substituting [`DEFAULT_IMAGE_SIZE`](crate::DEFAULT_IMAGE_SIZE)
/// and `MalformedLine` by skipping the offending line. `SourceNotFound` is
/// reported per image, and `PersistenceFailure` fails the whole operation.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred during file operations.
    IoError(std::io::Error),
    /// Configuration parsing or loading error.
    ConfigError(config::ConfigError),
    /// JSON serialization or deserialization error.
    JsonError(serde_json::Error),
    /// Error reported by an annotation store backend.
    Storage(StorageError),
    /// Image width or height is missing, non-finite or non-positive.
    InvalidDimension(String),
    /// Bounding box corners are not ordered or not finite.
    InvalidRect(String),
    /// A segmentation line could not be parsed.
    MalformedLine {
        /// Zero-based source line position.
        line: usize,
        /// Why the line was rejected.
        reason: String,
    },
    /// Raw segmentation text could not be fetched for the given source.
    SourceNotFound(String),
    /// The aligned dataset could not be saved back to the store.
    PersistenceFailure(String),
    /// No image in the dataset matches the requested URL.
    MissingImage(String),
    /// Invalid parameters provided to an operation.
    InvalidParameters(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::ConfigError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(err)
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Storage(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::ConfigError(e) => write!(f, "Configuration error: {}", e),
            Error::JsonError(e) => write!(f, "JSON error: {}", e),
            Error::Storage(e) => write!(f, "Storage error: {}", e),
            Error::InvalidDimension(s) => write!(f, "Invalid image dimension: {}", s),
            Error::InvalidRect(s) => write!(f, "Invalid bounding box: {}", s),
            Error::MalformedLine { line, reason } => {
                write!(f, "Malformed segmentation line {}: {}", line, reason)
            }
            Error::SourceNotFound(s) => write!(f, "Segmentation source not found: {}", s),
            Error::PersistenceFailure(s) => write!(f, "Failed to persist dataset: {}", s),
            Error::MissingImage(s) => write!(f, "Missing image: {}", s),
            Error::InvalidParameters(s) => write!(f, "Invalid parameters: {}", s),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::ConfigError(e) => Some(e),
            Error::JsonError(e) => Some(e),
            Error::Storage(e) => Some(e),
            _ => None,
        }
    }
}
