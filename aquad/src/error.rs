//! The error type shared by every fallible operation in the crate.

use thiserror::Error;

use crate::weights::QuadratureMethod;

/// Errors raised while configuring, building or (de)serializing quadrature
/// trees and batches.
#[derive(Error, Debug)]
pub enum QuadError {
    /// A weights table does not carry nodes and weights for a requested order.
    #[error("{method} table has no nodes/weights for order {order}")]
    OrderNotFound {
        method: QuadratureMethod,
        order: usize,
    },

    /// Scalar configuration that cannot produce a tree.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A persisted document is missing a required field or has the wrong shape.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// JSON text could not be parsed or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a document failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuadError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        QuadError::MalformedDocument(detail.into())
    }

    pub(crate) fn config(detail: impl Into<String>) -> Self {
        QuadError::InvalidConfig(detail.into())
    }

    /// Re-labels a serde decoding failure as a malformed document, keeping
    /// syntax and I/O failures as they are.
    pub(crate) fn from_decode(err: serde_json::Error) -> Self {
        use serde_json::error::Category;
        match err.classify() {
            Category::Data => QuadError::MalformedDocument(err.to_string()),
            Category::Io => QuadError::Io(err.into()),
            Category::Syntax | Category::Eof => QuadError::Json(err),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QuadError>;
