//! Error types for property tree operations

use thiserror::Error;

use crate::hw::HardwareError;
use crate::rpc::RpcError;

/// Errors that can occur when creating, reading or writing tree nodes
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    /// No node exists at the requested path
    #[error("Path not found in property tree: {0}")]
    NotFound(String),

    /// A node already exists at the requested path
    #[error("Path already exists in property tree: {0}")]
    AlreadyExists(String),

    /// Accessor type differs from the type the node was created with
    #[error("Type mismatch at {path}: accessed as {expected}, declared as {actual}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Write attempted on a capability node
    #[error("Attempting to update read-only property {0}")]
    ReadOnly(String),

    /// Node has neither a stored value nor a publisher
    #[error("Cannot read uninitialized property {0}")]
    Uninitialized(String),

    /// Coercer rejected the requested value
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Remote peripheral manager call failed
    #[error("Remote call failed: {0}")]
    Rpc(#[from] RpcError),

    /// Programming a peripheral failed
    #[error("Hardware programming failed: {0}")]
    Hardware(#[from] HardwareError),
}
