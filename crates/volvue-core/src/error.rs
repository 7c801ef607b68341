//! Error types for volvue

use std::sync::Arc;
use thiserror::Error;

/// Main error type for volvue operations
#[derive(Error, Debug)]
pub enum VolvueError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Time index {index} out of range (time dimension size {size})")]
    TimeOutOfRange { index: u64, size: u64 },

    #[error("Unsupported element layout: {components} components of {dtype}")]
    UnsupportedComponents { components: usize, dtype: String },

    #[error("Store failure for array {array}: {source}")]
    StoreFailure {
        array: String,
        /// Underlying store error, refcounted so coalesced fetches can
        /// hand the same cause to every waiter
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    #[error("Cancelled")]
    Cancelled,

    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VolvueError {
    /// True for supersession/user aborts, which are quiet by contract
    pub fn is_cancelled(&self) -> bool {
        matches!(self, VolvueError::Cancelled)
    }

    /// Wrap a store-side failure, chaining the underlying cause
    pub fn store(
        array: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> VolvueError {
        VolvueError::StoreFailure {
            array: array.into(),
            source: Arc::new(source),
        }
    }

    /// Rebuild an owned copy of this error. `VolvueError` cannot derive
    /// `Clone` because of its wrapped sources; coalesced fetches need to
    /// hand the same failure to every waiter.
    pub fn duplicate(&self) -> VolvueError {
        match self {
            VolvueError::InvalidArgument(m) => VolvueError::InvalidArgument(m.clone()),
            VolvueError::InvalidGeometry(m) => VolvueError::InvalidGeometry(m.clone()),
            VolvueError::TimeOutOfRange { index, size } => VolvueError::TimeOutOfRange {
                index: *index,
                size: *size,
            },
            VolvueError::UnsupportedComponents { components, dtype } => {
                VolvueError::UnsupportedComponents {
                    components: *components,
                    dtype: dtype.clone(),
                }
            }
            VolvueError::StoreFailure { array, source } => VolvueError::StoreFailure {
                array: array.clone(),
                source: Arc::clone(source),
            },
            VolvueError::Cancelled => VolvueError::Cancelled,
            VolvueError::InternalInvariant(m) => VolvueError::InternalInvariant(m.clone()),
            VolvueError::Metadata(m) => VolvueError::Metadata(m.clone()),
            VolvueError::Serialization(e) => VolvueError::Metadata(e.to_string()),
        }
    }

    /// Coarse classification tag used by `loading-error` events
    pub fn kind(&self) -> ErrorKind {
        match self {
            VolvueError::InvalidArgument(_)
            | VolvueError::TimeOutOfRange { .. }
            | VolvueError::UnsupportedComponents { .. } => ErrorKind::InvalidArgument,
            VolvueError::InvalidGeometry(_) => ErrorKind::InvalidGeometry,
            VolvueError::StoreFailure { .. } => ErrorKind::StoreFailure,
            VolvueError::Cancelled => ErrorKind::Cancelled,
            VolvueError::InternalInvariant(_) => ErrorKind::InternalInvariant,
            VolvueError::Metadata(_) | VolvueError::Serialization(_) => ErrorKind::InvalidArgument,
        }
    }
}

/// Error kinds surfaced to event listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidGeometry,
    StoreFailure,
    Cancelled,
    InternalInvariant,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidArgument => write!(f, "invalid-argument"),
            ErrorKind::InvalidGeometry => write!(f, "invalid-geometry"),
            ErrorKind::StoreFailure => write!(f, "store-failure"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::InternalInvariant => write!(f, "internal-invariant"),
        }
    }
}

pub type Result<T> = std::result::Result<T, VolvueError>;

/// Comprehensive test suite with Arrange-Act-Assert pattern
#[cfg(test)]
mod tests {
    include!("error_test.rs");
}
