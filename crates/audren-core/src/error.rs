//! Error types for renderer updates.
//!
//! Two tiers exist. [`ErrorInfo`] records a per-entity failure (an effect whose
//! work buffer could not be mapped, a sink whose ring buffer is outside every
//! memory pool). It is absorbed: the entity is skipped for the frame and the
//! info is reported back with the out statuses. [`UpdateError`] is structural
//! and aborts the whole update call.

use crate::graph::GraphError;
use thiserror::Error;

/// Result codes carried by an [`ErrorInfo`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A guest buffer could not be translated through any memory pool.
    InvalidAddressInfo,
    /// A parameter block was rejected.
    InvalidUpdateInfo,
    /// A fixed-size pool (for example upsamplers) was exhausted.
    OutOfResource,
}

/// A per-entity error reported back to the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorInfo {
    /// What went wrong.
    pub code: ErrorCode,
    /// Code-specific detail, usually the offending guest address.
    pub extra: u64,
}

impl ErrorInfo {
    /// Creates an error info.
    pub fn new(code: ErrorCode, extra: u64) -> Self {
        Self { code, extra }
    }
}

/// Structural failures that abort an update.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// The number of parameter blocks does not match the renderer's allocation.
    #[error("expected {expected} {kind} parameters, got {given}")]
    ParameterCount {
        /// Which parameter list.
        kind: &'static str,
        /// Count the renderer was created with.
        expected: usize,
        /// Count the caller provided.
        given: usize,
    },

    /// A used mix routes to a mix id outside the allocation.
    #[error("mix {mix} routes to out-of-range destination {destination}")]
    InvalidDestination {
        /// Offending mix id.
        mix: i32,
        /// Requested destination id.
        destination: i32,
    },

    /// The used mixes claim more mix buffers than the renderer owns.
    #[error("mixes require {required} mix buffers but only {available} exist")]
    MixBufferOverflow {
        /// Sum of buffer counts over used mixes.
        required: u32,
        /// Mix buffers allocated to the renderer.
        available: u32,
    },

    /// A dirty-only mix parameter names a mix id outside the allocation.
    #[error("mix id {0} is out of range")]
    MixIdOutOfRange(i32),

    /// The routed mix graph could not be ordered.
    #[error("mix graph could not be sorted: {0}")]
    InvalidMixSorting(#[from] GraphError),

    /// Renderer construction was given unusable limits.
    #[error("invalid renderer parameters: {0}")]
    InvalidParameters(String),
}

/// Convenience result type for renderer updates.
pub type Result<T> = std::result::Result<T, UpdateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = UpdateError::ParameterCount {
            kind: "mix",
            expected: 4,
            given: 3,
        };
        assert_eq!(err.to_string(), "expected 4 mix parameters, got 3");

        let err = UpdateError::MixBufferOverflow {
            required: 30,
            available: 24,
        };
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn sorting_error_wraps_graph_error() {
        let err: UpdateError = GraphError::CycleDetected { node: 3 }.into();
        assert!(matches!(
            err,
            UpdateError::InvalidMixSorting(GraphError::CycleDetected { node: 3 })
        ));
        assert!(err.to_string().contains("cycle"));
    }
}
