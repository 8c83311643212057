//! Error types surfaced by the binding.
//!
//! Native failures are polled, not thrown: a native call reports success as
//! a flag and leaves a message on the object. The wrappers turn that message
//! into [`Error::NativeOperationFailed`] verbatim, with no re-wrapping.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A native call reported failure; carries the native message unmodified.
    #[error("{0}")]
    NativeOperationFailed(String),

    /// A dynamically-typed value could not be stored as an attribute.
    #[error("Value type {0} is not one of (string, int, float)")]
    UnsupportedAttributeType(String),

    /// A per-channel array did not have one entry per channel.
    #[error("expected {expected} entries (one per channel), got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// The handle was already released; no native object is reachable.
    #[error("handle has been released")]
    Released,
}

pub type Result<T> = std::result::Result<T, Error>;
