//! Errors raised when deriving contexts.

use thiserror::Error;

/// Invalid-argument conditions for [`with_value`](crate::context::with_value)
/// and [`with_local_value`](crate::context::with_local_value).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The caller passed an absent key.
    #[error("nil key")]
    NilKey,
    /// The key has no stable equality (floats, arrays, maps).
    #[error("key is not comparable: {kind}")]
    KeyNotComparable { kind: &'static str },
}

impl ContextError {
    /// Both variants are invalid-argument failures; provided for callers
    /// that only branch on the error class.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::NilKey | Self::KeyNotComparable { .. })
    }
}
