//! Error types for graph operations that can fail.

use thiserror::Error;

/// Failure to sample a behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SampleError {
    /// The behavior is a placeholder that has not been replaced yet.
    #[error("sampled a placeholder that has not been replaced")]
    PlaceholderNotReplaced,
    /// The behavior is push-driven but nothing has been pushed yet, so there
    /// is no current value to read.
    #[error("sampled a push reactive before any value was pushed")]
    NoValue,
}

/// Failure to replace a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReplaceError {
    /// The placeholder has already been replaced once.
    #[error("placeholder has already been replaced")]
    AlreadyReplaced,
}
