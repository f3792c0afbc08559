use thiserror::Error;

/// Errors raised by the feature registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CapsError {
    /// The registry has no live pool; `init` was never called or every
    /// user already finalized it.
    #[error("feature pool is not initialised")]
    NotInitialised,

    /// `finalize` was called more times than `init`.
    #[error("feature pool finalized more times than it was initialised")]
    UnbalancedFinalize,
}
