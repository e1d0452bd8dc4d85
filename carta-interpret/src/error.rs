use thiserror::Error;

/// Errors an evaluation can fail with.
///
/// Cancellation is not an error (see [`crate::EvalStatus::Cancelled`]), and
/// resource degradation is reported through the warning sink instead of
/// failing.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A malformed construct that cannot be repaired: operand damage beyond
    /// the repair threshold, missing required keys, unknown function types.
    ///
    /// With `ignore_errors` enabled the offending unit is skipped instead.
    #[error("malformed content: {0}")]
    Format(String),
    /// A referenced object is not available yet. This is a control-flow
    /// signal to the host to fetch more data and retry; it is re-thrown
    /// regardless of `ignore_errors`.
    #[error("data not yet available: {0}")]
    MissingData(String),
}

impl EvalError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}
