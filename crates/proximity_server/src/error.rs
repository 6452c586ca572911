//! Server error types.
//!
//! Transport-level failures are separated from internal failures so callers
//! can tell a bad socket from a broken invariant.

/// Errors raised by the gateway itself (the proximity domain has its own
/// taxonomy in `proximity_core::ProximityError`).
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Socket, bind or protocol failure
    #[error("network error: {0}")]
    Network(String),

    /// Anything else that should not happen
    #[error("internal error: {0}")]
    Internal(String),
}
