//! # Error Taxonomy
//!
//! Structured errors for the proximity service. The split matters:
//! hard failures ([`ProximityError`]) abort the single operation that raised
//! them, while non-fatal ingestion rejections ([`ReportOutcome`]) are ordinary
//! data returned to the caller. A stale or rate-limited report is dropped
//! from the data model but never silently.

use crate::types::UserId;
use serde::{Deserialize, Serialize};

/// Errors that can occur during proximity service operations.
#[derive(Debug, thiserror::Error)]
pub enum ProximityError {
    /// Input failed shape or range validation; the caller should not retry
    /// the same payload
    #[error("validation failed: {0}")]
    Validation(String),

    /// The user ID is unknown to the presence registry
    #[error("user {0} is not registered")]
    NotRegistered(UserId),

    /// The entity exists but has no queryable state (e.g. no position yet)
    #[error("user {0} not found or has no current position")]
    NotFound(UserId),

    /// Invariant violation or unexpected internal state. Fatal for the single
    /// operation only; the offending entry is removed and rebuilt from the
    /// user's next valid report
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, ProximityError>;

/// Why a location report was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Report timestamp is older than the entry's current one; out-of-order
    /// reports are dropped, not applied
    Stale,
    /// More than one report inside the configured minimum interval; the
    /// caller should back off and resend later
    RateLimited,
}

/// Outcome of an ingestion attempt.
///
/// Rejections here are non-fatal statuses: the connection stays up, the
/// presence entry is untouched, and the caller can see exactly why the
/// report was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportOutcome {
    /// Whether the report was applied to the registry and spatial index
    pub accepted: bool,
    /// Set when `accepted` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
}

impl ReportOutcome {
    /// An accepted report.
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    /// A rejected report with the given reason.
    pub fn rejected(reason: RejectReason) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
        }
    }
}
