//! # Utility Functions
//!
//! Small shared helpers for the proximity service. All timestamps in the
//! service come from [`current_timestamp_ms`] so that TTL arithmetic is
//! consistent across components.

// ============================================================================
// Utility Functions
// ============================================================================

/// Returns the current Unix timestamp in milliseconds.
///
/// This function provides a consistent way to get server-clock timestamps
/// across the entire system. Presence liveness (`last_seen_ms`) and expiry
/// sweeps must use this function rather than client-supplied report
/// timestamps, which only order reports per user.
///
/// # Panics
///
/// Panics if the system clock is set to a time before the Unix epoch
/// (January 1, 1970). This should never happen in practice on modern systems.
pub fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_is_monotonic_enough() {
        let a = current_timestamp_ms();
        let b = current_timestamp_ms();
        assert!(b >= a);
        // Sanity: after 2020-01-01 in milliseconds.
        assert!(a > 1_577_836_800_000);
    }
}
