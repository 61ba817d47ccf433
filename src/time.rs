//! Wall-clock helpers.
//!
//! Timestamps are generated locally and never taken from callers, so signed
//! attestations carry a clock the attacker does not control.

/// Returns the current Unix timestamp in seconds.
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Returns the current Unix timestamp in milliseconds.
pub fn now_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
