// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transient-error classification and jittered exponential backoff.

use std::time::Duration;

use rand::Rng;
use wagate_core::WagateError;

/// Case-insensitive substrings that mark a persistence error as transient.
///
/// This is SQLite's contention vocabulary plus generic I/O hiccups; anything
/// else is treated as poison and goes to the dead-letter log.
const TRANSIENT_MARKERS: [&str; 5] = ["busy", "locked", "timeout", "ioerr", "database is locked"];

/// Whether an error is worth retrying.
pub fn is_transient(err: &WagateError) -> bool {
    let message = err.to_string().to_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| message.contains(m))
}

/// Delay before retry number `attempt` (0-based): capped exponential with
/// up to 20% additive jitter.
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exp = base_ms
        .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
        .min(max_ms);
    let jitter = rand::thread_rng().gen_range(0.0..0.2) * exp as f64;
    Duration::from_millis(exp + jitter as u64)
}
