//! Monotonic time source and deadline arithmetic.
//!
//! Everything time-related in the runtime goes through this module so that
//! deadlines are always computed against the same monotonic clock. Wall
//! clocks are never consulted: delayed delivery and receive timeouts must
//! not jump when the system time is adjusted.

pub use std::time::{Duration, Instant};

/// Current instant on the monotonic clock.
#[must_use]
pub fn now() -> Instant {
    Instant::now()
}

/// Deadline `delay` from now.
#[must_use]
pub fn after(delay: Duration) -> Instant {
    now() + delay
}

// ── Tests ───────────────────────────────────────────────────────────────
