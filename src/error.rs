//! Crate-level error types.

use thiserror::Error;

/// Errors surfaced by the runtime's configuration surface.
///
/// Configuration errors never mutate state: a failed [`set_scheduler`]
/// leaves the previously installed scheduler in place.
///
/// [`set_scheduler`]: crate::scheduler::set_scheduler
#[derive(Debug, Error)]
pub enum SpoolError {
    /// A scheduler has already been installed for this process.
    #[error("scheduler already set")]
    SchedulerAlreadySet,

    /// Worker pools need at least one thread.
    #[error("worker count must be at least 1, got {0}")]
    InvalidWorkerCount(usize),
}
