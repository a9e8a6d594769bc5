//! Periodic job scheduling.
//!
//! A [`Scheduler`] owns its job table. Each registered job gets one ticker
//! task that triggers it on a fixed interval, never overlaps a run with its
//! own previous run, and coalesces missed ticks into a single catch-up run.

pub mod scheduler;

pub use scheduler::{JobSpec, JobStats, Scheduler};
