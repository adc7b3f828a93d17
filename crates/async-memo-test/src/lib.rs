//! Helpers for testing memoizers.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Run time-dependent tests on a paused clock, using `#[tokio::test(start_paused = true)]`.
//!    Sleeping then advances the clock instantly, and [`advance_to`] can be used to move to an
//!    absolute point in time relative to the start of the test.

use std::time::Duration;

use tokio::time::Instant;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `async_memo` crate and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("async_memo=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Sleeps until `millis` milliseconds have passed since `start`.
///
/// Everything that was scheduled to happen before that point in time has run once this returns.
pub async fn advance_to(start: Instant, millis: u64) {
    tokio::time::sleep_until(start + Duration::from_millis(millis)).await;
}

/// Shorthand for a duration of `millis` milliseconds.
pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
