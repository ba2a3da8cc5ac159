//! Shared fixtures for the daemon test suites.

mod harness;
mod reporter;

pub(crate) use harness::{CoreHarness, TEST_TIMEOUT, core_harness, online_harness};
pub(crate) use reporter::{HealthEvent, RecordingHealthReporter};
