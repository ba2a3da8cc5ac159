//! Test suites for the wallet daemon.

pub(crate) mod support;
