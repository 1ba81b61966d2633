//! Telemetry initialization shared by the daemon and tests.

pub mod tracing;
