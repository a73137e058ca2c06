//! Batch drivers shared by the `prodforge` binary and its integration tests.

pub mod sweep;

pub use sweep::{RoleUsage, SweepError, SweepOptions, UsageReport, missing_outputs, usage_report};
