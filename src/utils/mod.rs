//! Helpers shared by the experiment binaries.
//!
//! - **`perf`**: platform-specific performance measurements. Currently it reads
//!   the peak resident set size (RSS) on Linux systems.

pub mod perf;
