//! Benchmark utilities for Apparatus.
//!
//! - **Mechanism benchmarks**: spawning, serial and concurrent iteration, trait migration and
//!   deferred flushing
//! - **Cage benchmarks**: whole bubble evaluations over seeded populations
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench -p apparatus_bench
//!
//! # Run specific benchmark group
//! cargo bench -p apparatus_bench -- cage
//! ```
//!
//! Results are written to `target/criterion/` with HTML reports for visualization.

pub mod traits;
pub mod scenarios;
