//! Runtime side of the instrumentation: coverage storage and probe
//! semantics.
//!
//! Everything here is allocated once, before any instrumented code runs, and
//! written inline by the target program's own threads with relaxed atomics.
//! The reporter reads it after the program quiesces.

pub mod arrays;
pub mod exec;
pub mod lastdef;
pub mod paths;

pub use arrays::{CoverageArray, CoverageKind, CoverageRegistry};
pub use exec::{AliasedAccess, ProbeExecutor};
pub use lastdef::{AliasedTable, AlwaysLive, LastDefRegisters, Liveness};
pub use paths::PathTracer;
