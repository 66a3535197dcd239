//! Shared utilities for the instrumentation engine.

mod bitset;

pub use bitset::BitSet;
