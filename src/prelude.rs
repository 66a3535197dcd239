//! # pathprobe Prelude
//!
//! A curated selection of the most frequently used types from across the
//! crate, for convenient glob imports when driving the full pipeline.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all pathprobe operations
pub use crate::Error;

/// The result type used throughout pathprobe
pub use crate::Result;

// ================================================================================================
// Control-Flow Graph Model
// ================================================================================================

pub use crate::cfg::{BranchTable, CfgNode, Edge, EdgeId, EdgeKind, MethodCfg, MethodId, NodeId, StmtId};

// ================================================================================================
// Instrumentation Planning
// ================================================================================================

pub use crate::instrument::{
    CallSite, CallTargets, Dua, DuaPlan, InstrumentOptions, MethodPlan, ProbeOp, ProbePosition,
    ProbeRegistry, ProgramPlan, SpanningWeights, VarStorage,
};

// ================================================================================================
// Runtime
// ================================================================================================

pub use crate::runtime::{
    AliasedTable, CoverageArray, CoverageKind, CoverageRegistry, LastDefRegisters, PathTracer,
    ProbeExecutor,
};

// ================================================================================================
// Reporting
// ================================================================================================

pub use crate::report::{ReportSummary, Reporter, DUA_FILE, DUA_INDEX_FILE, EDGE_FILE};
