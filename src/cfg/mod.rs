//! Method control-flow graph model.
//!
//! This module provides the build-time CFG consumed by the instrumentation
//! passes. Parsing a program into these graphs is the front end's job (see the
//! crate-level input contract); here the graph is a pure data structure with
//! ordered adjacency, sentinel ENTRY/EXIT nodes, the synthetic EXIT→ENTRY
//! loop-back edge, back-edge classification, and global branch indexing.
//!
//! # Key Components
//!
//! - [`MethodCfg`] - one method's graph with ordered successor/predecessor lists
//! - [`Edge`] / [`EdgeKind`] - edges as the unit of instrumentation
//! - [`BranchTable`] - process-wide, stable global branch indices

mod edge;
mod graph;
mod node;

pub use edge::{Edge, EdgeId, EdgeKind};
pub use graph::{BranchTable, MethodCfg};
pub use node::{CfgNode, MethodId, NodeFlags, NodeId, StmtId};
