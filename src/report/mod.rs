//! Offline reconstruction and reporting.
//!
//! Runs after the instrumented program terminates, over the immutable side
//! files and the recorded coverage arrays: edge counts come back through
//! flow conservation, branch bits by projection through the edge file's
//! branch tags, DUA grades by correlating branch bits with the recorded
//! last-definition data. Results are appended to per-kind matrix files.

pub mod dua;
pub mod duafile;
pub mod edgefile;
pub mod flow;
pub mod matrix;
pub mod reporter;

pub use dua::{classify_all, infer, DuaCoverage};
pub use duafile::{parse_dua_file, parse_index_file, DuaFile, DuaIndex, DuaRecord};
pub use edgefile::{parse_edge_file, EdgeRecord, MethodEdges, NodeRef};
pub use flow::reconstruct;
pub use matrix::MatrixWriter;
pub use reporter::{ReportSummary, Reporter, DUA_FILE, DUA_INDEX_FILE, EDGE_FILE};
