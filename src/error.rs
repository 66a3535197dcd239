use thiserror::Error;

use crate::cfg::MethodId;

macro_rules! inconsistent_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Inconsistent {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Inconsistent {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can
/// potentially return.
///
/// Build-time errors (a malformed CFG, a missing branch requirement, an edge set that
/// cannot form a spanning tree) are fatal by design: instrumentation must abort rather
/// than emit side files that disagree with the instrumented program. Report-side parse
/// errors are recoverable per coverage kind; the reporter catches them and skips the
/// affected kind.
///
/// # Error Categories
///
/// ## Build-time (fatal)
/// - [`Error::MalformedCfg`] - CFG violates a structural invariant
/// - [`Error::Disconnected`] - the edge set does not span every node
/// - [`Error::MissingRequirement`] - a DUA lacks its branch-requirement data
/// - [`Error::PathsExceeded`] - a method's acyclic path count exceeds the cap
///
/// ## Report-time
/// - [`Error::Parse`] - malformed edge/DUA side file
/// - [`Error::Inconsistent`] - internal consistency failure during reconstruction
/// - [`Error::FileError`] - filesystem I/O failure
#[derive(Error, Debug)]
pub enum Error {
    /// The control-flow graph violates a structural invariant.
    ///
    /// Raised when an edge references a node outside the graph, a sentinel is
    /// used where a real node is required, or a statement is attached to more
    /// than one node.
    #[error("Malformed CFG in method {method} - {message}")]
    MalformedCfg {
        /// The method whose graph is malformed
        method: MethodId,
        /// What was violated
        message: String,
    },

    /// The method's edge set does not connect every node.
    ///
    /// A valid spanning tree must reach every node of the method; a disconnected
    /// graph means some node has no path to ENTRY and the front end produced an
    /// incomplete graph.
    #[error("Edge set of method {0} does not span all nodes")]
    Disconnected(MethodId),

    /// A DUA was supplied without one of its four branch-requirement sets.
    ///
    /// The upstream reaching-definition analysis must provide reach-def,
    /// reach-use, in-order-kill, and not-in-order-kill sets for every DUA.
    #[error("DUA '{0}' is missing branch-requirement data")]
    MissingRequirement(String),

    /// A method's acyclic path count exceeds the configured maximum.
    ///
    /// The path-coverage array for this method would be larger than
    /// `InstrumentOptions::max_paths` entries. Callers normally catch this and
    /// skip path instrumentation for the method.
    #[error("Method {method} has {paths} acyclic paths, above the cap of {cap}")]
    PathsExceeded {
        /// The offending method
        method: MethodId,
        /// The computed number of acyclic ENTRY-to-EXIT paths
        paths: u64,
        /// The configured cap
        cap: u64,
    },

    /// A side file (edge file, DUA file, DUA index file) could not be parsed.
    ///
    /// Carries the 1-based line number where parsing failed.
    #[error("Parse error at line {line}: {message}")]
    Parse {
        /// What was malformed
        message: String,
        /// The 1-based line in the side file
        line: usize,
    },

    /// Internal-consistency failure.
    ///
    /// Raised when reconstruction finds a node with more than one unresolved
    /// tree edge, a negative solved count, or non-zero net flow at the DFS
    /// origin. These indicate that the side files do not match the program
    /// that produced the runtime data, and are not user-recoverable.
    #[error("Inconsistent - {file}:{line}: {message}")]
    Inconsistent {
        /// What disagreed
        message: String,
        /// The source file in which this error was detected
        file: &'static str,
        /// The source line in which this error was detected
        line: u32,
    },

    /// File I/O error.
    ///
    /// Wraps standard I/O errors from reading or writing side files and
    /// coverage matrices.
    #[error("{0}")]
    FileError(#[from] std::io::Error),
}
