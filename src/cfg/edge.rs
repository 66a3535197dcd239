//! Control-flow edge types.
//!
//! Edges are the unit of instrumentation. Each edge is an ordered pair of
//! nodes, possibly involving the ENTRY/EXIT sentinels, and carries a kind that
//! determines where a probe for it would be physically placed: fall-through
//! edges are probed directly after their source statement, jump edges before
//! their (redirected) target, and sentinel-adjacent edges at the top of the
//! method or before the return-like statement.
//!
//! The synthetic EXIT→ENTRY loop-back edge represents "one more invocation" of
//! the method. It always lands in the spanning tree and is never instrumented,
//! which keeps the method-invocation count derivable from the others.

use crate::cfg::NodeId;

/// Index of an edge within one method's edge set, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(usize);

impl EdgeId {
    /// Creates an edge id from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// The kind of control flow represented by an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Physically adjacent flow: the target directly follows the source.
    FallThrough,
    /// A jump: the target is reached via explicit control transfer.
    Jump,
    /// Synthetic edge out of the virtual ENTRY node.
    Entry,
    /// Edge into the virtual EXIT node (a return-like statement).
    Exit,
    /// The synthetic EXIT→ENTRY loop-back edge.
    ExitLoop,
}

impl EdgeKind {
    /// Returns `true` if the edge falls through from its source.
    #[must_use]
    pub const fn falls_through(&self) -> bool {
        matches!(self, Self::FallThrough)
    }

    /// Returns `true` if the edge touches a sentinel node.
    #[must_use]
    pub const fn is_synthetic(&self) -> bool {
        matches!(self, Self::Entry | Self::Exit | Self::ExitLoop)
    }
}

/// An edge in the control-flow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    id: EdgeId,
    source: NodeId,
    target: NodeId,
    kind: EdgeKind,
}

impl Edge {
    pub(crate) const fn new(id: EdgeId, source: NodeId, target: NodeId, kind: EdgeKind) -> Self {
        Self {
            id,
            source,
            target,
            kind,
        }
    }

    /// Returns this edge's id.
    #[must_use]
    pub const fn id(&self) -> EdgeId {
        self.id
    }

    /// Returns the source node.
    #[must_use]
    pub const fn source(&self) -> NodeId {
        self.source
    }

    /// Returns the target node.
    #[must_use]
    pub const fn target(&self) -> NodeId {
        self.target
    }

    /// Returns the kind of control flow this edge represents.
    #[must_use]
    pub const fn kind(&self) -> EdgeKind {
        self.kind
    }

    /// Returns `true` if this is the synthetic EXIT→ENTRY loop-back edge.
    #[must_use]
    pub const fn is_exit_loop(&self) -> bool {
        matches!(self.kind, EdgeKind::ExitLoop)
    }

    /// Returns the textual description used in the edge file, e.g. `ENTRY->2`.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{}->{}", self.source, self.target)
    }
}
