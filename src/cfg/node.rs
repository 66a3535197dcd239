//! Node types for the method control-flow graph.
//!
//! Every method graph carries two sentinel nodes, a virtual ENTRY and a virtual
//! EXIT, with no attached statement. Real nodes wrap one statement identity
//! from the front end and may be flagged as lying inside an exception handler,
//! which makes them ineligible as probe insertion points.

use bitflags::bitflags;

/// Identity of an instrumented method, assigned by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodId(pub u32);

impl std::fmt::Display for MethodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a statement, usable as a probe insertion point.
///
/// Opaque to this crate: the front end guarantees that a `StmtId` names a
/// unique physical location where probe code can be spliced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StmtId(pub u32);

impl std::fmt::Display for StmtId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Index of a node within one method's control-flow graph.
///
/// Node 0 is always the virtual ENTRY and node 1 the virtual EXIT; real nodes
/// start at index 2 in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// The virtual ENTRY sentinel.
    pub const ENTRY: NodeId = NodeId(0);
    /// The virtual EXIT sentinel.
    pub const EXIT: NodeId = NodeId(1);

    /// Creates a node id from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }

    /// Returns `true` if this is the ENTRY or EXIT sentinel.
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        self.0 < 2
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            NodeId::ENTRY => write!(f, "ENTRY"),
            NodeId::EXIT => write!(f, "EXIT"),
            NodeId(n) => write!(f, "{n}"),
        }
    }
}

bitflags! {
    /// Attribute flags on a CFG node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// The node lies inside an exception handler and must never host a probe.
        const IN_HANDLER = 0x01;
    }
}

/// One node of a method control-flow graph.
///
/// Sentinel nodes carry no statement; real nodes carry exactly one.
#[derive(Debug, Clone)]
pub struct CfgNode {
    id: NodeId,
    stmt: Option<StmtId>,
    flags: NodeFlags,
}

impl CfgNode {
    pub(crate) const fn new(id: NodeId, stmt: Option<StmtId>, flags: NodeFlags) -> Self {
        Self { id, stmt, flags }
    }

    /// Returns this node's id.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the statement attached to this node, `None` for sentinels.
    #[must_use]
    pub const fn stmt(&self) -> Option<StmtId> {
        self.stmt
    }

    /// Returns `true` if the node lies inside an exception handler.
    #[must_use]
    pub const fn in_handler(&self) -> bool {
        self.flags.contains(NodeFlags::IN_HANDLER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_ids() {
        assert!(NodeId::ENTRY.is_sentinel());
        assert!(NodeId::EXIT.is_sentinel());
        assert!(!NodeId::new(2).is_sentinel());
        assert_eq!(NodeId::ENTRY.to_string(), "ENTRY");
        assert_eq!(NodeId::EXIT.to_string(), "EXIT");
        assert_eq!(NodeId::new(7).to_string(), "7");
    }

    #[test]
    fn test_node_flags() {
        let plain = CfgNode::new(NodeId::new(2), Some(StmtId(0)), NodeFlags::empty());
        assert!(!plain.in_handler());

        let handler = CfgNode::new(NodeId::new(3), Some(StmtId(1)), NodeFlags::IN_HANDLER);
        assert!(handler.in_handler());
    }
}
