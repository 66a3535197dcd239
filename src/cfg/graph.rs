//! Method control-flow graph construction and queries.
//!
//! [`MethodCfg`] is the build-time representation consumed by every
//! instrumentation pass: nodes with ordered successor/predecessor edge lists,
//! the ENTRY/EXIT sentinels, and the synthetic EXIT→ENTRY loop-back edge that
//! is created with the graph itself. The graph is constructed once from the
//! front end's output and never mutated afterwards; the instrumentation passes
//! only read it.
//!
//! # Branch indices
//!
//! A branch is the outgoing edge set of any node with out-degree greater than
//! one. Branches receive process-wide global indices through [`BranchTable`],
//! assigned in one fixed pass (method order, then node order, then successor
//! order) so that the index space agrees between the instrumented program and
//! the offline reconstruction metadata.

use std::collections::HashMap;

use crate::{
    cfg::{CfgNode, Edge, EdgeId, EdgeKind, MethodId, NodeFlags, NodeId, StmtId},
    utils::BitSet,
    Result,
};

/// A method's control-flow graph.
///
/// Node 0 is the virtual ENTRY, node 1 the virtual EXIT; edge 0 is always the
/// synthetic EXIT→ENTRY loop-back edge. Successor and predecessor lists keep
/// edges in creation order, which downstream passes rely on for deterministic
/// index assignment.
#[derive(Debug, Clone)]
pub struct MethodCfg {
    method: MethodId,
    nodes: Vec<CfgNode>,
    edges: Vec<Edge>,
    /// Outgoing edge ids per node, in creation order.
    succs: Vec<Vec<EdgeId>>,
    /// Incoming edge ids per node, in creation order.
    preds: Vec<Vec<EdgeId>>,
    /// Statement identity to node lookup.
    by_stmt: HashMap<StmtId, NodeId>,
}

impl MethodCfg {
    /// Creates an empty graph for the given method.
    ///
    /// The ENTRY and EXIT sentinels and the EXIT→ENTRY loop-back edge exist
    /// from the start.
    #[must_use]
    pub fn new(method: MethodId) -> Self {
        let nodes = vec![
            CfgNode::new(NodeId::ENTRY, None, NodeFlags::empty()),
            CfgNode::new(NodeId::EXIT, None, NodeFlags::empty()),
        ];
        let exit_loop = Edge::new(EdgeId::new(0), NodeId::EXIT, NodeId::ENTRY, EdgeKind::ExitLoop);

        Self {
            method,
            nodes,
            edges: vec![exit_loop],
            succs: vec![Vec::new(), vec![EdgeId::new(0)]],
            preds: vec![vec![EdgeId::new(0)], Vec::new()],
            by_stmt: HashMap::new(),
        }
    }

    /// Returns the method this graph belongs to.
    #[must_use]
    pub const fn method(&self) -> MethodId {
        self.method
    }

    /// Adds a real node wrapping one statement.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MalformedCfg`] if the statement is already
    /// attached to another node.
    pub fn add_node(&mut self, stmt: StmtId, in_handler: bool) -> Result<NodeId> {
        if self.by_stmt.contains_key(&stmt) {
            return Err(crate::Error::MalformedCfg {
                method: self.method,
                message: format!("statement {stmt} attached to more than one node"),
            });
        }

        let id = NodeId::new(self.nodes.len());
        let flags = if in_handler {
            NodeFlags::IN_HANDLER
        } else {
            NodeFlags::empty()
        };

        self.nodes.push(CfgNode::new(id, Some(stmt), flags));
        self.succs.push(Vec::new());
        self.preds.push(Vec::new());
        self.by_stmt.insert(stmt, id);
        Ok(id)
    }

    /// Adds a directed edge.
    ///
    /// The edge kind is derived from the endpoints: edges out of ENTRY and
    /// into EXIT become synthetic [`EdgeKind::Entry`]/[`EdgeKind::Exit`]
    /// edges, everything else is classified by `falls_through`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MalformedCfg`] if an endpoint is out of range,
    /// if the edge targets ENTRY or leaves EXIT (only the built-in loop-back
    /// edge may do that), or if it connects the two sentinels directly.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, falls_through: bool) -> Result<EdgeId> {
        let malformed = |message: String| crate::Error::MalformedCfg {
            method: self.method,
            message,
        };

        if source.index() >= self.nodes.len() || target.index() >= self.nodes.len() {
            return Err(malformed(format!("edge {source}->{target} references unknown node")));
        }
        if source == NodeId::EXIT || target == NodeId::ENTRY {
            return Err(malformed(format!(
                "edge {source}->{target} conflicts with the synthetic EXIT->ENTRY edge"
            )));
        }
        if source == NodeId::ENTRY && target == NodeId::EXIT {
            return Err(malformed("ENTRY may not connect directly to EXIT".to_string()));
        }

        let kind = if source == NodeId::ENTRY {
            EdgeKind::Entry
        } else if target == NodeId::EXIT {
            EdgeKind::Exit
        } else if falls_through {
            EdgeKind::FallThrough
        } else {
            EdgeKind::Jump
        };

        let id = EdgeId::new(self.edges.len());
        self.edges.push(Edge::new(id, source, target, kind));
        self.succs[source.index()].push(id);
        self.preds[target.index()].push(id);
        Ok(id)
    }

    /// Returns the node with the given id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&CfgNode> {
        self.nodes.get(id.index())
    }

    /// Returns the edge with the given id.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index())
    }

    /// Returns all nodes, sentinels first.
    #[must_use]
    pub fn nodes(&self) -> &[CfgNode] {
        &self.nodes
    }

    /// Returns all edges in creation order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Returns the number of nodes, sentinels included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of edges, the loop-back edge included.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns the outgoing edges of a node, in creation order.
    #[must_use]
    pub fn outgoing(&self, node: NodeId) -> &[EdgeId] {
        self.succs.get(node.index()).map_or(&[], Vec::as_slice)
    }

    /// Returns the incoming edges of a node, in creation order.
    #[must_use]
    pub fn incoming(&self, node: NodeId) -> &[EdgeId] {
        self.preds.get(node.index()).map_or(&[], Vec::as_slice)
    }

    /// Returns the node a statement is attached to.
    #[must_use]
    pub fn node_of_stmt(&self, stmt: StmtId) -> Option<NodeId> {
        self.by_stmt.get(&stmt).copied()
    }

    /// Returns the id of the synthetic EXIT→ENTRY loop-back edge.
    #[must_use]
    pub fn exit_loop_edge(&self) -> EdgeId {
        EdgeId::new(0)
    }

    /// Returns `true` if a probe may be placed at this node.
    ///
    /// Sentinels have no physical location and exception-handler nodes are
    /// never instrumented.
    #[must_use]
    pub fn can_host_probe(&self, node: NodeId) -> bool {
        self.node(node)
            .is_some_and(|n| !n.id().is_sentinel() && !n.in_handler())
    }

    /// Classifies loop back-edges via depth-first search from ENTRY.
    ///
    /// An edge is a back-edge if its target is an ancestor of its source on
    /// the current DFS path. The EXIT→ENTRY loop-back edge is excluded from
    /// the traversal entirely; it is handled specially by every pass.
    ///
    /// Returns a bit set over edge ids.
    #[must_use]
    pub fn back_edges(&self) -> BitSet {
        let mut back = BitSet::new(self.edges.len());
        let mut on_path = vec![false; self.nodes.len()];
        let mut visited = vec![false; self.nodes.len()];

        // Iterative DFS keeping (node, next outgoing index) frames so that
        // on_path exactly mirrors the current traversal path.
        let mut stack: Vec<(NodeId, usize)> = vec![(NodeId::ENTRY, 0)];
        visited[NodeId::ENTRY.index()] = true;
        on_path[NodeId::ENTRY.index()] = true;

        while let Some((node, edge_idx)) = stack.last_mut() {
            let out = self.outgoing(*node);
            if *edge_idx >= out.len() {
                on_path[node.index()] = false;
                stack.pop();
                continue;
            }

            let edge_id = out[*edge_idx];
            *edge_idx += 1;

            let edge = &self.edges[edge_id.index()];
            if edge.is_exit_loop() {
                continue;
            }

            let target = edge.target();
            if on_path[target.index()] {
                back.insert(edge_id.index());
            } else if !visited[target.index()] {
                visited[target.index()] = true;
                on_path[target.index()] = true;
                stack.push((target, 0));
            }
        }

        back
    }

    /// Returns the branches of this method in stable order.
    ///
    /// A branch is the ordered outgoing edge set of any node whose real
    /// out-degree (loop-back edge excluded) is greater than one. Nodes are
    /// visited in id order, edges in successor order.
    #[must_use]
    pub fn branches(&self) -> Vec<Vec<EdgeId>> {
        let mut result = Vec::new();
        for node in &self.nodes {
            let out: Vec<EdgeId> = self
                .outgoing(node.id())
                .iter()
                .copied()
                .filter(|e| !self.edges[e.index()].is_exit_loop())
                .collect();
            if out.len() > 1 {
                result.push(out);
            }
        }
        result
    }
}

/// Process-wide assignment of global branch indices.
///
/// Indices are assigned once, in branch-list iteration order, and are stable
/// for the lifetime of a run. The same table instance must be threaded through
/// the instrumentation of every method so that branch tags in the edge file
/// and the runtime branch coverage array agree.
#[derive(Debug, Default)]
pub struct BranchTable {
    by_edge: HashMap<(MethodId, EdgeId), u32>,
    count: u32,
}

impl BranchTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns global indices to every branch edge of the given method.
    ///
    /// Safe to call once per method; edges that already carry an index keep
    /// it, so re-assignment cannot shift the index space.
    pub fn assign(&mut self, cfg: &MethodCfg) {
        for branch in cfg.branches() {
            for edge in branch {
                self.by_edge.entry((cfg.method(), edge)).or_insert_with(|| {
                    let idx = self.count;
                    self.count += 1;
                    idx
                });
            }
        }
    }

    /// Returns the global branch index of an edge, if it belongs to a branch.
    #[must_use]
    pub fn index_of(&self, method: MethodId, edge: EdgeId) -> Option<u32> {
        self.by_edge.get(&(method, edge)).copied()
    }

    /// Returns the number of branch edges assigned so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count as usize
    }

    /// Returns `true` if no branch has been assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ENTRY -> A -> {B, C} -> D -> EXIT, a 2-branch diamond.
    pub(crate) fn diamond() -> (MethodCfg, [NodeId; 4]) {
        let mut cfg = MethodCfg::new(MethodId(0));
        let a = cfg.add_node(StmtId(0), false).unwrap();
        let b = cfg.add_node(StmtId(1), false).unwrap();
        let c = cfg.add_node(StmtId(2), false).unwrap();
        let d = cfg.add_node(StmtId(3), false).unwrap();

        cfg.add_edge(NodeId::ENTRY, a, false).unwrap();
        cfg.add_edge(a, b, true).unwrap();
        cfg.add_edge(a, c, false).unwrap();
        cfg.add_edge(b, d, true).unwrap();
        cfg.add_edge(c, d, true).unwrap();
        cfg.add_edge(d, NodeId::EXIT, false).unwrap();

        (cfg, [a, b, c, d])
    }

    /// ENTRY -> A -> B -> A (back edge), B -> EXIT.
    fn simple_loop() -> (MethodCfg, NodeId, NodeId, EdgeId) {
        let mut cfg = MethodCfg::new(MethodId(0));
        let a = cfg.add_node(StmtId(0), false).unwrap();
        let b = cfg.add_node(StmtId(1), false).unwrap();

        cfg.add_edge(NodeId::ENTRY, a, false).unwrap();
        cfg.add_edge(a, b, true).unwrap();
        let back = cfg.add_edge(b, a, false).unwrap();
        cfg.add_edge(b, NodeId::EXIT, true).unwrap();

        (cfg, a, b, back)
    }

    #[test]
    fn test_new_graph_has_sentinels_and_loopback() {
        let cfg = MethodCfg::new(MethodId(7));
        assert_eq!(cfg.node_count(), 2);
        assert_eq!(cfg.edge_count(), 1);

        let e = cfg.edge(cfg.exit_loop_edge()).unwrap();
        assert!(e.is_exit_loop());
        assert_eq!(e.source(), NodeId::EXIT);
        assert_eq!(e.target(), NodeId::ENTRY);
    }

    #[test]
    fn test_edge_kinds_derived() {
        let (cfg, [a, b, _, d]) = diamond();

        let entry = cfg.outgoing(NodeId::ENTRY)[0];
        assert_eq!(cfg.edge(entry).unwrap().kind(), EdgeKind::Entry);

        let exit = cfg.outgoing(d)[0];
        assert_eq!(cfg.edge(exit).unwrap().kind(), EdgeKind::Exit);

        let fall = cfg.outgoing(a)[0];
        assert_eq!(cfg.edge(fall).unwrap().kind(), EdgeKind::FallThrough);
        assert_eq!(cfg.edge(fall).unwrap().target(), b);

        let jump = cfg.outgoing(a)[1];
        assert_eq!(cfg.edge(jump).unwrap().kind(), EdgeKind::Jump);
    }

    #[test]
    fn test_add_edge_rejects_sentinel_misuse() {
        let mut cfg = MethodCfg::new(MethodId(0));
        let a = cfg.add_node(StmtId(0), false).unwrap();

        assert!(cfg.add_edge(NodeId::EXIT, a, false).is_err());
        assert!(cfg.add_edge(a, NodeId::ENTRY, false).is_err());
        assert!(cfg.add_edge(NodeId::ENTRY, NodeId::EXIT, false).is_err());
        assert!(cfg.add_edge(a, NodeId::new(99), false).is_err());
    }

    #[test]
    fn test_duplicate_stmt_rejected() {
        let mut cfg = MethodCfg::new(MethodId(0));
        cfg.add_node(StmtId(0), false).unwrap();
        assert!(cfg.add_node(StmtId(0), false).is_err());
    }

    #[test]
    fn test_back_edge_detection() {
        let (cfg, _, _, back) = simple_loop();
        let backs = cfg.back_edges();
        assert_eq!(backs.count(), 1);
        assert!(backs.contains(back.index()));
    }

    #[test]
    fn test_diamond_has_no_back_edges() {
        let (cfg, _) = diamond();
        assert!(cfg.back_edges().is_empty());
    }

    #[test]
    fn test_branches() {
        let (cfg, [a, ..]) = diamond();
        let branches = cfg.branches();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].len(), 2);
        assert_eq!(cfg.edge(branches[0][0]).unwrap().source(), a);
    }

    #[test]
    fn test_branch_table_stable_across_methods() {
        let (cfg_a, _) = diamond();
        let mut cfg_b = MethodCfg::new(MethodId(1));
        let n = cfg_b.add_node(StmtId(0), false).unwrap();
        let m = cfg_b.add_node(StmtId(1), false).unwrap();
        let k = cfg_b.add_node(StmtId(2), false).unwrap();
        cfg_b.add_edge(NodeId::ENTRY, n, false).unwrap();
        cfg_b.add_edge(n, m, true).unwrap();
        cfg_b.add_edge(n, k, false).unwrap();
        cfg_b.add_edge(m, NodeId::EXIT, true).unwrap();
        cfg_b.add_edge(k, NodeId::EXIT, true).unwrap();

        let mut table = BranchTable::new();
        table.assign(&cfg_a);
        table.assign(&cfg_b);

        // Method 0's branch edges take indices 0/1, method 1's take 2/3.
        assert_eq!(table.len(), 4);
        let branches_b = cfg_b.branches();
        assert_eq!(table.index_of(MethodId(1), branches_b[0][0]), Some(2));
        assert_eq!(table.index_of(MethodId(1), branches_b[0][1]), Some(3));

        // Re-assignment must not shift the index space.
        table.assign(&cfg_a);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_probe_hosting() {
        let mut cfg = MethodCfg::new(MethodId(0));
        let a = cfg.add_node(StmtId(0), false).unwrap();
        let h = cfg.add_node(StmtId(1), true).unwrap();

        assert!(cfg.can_host_probe(a));
        assert!(!cfg.can_host_probe(h));
        assert!(!cfg.can_host_probe(NodeId::ENTRY));
        assert!(!cfg.can_host_probe(NodeId::EXIT));
    }
}
