//! Maximum-weight spanning tree selection.
//!
//! Edges that land in the spanning tree are omitted from instrumentation:
//! their runtime counts are recovered offline from flow conservation. The
//! selector therefore prefers to put *expensive* edges into the tree — loop
//! back-edges run often, and exception-handler-adjacent edges cannot host
//! probes at all — while cheap, rarely-taken edges get counters.
//!
//! The weight heuristic is a policy knob ([`SpanningWeights`]), not a
//! contract; correctness only requires that the EXIT→ENTRY loop-back edge is
//! always a tree edge and that the tree spans every node.

use crate::{
    cfg::{Edge, MethodCfg},
    utils::BitSet,
    Result,
};

/// Weight policy for spanning-tree selection.
///
/// Larger weights are preferred into the tree (and therefore *not*
/// instrumented). The defaults bias loop back-edges and handler-adjacent
/// edges into the tree; the EXIT→ENTRY edge is always selected first
/// regardless of these values.
#[derive(Debug, Clone, Copy)]
pub struct SpanningWeights {
    /// Weight of an ordinary edge.
    pub base: u32,
    /// Added for loop back-edges, which execute once per iteration.
    pub back_edge: u32,
    /// Added for ENTRY/EXIT-adjacent edges, which execute once per invocation.
    pub synthetic: u32,
    /// Added for edges with an endpoint inside an exception handler.
    pub handler: u32,
}

impl Default for SpanningWeights {
    fn default() -> Self {
        Self {
            base: 1,
            back_edge: 64,
            synthetic: 16,
            handler: 128,
        }
    }
}

impl SpanningWeights {
    fn weight(&self, cfg: &MethodCfg, edge: &Edge, back_edges: &BitSet) -> u64 {
        let mut w = u64::from(self.base);
        if back_edges.contains(edge.id().index()) {
            w += u64::from(self.back_edge);
        }
        if edge.kind().is_synthetic() {
            w += u64::from(self.synthetic);
        }
        let src_handler = cfg.node(edge.source()).is_some_and(|n| n.in_handler());
        let tgt_handler = cfg.node(edge.target()).is_some_and(|n| n.in_handler());
        if src_handler || tgt_handler {
            w += u64::from(self.handler);
        }
        w
    }
}

/// The tree/instrumented partition of one method's edge set.
#[derive(Debug, Clone)]
pub struct SpanningTree {
    in_tree: BitSet,
}

impl SpanningTree {
    /// Selects a maximum-weight spanning tree over the method's edges.
    ///
    /// Edges are treated as undirected for selection purposes. The EXIT→ENTRY
    /// loop-back edge is forced into the tree; ties are broken by creation
    /// order so the partition is deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Disconnected`] if the edge set does not reach
    /// every node, in which case no valid spanning tree exists and
    /// instrumentation must abort.
    pub fn select(cfg: &MethodCfg, weights: &SpanningWeights) -> Result<Self> {
        let back_edges = cfg.back_edges();

        // Sort by weight, heaviest first; the loop-back edge is pinned ahead
        // of everything. Stable sort keeps creation order among equals.
        let mut order: Vec<&Edge> = cfg.edges().iter().collect();
        order.sort_by_key(|e| {
            if e.is_exit_loop() {
                std::cmp::Reverse(u64::MAX)
            } else {
                std::cmp::Reverse(weights.weight(cfg, e, &back_edges))
            }
        });

        let mut components = UnionFind::new(cfg.node_count());
        let mut in_tree = BitSet::new(cfg.edge_count());

        for edge in order {
            if components.union(edge.source().index(), edge.target().index()) {
                in_tree.insert(edge.id().index());
            }
        }

        if components.count() != 1 {
            return Err(crate::Error::Disconnected(cfg.method()));
        }

        Ok(Self { in_tree })
    }

    /// Returns `true` if the edge is a tree edge (omitted from instrumentation).
    #[must_use]
    pub fn contains(&self, edge: &Edge) -> bool {
        self.in_tree.contains(edge.id().index())
    }

    /// Returns the number of tree edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.in_tree.count()
    }

    /// Returns `true` if the tree is empty (never the case for a valid graph).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.in_tree.is_empty()
    }

    /// Returns the edges that need a runtime counter, in creation order.
    #[must_use]
    pub fn instrumented<'a>(&'a self, cfg: &'a MethodCfg) -> impl Iterator<Item = &'a Edge> {
        cfg.edges().iter().filter(|e| !self.contains(e))
    }
}

/// Union-find over node indices with path halving and union by size.
struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
    components: usize,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
            components: n,
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merges the two components; returns `false` if already merged.
    fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        self.components -= 1;
        true
    }

    fn count(&self) -> usize {
        self.components
    }
}
