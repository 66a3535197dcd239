//! Edge and branch instrumentation.
//!
//! Every edge not selected into the spanning tree gets one slot in the global
//! edge-counter array, assigned in creation order across methods so the index
//! space is stable between the instrumented program and the edge file. Edge
//! cells always count executions rather than recording hit bits: the offline
//! reconstruction solves flow-conservation balances, which only close over
//! additive values. The probe for a slot is placed according to the edge's
//! kind:
//!
//! - ENTRY/EXIT-involving edges at the sentinel's logical position (top of the
//!   method, or before the return-like statement),
//! - fall-through edges directly after the source statement,
//! - jump edges on a pad of their own, with the jump redirected onto it. Two
//!   jumps sharing a landing node keep separate pads, so traversing one never
//!   touches the other's counter.
//!
//! Edges with an endpoint inside an exception handler are weight-biased into
//! the tree by the selector; a fall-through edge whose source cannot host a
//! probe moves onto a pad as well.

use std::io::Write;

use tracing::debug;

use crate::{
    cfg::{BranchTable, Edge, EdgeKind, MethodCfg},
    instrument::{
        probes::{ProbeOp, ProbePosition, ProbeRegistry},
        spanning::{SpanningTree, SpanningWeights},
    },
    Result,
};

/// Per-method result of edge instrumentation.
#[derive(Debug)]
pub struct MethodEdgePlan {
    tree: SpanningTree,
    /// Global counter slot per edge id; `None` for tree edges.
    slots: Vec<Option<u32>>,
}

impl MethodEdgePlan {
    /// Returns the tree/instrumented partition.
    #[must_use]
    pub const fn tree(&self) -> &SpanningTree {
        &self.tree
    }

    /// Returns the global counter slot of an edge, `None` for tree edges.
    #[must_use]
    pub fn slot(&self, edge: &Edge) -> Option<u32> {
        self.slots.get(edge.id().index()).copied().flatten()
    }

    /// Returns the number of instrumented edges in this method.
    #[must_use]
    pub fn instrumented_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// Assigns counter slots and places edge probes, one method at a time.
///
/// One instrumentor instance must be reused across all methods of a program
/// so the global slot space stays contiguous and creation-ordered.
#[derive(Debug)]
pub struct EdgeInstrumenter {
    weights: SpanningWeights,
    next_slot: u32,
}

impl EdgeInstrumenter {
    /// Creates an instrumentor with the given weight policy.
    #[must_use]
    pub fn new(weights: SpanningWeights) -> Self {
        Self {
            weights,
            next_slot: 0,
        }
    }

    /// Returns the total number of counter slots assigned so far.
    #[must_use]
    pub const fn slot_count(&self) -> u32 {
        self.next_slot
    }

    /// Instruments one method: selects the spanning tree, assigns a counter
    /// slot to every non-tree edge, and registers the probes.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error::Disconnected`] from tree selection.
    pub fn instrument(
        &mut self,
        cfg: &MethodCfg,
        registry: &mut ProbeRegistry,
    ) -> Result<MethodEdgePlan> {
        let tree = SpanningTree::select(cfg, &self.weights)?;
        let mut slots = vec![None; cfg.edge_count()];

        for edge in cfg.edges() {
            if tree.contains(edge) {
                continue;
            }
            let slot = self.next_slot;
            self.next_slot += 1;
            slots[edge.id().index()] = Some(slot);

            registry.register(placement(cfg, edge), ProbeOp::EdgeCount { slot });
        }

        let plan = MethodEdgePlan { tree, slots };
        debug!(
            method = %cfg.method(),
            edges = cfg.edge_count(),
            instrumented = plan.instrumented_count(),
            "edge instrumentation complete"
        );
        Ok(plan)
    }
}

/// Chooses the physical probe position for an edge.
///
/// Must not be called for the EXIT→ENTRY loop-back edge, which is always a
/// tree edge.
pub(crate) fn placement(cfg: &MethodCfg, edge: &Edge) -> ProbePosition {
    match edge.kind() {
        EdgeKind::Entry => ProbePosition::MethodEntry,
        EdgeKind::Exit => ProbePosition::BeforeReturn(edge.source()),
        EdgeKind::FallThrough if cfg.can_host_probe(edge.source()) => {
            ProbePosition::AfterNode(edge.source())
        }
        // Jumps always get their own pad: a shared landing node must not
        // merge two edges' probes. The pad lives outside either node, which
        // also covers handler-source fall-throughs.
        EdgeKind::FallThrough | EdgeKind::Jump | EdgeKind::ExitLoop => ProbePosition::OnEdge {
            source: edge.source(),
            target: edge.target(),
        },
    }
}

/// Writes one method's section of the edge file.
///
/// Format: a `method <id>` line, then one line per edge in creation order:
/// an optional `B <branchId>` tag, `I` or `N` for instrumented vs. tree
/// edges, and the edge description.
///
/// # Errors
///
/// Returns any I/O error from the writer.
pub fn write_edge_section<W: Write>(
    w: &mut W,
    cfg: &MethodCfg,
    plan: &MethodEdgePlan,
    branches: &BranchTable,
) -> Result<()> {
    writeln!(w, "method {}", cfg.method())?;
    for edge in cfg.edges() {
        if let Some(branch) = branches.index_of(cfg.method(), edge.id()) {
            write!(w, "B {branch} ")?;
        }
        let mark = if plan.slot(edge).is_some() { 'I' } else { 'N' };
        writeln!(w, "{mark} {}", edge.describe())?;
    }
    Ok(())
}
