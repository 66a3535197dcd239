//! Probe planning through an insertion-point registry.
//!
//! Several instrumentation passes (edge counters, path accumulators, DUA
//! tracking) want probes at the same physical locations. Rather than patching
//! jumps ad hoc, every pass registers probe fragments against an insertion
//! point keyed by the position (a node-relative location, or a per-edge pad
//! for redirected jumps); the registry keeps one ordered
//! fragment list per point, so concurrent registrations compose instead of
//! overwriting each other. The code rewriter (external to this crate) flushes
//! each point exactly once.
//!
//! Registration is idempotent with respect to the *point*: registering twice
//! at the same logical position yields one queryable insertion point whose
//! fragment list subsequent registrations extend.

use std::collections::HashMap;

use crate::cfg::NodeId;

/// Where, relative to a node or edge, a probe fragment executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbePosition {
    /// Top of the method, before the first real statement.
    MethodEntry,
    /// Directly after the node's statement (fall-through placement).
    AfterNode(NodeId),
    /// Before the node's statement, on every inbound path.
    BeforeNode(NodeId),
    /// Before the return-like statement at this node.
    BeforeReturn(NodeId),
    /// On a pad spliced into the transfer from `source` to `target`: the
    /// jump is redirected onto the probe, which then falls through into the
    /// target. Every edge keeps its own pad, so fragments here fire only
    /// when that edge is traversed.
    OnEdge {
        /// The node the transfer leaves.
        source: NodeId,
        /// The node the transfer lands on.
        target: NodeId,
    },
}

/// One probe fragment.
///
/// Fragments are the minimal runtime operations the rewriter splices in; the
/// runtime module implements their semantics over the coverage arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOp {
    /// Increment the edge-coverage cell for `slot`. Edge cells always count
    /// executions: the offline reconstruction solves additive balances.
    EdgeCount {
        /// Global edge-counter slot.
        slot: u32,
    },
    /// Initialize the path accumulator for `depth` to `value`.
    PathInit {
        /// Interprocedural depth level.
        depth: u8,
        /// Initial accumulator value (the ENTRY edge value, usually 0).
        value: u32,
    },
    /// Add `value` to every live path accumulator.
    PathAdd {
        /// Ball-Larus increment of the traversed edge.
        value: u32,
    },
    /// Mark the path array cell indexed by each live accumulator.
    PathCommit,
    /// Commit, then reset each accumulator for a new loop iteration.
    PathBackEdge {
        /// Value of the source→EXIT pseudo-edge, added before the commit.
        exit_value: u32,
        /// Value of the ENTRY→loop-head pseudo-edge, the reset value.
        reset_value: u32,
    },
    /// Record that definition `def` of a register-tracked variable executed.
    DefRecord {
        /// Last-definition register slot of the variable.
        var: u32,
        /// Program-wide ID of the definition site.
        def: u32,
    },
    /// Record a definition of aliased storage in the side table.
    AliasedDefRecord {
        /// Program-wide ID of the definition site.
        def: u32,
    },
    /// At a use of a register-tracked variable, map the last recorded
    /// definition ID onto the use's slot block and mark that cell. An ID not
    /// in `defs` (no definition ran yet, or one that does not reach this use)
    /// records nothing.
    UseCheck {
        /// Last-definition register slot of the variable.
        var: u32,
        /// Base slot of the use in the DUA coverage array.
        use_base: u32,
        /// Definition IDs of the use's reaching definitions, in slot order.
        defs: Vec<u32>,
    },
    /// At a use of aliased storage, map the side-table entry of the accessed
    /// container slot onto the use's slot block, as [`ProbeOp::UseCheck`] does
    /// for registers.
    AliasedUseCheck {
        /// Base slot of the use in the DUA coverage array.
        use_base: u32,
        /// Definition IDs of the use's reaching definitions, in slot order.
        defs: Vec<u32>,
    },
}

/// An insertion point with its ordered, composed probe fragments.
#[derive(Debug, Clone)]
pub struct InsertionPoint {
    position: ProbePosition,
    ops: Vec<ProbeOp>,
}

impl InsertionPoint {
    /// Returns where this point's fragments execute.
    #[must_use]
    pub const fn position(&self) -> ProbePosition {
        self.position
    }

    /// Returns the fragments in registration order.
    #[must_use]
    pub fn ops(&self) -> &[ProbeOp] {
        &self.ops
    }
}

/// The insertion-point registry shared by all instrumentation passes of one
/// method.
#[derive(Debug, Default)]
pub struct ProbeRegistry {
    /// Position to index into `points`.
    by_position: HashMap<ProbePosition, usize>,
    /// Points in first-registration order.
    points: Vec<InsertionPoint>,
}

impl ProbeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a probe fragment at the given position.
    ///
    /// If the position already has an insertion point, the fragment is
    /// appended to it; otherwise a new point is created.
    pub fn register(&mut self, position: ProbePosition, op: ProbeOp) {
        let idx = *self.by_position.entry(position).or_insert_with(|| {
            self.points.push(InsertionPoint {
                position,
                ops: Vec::new(),
            });
            self.points.len() - 1
        });
        self.points[idx].ops.push(op);
    }

    /// Returns the fragments registered at a position, if any.
    #[must_use]
    pub fn ops_at(&self, position: ProbePosition) -> Option<&[ProbeOp]> {
        self.by_position
            .get(&position)
            .map(|&idx| self.points[idx].ops())
    }

    /// Returns all insertion points in first-registration order.
    ///
    /// This is the flush order handed to the code rewriter: each point is
    /// spliced exactly once, after every pass has registered its fragments.
    #[must_use]
    pub fn points(&self) -> &[InsertionPoint] {
        &self.points
    }

    /// Returns the number of distinct insertion points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if no probe has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
