//! Acyclic path numbering and path-probe planning.
//!
//! Implements the Ball-Larus numbering: over the acyclic subgraph obtained by
//! cutting loop back-edges, every node gets a path count (`NumPaths(EXIT)=1`,
//! `NumPaths(n) = Σ NumPaths(succ)`) and every edge an integer increment such
//! that summing increments along any ENTRY→EXIT walk is a bijection onto
//! `[0, NumPaths(ENTRY))`. A single accumulator register then identifies the
//! executed path, and one array slot per path records coverage.
//!
//! Each back-edge `u→v` is replaced, for numbering purposes, by two
//! pseudo-edges `u→EXIT` and `ENTRY→v`. At runtime the back-edge commits the
//! accumulator (plus the `u→EXIT` pseudo-value) and resets it to the
//! `ENTRY→v` pseudo-value, confining path enumeration to one loop iteration's
//! span.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    cfg::{EdgeId, EdgeKind, MethodCfg, NodeId},
    instrument::{
        edges::placement,
        probes::{ProbeOp, ProbePosition, ProbeRegistry},
    },
    utils::BitSet,
    Result,
};

/// The Ball-Larus numbering of one method.
#[derive(Debug, Clone)]
pub struct PathNumbering {
    /// Path count per node index, over the transformed acyclic graph.
    num_paths: Vec<u64>,
    /// Increment per real edge id; 0 for tree-irrelevant edges (back-edges
    /// and the loop-back edge carry their values in `back_values`).
    edge_values: Vec<u32>,
    /// Per back-edge: (source→EXIT pseudo-value, ENTRY→loop-head pseudo-value).
    back_values: HashMap<EdgeId, (u32, u32)>,
    /// Loop back-edges of the method.
    back_edges: BitSet,
    /// `NumPaths(ENTRY)`, the path array length.
    total: u64,
}

impl PathNumbering {
    /// Computes the numbering for a method.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::PathsExceeded`] if `NumPaths(ENTRY)` exceeds
    /// `max_paths`; callers normally skip path instrumentation for the method
    /// in that case.
    pub fn compute(cfg: &MethodCfg, max_paths: u64) -> Result<Self> {
        let back_edges = cfg.back_edges();
        let postorder = acyclic_postorder(cfg, &back_edges);

        // NumPaths bottom-up: a node's successors always precede it in the
        // postorder of the acyclic view. Pseudo-edges contribute NumPaths(EXIT)
        // per outgoing back-edge, and NumPaths(loop-head) per back-edge at ENTRY.
        let mut num_paths = vec![0u64; cfg.node_count()];
        for &node in &postorder {
            let mut sum: u64 = 0;
            for &eid in cfg.outgoing(node) {
                let edge = &cfg.edges()[eid.index()];
                if edge.is_exit_loop() {
                    continue;
                }
                if back_edges.contains(eid.index()) {
                    // Pseudo source->EXIT edge.
                    sum += 1;
                } else {
                    sum += num_paths[edge.target().index()];
                }
            }
            if node == NodeId::EXIT {
                sum = 1;
            } else if sum == 0 {
                // A node without acyclic successors terminates a path.
                sum = 1;
            }
            num_paths[node.index()] = sum;
        }

        // Pseudo ENTRY->loop-head edges extend ENTRY's own count.
        let mut entry_total = num_paths[NodeId::ENTRY.index()];
        for eid in back_edges.iter() {
            let head = cfg.edges()[eid].target();
            entry_total += num_paths[head.index()];
        }

        if entry_total > max_paths {
            return Err(crate::Error::PathsExceeded {
                method: cfg.method(),
                paths: entry_total,
                cap: max_paths,
            });
        }

        // Edge increments: val(e_i) = sum of NumPaths over earlier successors.
        // Real acyclic out-edges first (successor order), then the pseudo
        // source->EXIT edges of outgoing back-edges.
        let mut edge_values = vec![0u32; cfg.edge_count()];
        let mut back_values = HashMap::new();
        for node in cfg.nodes() {
            let mut running: u64 = 0;
            for &eid in cfg.outgoing(node.id()) {
                let edge = &cfg.edges()[eid.index()];
                if edge.is_exit_loop() || back_edges.contains(eid.index()) {
                    continue;
                }
                edge_values[eid.index()] = u64_to_value(running);
                running += num_paths[edge.target().index()];
            }
            for &eid in cfg.outgoing(node.id()) {
                if back_edges.contains(eid.index()) {
                    back_values.insert(eid, (u64_to_value(running), 0));
                    running += 1;
                }
            }
        }

        // Pseudo ENTRY->loop-head values, appended after ENTRY's real edges
        // in back-edge creation order.
        let mut running = num_paths[NodeId::ENTRY.index()];
        for eid in back_edges.iter() {
            let head = cfg.edges()[eid].target();
            if let Some(vals) = back_values.get_mut(&EdgeId::new(eid)) {
                vals.1 = u64_to_value(running);
            }
            running += num_paths[head.index()];
        }

        debug!(method = %cfg.method(), paths = entry_total, "path numbering complete");

        Ok(Self {
            num_paths,
            edge_values,
            back_values,
            back_edges,
            total: entry_total,
        })
    }

    /// Returns `NumPaths` of a node over the transformed acyclic graph.
    #[must_use]
    pub fn num_paths(&self, node: NodeId) -> u64 {
        self.num_paths.get(node.index()).copied().unwrap_or(0)
    }

    /// Returns the increment assigned to a real acyclic edge.
    #[must_use]
    pub fn edge_value(&self, edge: EdgeId) -> u32 {
        self.edge_values.get(edge.index()).copied().unwrap_or(0)
    }

    /// Returns the (source→EXIT, ENTRY→loop-head) pseudo-values of a back-edge.
    #[must_use]
    pub fn back_edge_values(&self, edge: EdgeId) -> Option<(u32, u32)> {
        self.back_values.get(&edge).copied()
    }

    /// Returns `NumPaths(ENTRY)`: the required path array length.
    #[must_use]
    pub const fn array_len(&self) -> u64 {
        self.total
    }

    /// Registers the path probes for this method.
    ///
    /// - method entry initializes the depth-0 accumulator to the first entry
    ///   edge's value (deeper registers arrive as call parameters),
    /// - every acyclic edge with a non-zero increment adds it to all live
    ///   accumulators,
    /// - every return-like edge commits,
    /// - every back-edge commits and resets for the next iteration.
    pub fn plan_probes(&self, cfg: &MethodCfg, registry: &mut ProbeRegistry) {
        let mut entry_seen = false;

        registry.register(
            ProbePosition::MethodEntry,
            ProbeOp::PathInit {
                depth: 0,
                value: self.first_entry_value(cfg),
            },
        );

        for edge in cfg.edges() {
            if edge.is_exit_loop() {
                continue;
            }
            if let Some((exit_value, reset_value)) = self.back_edge_values(edge.id()) {
                registry.register(
                    placement(cfg, edge),
                    ProbeOp::PathBackEdge {
                        exit_value,
                        reset_value,
                    },
                );
                continue;
            }

            let value = self.edge_value(edge.id());
            match edge.kind() {
                EdgeKind::Entry => {
                    // The first entry edge is folded into the accumulator
                    // initialization; further ones add at their target.
                    if entry_seen && value > 0 {
                        registry.register(
                            ProbePosition::BeforeNode(edge.target()),
                            ProbeOp::PathAdd { value },
                        );
                    }
                    entry_seen = true;
                }
                EdgeKind::Exit => {
                    let pos = ProbePosition::BeforeReturn(edge.source());
                    if value > 0 {
                        registry.register(pos, ProbeOp::PathAdd { value });
                    }
                    registry.register(pos, ProbeOp::PathCommit);
                }
                _ => {
                    if value > 0 {
                        registry.register(placement(cfg, edge), ProbeOp::PathAdd { value });
                    }
                }
            }
        }
    }

    fn first_entry_value(&self, cfg: &MethodCfg) -> u32 {
        cfg.outgoing(NodeId::ENTRY)
            .first()
            .map_or(0, |&eid| self.edge_value(eid))
    }

    /// Returns the method's loop back-edges.
    #[must_use]
    pub const fn back_edges(&self) -> &BitSet {
        &self.back_edges
    }
}

/// Casts a path value to the accumulator width; safe after the cap check.
fn u64_to_value(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

/// Postorder over the acyclic view (back-edges and the loop-back cut).
///
/// In a DFS of a DAG from a single root, every successor of a node finishes
/// before the node itself, so iterating the postorder front-to-back visits
/// successors first.
fn acyclic_postorder(cfg: &MethodCfg, back_edges: &BitSet) -> Vec<NodeId> {
    let mut postorder = Vec::with_capacity(cfg.node_count());
    let mut visited = vec![false; cfg.node_count()];
    let mut stack: Vec<(NodeId, usize)> = vec![(NodeId::ENTRY, 0)];
    visited[NodeId::ENTRY.index()] = true;

    while let Some((node, edge_idx)) = stack.last_mut() {
        let out = cfg.outgoing(*node);
        if *edge_idx >= out.len() {
            postorder.push(*node);
            stack.pop();
            continue;
        }
        let eid = out[*edge_idx];
        *edge_idx += 1;

        let edge = &cfg.edges()[eid.index()];
        if edge.is_exit_loop() || back_edges.contains(eid.index()) {
            continue;
        }
        let target = edge.target();
        if !visited[target.index()] {
            visited[target.index()] = true;
            stack.push((target, 0));
        }
    }

    postorder
}
