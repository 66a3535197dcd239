//! Flow-conservation reconstruction of tree-edge counts.
//!
//! Only non-tree edges carried counters at runtime, and their cells are
//! execution counts: conservation balances only close over additive values.
//! For every node, flow is conserved: the incoming counts sum to the
//! outgoing counts (the synthetic EXIT→ENTRY edge closes the balance at the
//! sentinels, carrying the invocation count). The tree is connected and acyclic, so a depth-first
//! traversal from EXIT that recurses into each node's tree-edge subtrees
//! first always returns to a node with exactly one unknown incident edge
//! left, which conservation solves directly.
//!
//! Any deviation — a node with several unresolved tree edges, a negative
//! solved count, a nonzero balance back at the root — means the edge file
//! and the recorded counters do not describe the same program, and
//! reconstruction fails rather than report wrong coverage.

use std::collections::HashMap;

use super::edgefile::{MethodEdges, NodeRef};
use crate::Result;

struct EdgeGraph {
    node_count: usize,
    exit: usize,
    /// Per record: (source index, target index).
    endpoints: Vec<(usize, usize)>,
    /// Per node: (record index, outgoing from this node).
    adjacency: Vec<Vec<(usize, bool)>>,
}

impl EdgeGraph {
    fn build(method: &MethodEdges) -> Result<Self> {
        let mut indices: HashMap<NodeRef, usize> = HashMap::new();
        let mut endpoints = Vec::with_capacity(method.edges.len());
        for record in &method.edges {
            let pair = [record.source, record.target].map(|node| {
                let next = indices.len();
                *indices.entry(node).or_insert(next)
            });
            endpoints.push((pair[0], pair[1]));
        }
        let exit = *indices.get(&NodeRef::Exit).ok_or_else(|| {
            inconsistent_error!("method {}: no EXIT node in edge file", method.method)
        })?;

        let mut adjacency = vec![Vec::new(); indices.len()];
        for (record, &(src, tgt)) in endpoints.iter().enumerate() {
            adjacency[src].push((record, true));
            adjacency[tgt].push((record, false));
        }
        Ok(Self {
            node_count: indices.len(),
            exit,
            endpoints,
            adjacency,
        })
    }
}

/// Reconstructs the full edge-count vector of one method.
///
/// `counters` yields the recorded values of instrumented edges, in edge-file
/// order; the caller keeps one cursor across methods since counter slots are
/// global.
///
/// # Errors
///
/// Returns [`crate::Error::Inconsistent`] if the counter stream runs dry, the
/// tree does not span the nodes, a node has more than one unresolved tree
/// edge, a solved count is negative, or the root balance is nonzero.
pub fn reconstruct(
    method: &MethodEdges,
    counters: &mut impl Iterator<Item = u32>,
) -> Result<Vec<u64>> {
    let graph = EdgeGraph::build(method)?;

    let mut counts: Vec<Option<i64>> = Vec::with_capacity(method.edges.len());
    for record in &method.edges {
        if record.instrumented {
            let value = counters.next().ok_or_else(|| {
                inconsistent_error!("counter stream exhausted in method {}", method.method)
            })?;
            counts.push(Some(i64::from(value)));
        } else {
            counts.push(None);
        }
    }

    // DFS over tree edges, children before the parent edge. Each frame is
    // (node, edge used to reach it, adjacency cursor).
    let mut visited = vec![false; graph.node_count];
    let mut stack: Vec<(usize, Option<usize>, usize)> = vec![(graph.exit, None, 0)];
    visited[graph.exit] = true;

    while let Some(&mut (node, parent_edge, ref mut cursor)) = stack.last_mut() {
        let adj = &graph.adjacency[node];
        if *cursor < adj.len() {
            let (record, _) = adj[*cursor];
            *cursor += 1;
            if counts[record].is_some() || Some(record) == parent_edge {
                continue;
            }
            let (src, tgt) = graph.endpoints[record];
            let other = if src == node { tgt } else { src };
            if !visited[other] {
                visited[other] = true;
                stack.push((other, Some(record), 0));
            }
            continue;
        }
        stack.pop();

        // All subtrees below this node are solved; conservation gives the
        // one remaining unknown, the edge back toward the root.
        let mut balance: i64 = 0;
        let mut parent_outgoing = false;
        for &(record, outgoing) in adj {
            if Some(record) == parent_edge {
                parent_outgoing = outgoing;
                continue;
            }
            let Some(count) = counts[record] else {
                return Err(inconsistent_error!(
                    "method {}: node with multiple unresolved tree edges",
                    method.method
                ));
            };
            balance += if outgoing { -count } else { count };
        }

        match parent_edge {
            Some(record) => {
                // An incoming surplus flows out through the parent edge.
                let solved = if parent_outgoing { balance } else { -balance };
                if solved < 0 {
                    return Err(inconsistent_error!(
                        "method {}: negative reconstructed count {solved}",
                        method.method
                    ));
                }
                counts[record] = Some(solved);
            }
            None => {
                if balance != 0 {
                    return Err(inconsistent_error!(
                        "method {}: nonzero flow balance {balance} at root",
                        method.method
                    ));
                }
            }
        }
    }

    if visited.iter().any(|v| !v) {
        return Err(inconsistent_error!(
            "method {}: spanning tree does not reach every node",
            method.method
        ));
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            c.map(i64::unsigned_abs).ok_or_else(|| {
                inconsistent_error!("method {}: edge {i} left unresolved", method.method)
            })
        })
        .collect()
}
