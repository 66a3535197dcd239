//! The reporting entry point.
//!
//! [`Reporter::report`] runs once at the instrumented program's natural exit:
//! it reads the side files written at build time, reconstructs full edge
//! counts from the recorded counters, classifies DUAs, and appends one line
//! per coverage kind to the matrix files. Every kind is produced in
//! isolation: a missing or malformed side file skips the kinds depending on
//! it with a warning while the rest proceed, and nothing here ever
//! propagates an error into the host program.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{info, warn};

use super::{
    dua::{classify_all, DuaCoverage},
    duafile::{parse_dua_file, parse_index_file, DuaRecord},
    edgefile::{parse_edge_file, MethodEdges, NodeRef},
    flow::reconstruct,
    matrix::MatrixWriter,
};
use crate::{
    runtime::{CoverageKind, CoverageRegistry},
    utils::BitSet,
    Result,
};

/// Side-file name for the edge descriptions.
pub const EDGE_FILE: &str = "edges.lst";
/// Side-file name for the DUA descriptions.
pub const DUA_FILE: &str = "duas.lst";
/// Side-file name for the DUA array index.
pub const DUA_INDEX_FILE: &str = "duas.idx";

/// What the reporter managed to produce.
#[derive(Debug, Default)]
pub struct ReportSummary {
    written: Vec<(CoverageKind, bool)>,
    skipped: Vec<(CoverageKind, bool)>,
}

impl ReportSummary {
    /// Returns the (kind, inferred-variant) matrices that were appended.
    #[must_use]
    pub fn written(&self) -> &[(CoverageKind, bool)] {
        &self.written
    }

    /// Returns the matrices that were skipped.
    #[must_use]
    pub fn skipped(&self) -> &[(CoverageKind, bool)] {
        &self.skipped
    }
}

/// Reads side files and runtime arrays, writes coverage matrices.
#[derive(Debug)]
pub struct Reporter {
    side_dir: PathBuf,
    matrices: MatrixWriter,
}

/// Everything derived from edge reconstruction that later kinds reuse.
struct EdgeResults {
    branch_bits: Vec<u32>,
}

impl Reporter {
    /// Creates a reporter reading side files from `side_dir` and appending
    /// matrices under `out_dir`.
    #[must_use]
    pub fn new(side_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            side_dir: side_dir.into(),
            matrices: MatrixWriter::new(out_dir),
        }
    }

    /// Produces every coverage kind the recorded data supports.
    pub fn report(&self, registry: &CoverageRegistry) -> ReportSummary {
        let mut summary = ReportSummary::default();

        let edge_results = match self.edge_kinds(registry, &mut summary) {
            Ok(results) => Some(results),
            Err(e) => {
                warn!(error = %e, "edge reconstruction failed, skipping edge-derived kinds");
                for kind in [CoverageKind::Branch, CoverageKind::Stmt, CoverageKind::StmtPair] {
                    summary.skipped.push((kind, false));
                }
                None
            }
        };

        self.path_kind(registry, &mut summary);

        match edge_results {
            Some(results) => self.dua_kinds(registry, &results.branch_bits, &mut summary),
            None => {
                // DUA classification needs the branch bits.
                for kind in [CoverageKind::Dua, CoverageKind::Def, CoverageKind::DuBlock] {
                    summary.skipped.push((kind, false));
                    summary.skipped.push((kind, true));
                }
            }
        }

        info!(
            written = summary.written.len(),
            skipped = summary.skipped.len(),
            "coverage report complete"
        );
        summary
    }

    fn side_file(&self, name: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.side_dir.join(name))?)
    }

    fn emit(
        &self,
        kind: CoverageKind,
        inferred: bool,
        values: &[u32],
        summary: &mut ReportSummary,
    ) {
        match self.matrices.append(kind, inferred, values) {
            Ok(()) => summary.written.push((kind, inferred)),
            Err(e) => {
                warn!(%kind, inferred, error = %e, "matrix append failed");
                summary.skipped.push((kind, inferred));
            }
        }
    }

    /// Reconstructs edge counts and emits branch, stmt, and stmtpair.
    fn edge_kinds(
        &self,
        registry: &CoverageRegistry,
        summary: &mut ReportSummary,
    ) -> Result<EdgeResults> {
        let methods = parse_edge_file(&self.side_file(EDGE_FILE)?)?;
        let counters = registry.edges().snapshot();
        let mut cursor = counters.into_iter();

        let mut all_counts = Vec::with_capacity(methods.len());
        for method in &methods {
            all_counts.push(reconstruct(method, &mut cursor)?);
        }

        let mut branch_bits = Vec::new();
        let mut stmt_bits = Vec::new();
        let mut pair_counts = Vec::new();
        for (method, counts) in methods.iter().zip(&all_counts) {
            project_branches(method, counts, &mut branch_bits);
            project_statements(method, counts, &mut stmt_bits);
            project_pairs(method, counts, &mut pair_counts);
        }

        self.emit(CoverageKind::Branch, false, &branch_bits, summary);
        self.emit(CoverageKind::Stmt, false, &stmt_bits, summary);
        self.emit(CoverageKind::StmtPair, false, &pair_counts, summary);
        Ok(EdgeResults { branch_bits })
    }

    /// Emits the path matrix: every path array's cells, in (method, depth)
    /// order.
    fn path_kind(&self, registry: &CoverageRegistry, summary: &mut ReportSummary) {
        let mut values = Vec::new();
        for (_, array) in registry.path_arrays() {
            values.extend(array.snapshot());
        }
        self.emit(CoverageKind::Path, false, &values, summary);
    }

    /// Classifies DUAs and emits dua/def/dublock plus their inferred-only
    /// variants.
    fn dua_kinds(
        &self,
        registry: &CoverageRegistry,
        branch_bits: &[u32],
        summary: &mut ReportSummary,
    ) {
        let classified = self.classify(registry, branch_bits);
        let (file, direct, inferred) = match classified {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "DUA classification failed, skipping DUA-derived kinds");
                for kind in [CoverageKind::Dua, CoverageKind::Def, CoverageKind::DuBlock] {
                    summary.skipped.push((kind, false));
                    summary.skipped.push((kind, true));
                }
                return;
            }
        };

        for (results, inf) in [(&direct, false), (&inferred, true)] {
            let cells: Vec<u32> = results.iter().map(|c| c.cell()).collect();
            self.emit(CoverageKind::Dua, inf, &cells, summary);
            self.emit(
                CoverageKind::Def,
                inf,
                &project_grouped(&file, results, def_key),
                summary,
            );
            self.emit(
                CoverageKind::DuBlock,
                inf,
                &project_grouped(&file, results, dublock_key),
                summary,
            );
        }
    }

    #[allow(clippy::type_complexity)]
    fn classify(
        &self,
        registry: &CoverageRegistry,
        branch_bits: &[u32],
    ) -> Result<(super::duafile::DuaFile, Vec<DuaCoverage>, Vec<DuaCoverage>)> {
        let file = parse_dua_file(&self.side_file(DUA_FILE)?)?;
        let index = parse_index_file(&self.side_file(DUA_INDEX_FILE)?)?;

        let fired: BitSet = branch_bits
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b > 0)
            .map(|(i, _)| i)
            .collect();
        let cells = registry.dua().snapshot();

        let direct = classify_all(&file, &fired, Some((&cells, &index)))?;
        let inferred = classify_all(&file, &fired, None)?;
        Ok((file, direct, inferred))
    }
}

/// Extends the global branch bit vector with this method's branch tags.
fn project_branches(method: &MethodEdges, counts: &[u64], bits: &mut Vec<u32>) {
    for (record, edge) in method.edges.iter().enumerate() {
        let Some(branch) = edge.branch else {
            continue;
        };
        let branch = branch as usize;
        if bits.len() <= branch {
            bits.resize(branch + 1, 0);
        }
        if counts[record] > 0 {
            bits[branch] = 1;
        }
    }
}

/// A statement is covered iff any incident edge ran. Columns are the
/// method's real nodes in ascending order.
fn project_statements(method: &MethodEdges, counts: &[u64], bits: &mut Vec<u32>) {
    let mut by_node: HashMap<usize, u32> = HashMap::new();
    for (record, edge) in method.edges.iter().enumerate() {
        for node in [edge.source, edge.target] {
            if let NodeRef::Node(n) = node {
                let bit = by_node.entry(n).or_insert(0);
                if counts[record] > 0 {
                    *bit = 1;
                }
            }
        }
    }
    let mut nodes: Vec<usize> = by_node.keys().copied().collect();
    nodes.sort_unstable();
    bits.extend(nodes.into_iter().map(|n| by_node[&n]));
}

/// A statement pair is an edge between two real nodes; its column carries
/// the reconstructed count.
fn project_pairs(method: &MethodEdges, counts: &[u64], out: &mut Vec<u32>) {
    for (record, edge) in method.edges.iter().enumerate() {
        if matches!(edge.source, NodeRef::Node(_)) && matches!(edge.target, NodeRef::Node(_)) {
            out.push(u32::try_from(counts[record]).unwrap_or(u32::MAX));
        }
    }
}

fn def_key(record: &DuaRecord) -> String {
    record.parse_name().map_or_else(
        || record.name.clone(),
        |(var, def, _)| format!("{var}@{def}"),
    )
}

fn dublock_key(record: &DuaRecord) -> String {
    record.parse_name().map_or_else(
        || record.name.clone(),
        |(_, def, use_)| format!("{def}->{use_}"),
    )
}

/// Projects DUA results onto a coarser key: one column per distinct key in
/// first-appearance order, carrying the best grade of its DUAs.
fn project_grouped(
    file: &super::duafile::DuaFile,
    results: &[DuaCoverage],
    key: fn(&DuaRecord) -> String,
) -> Vec<u32> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, u32> = HashMap::new();
    for (record, coverage) in file.duas.iter().zip(results) {
        let k = key(record);
        let entry = best.entry(k.clone()).or_insert_with(|| {
            order.push(k);
            0
        });
        *entry = (*entry).max(coverage.cell());
    }
    order.into_iter().map(|k| best[&k]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::duafile::DuaFile;

    fn record(name: &str) -> DuaRecord {
        DuaRecord {
            inferable: true,
            name: name.into(),
            reach_def: Vec::new(),
            reach_use: Vec::new(),
            in_order_kill: Vec::new(),
            not_in_order_kill: Vec::new(),
        }
    }

    #[test]
    fn test_grouped_projection_takes_best_grade() {
        let file = DuaFile {
            hybrid: false,
            duas: vec![
                record("x@s0->s5"),
                record("x@s0->s7"),
                record("y@s1->s5"),
            ],
        };
        let results = vec![
            DuaCoverage::NotCovered,
            DuaCoverage::Covered,
            DuaCoverage::Possible,
        ];

        // Two defs: x@0 (best grade covered) and y@1 (possible).
        assert_eq!(project_grouped(&file, &results, def_key), vec![2, 1]);
        // Three distinct (def, use) blocks.
        assert_eq!(
            project_grouped(&file, &results, dublock_key),
            vec![0, 2, 1]
        );
    }

    #[test]
    fn test_branch_projection_sets_bits_by_tag() {
        let methods = parse_edge_file(
            "method 0\nN EXIT->ENTRY\nN ENTRY->2\nB 0 I 2->3\nB 1 I 2->4\nN 3->EXIT\nN 4->EXIT\n",
        )
        .unwrap();
        let counts = vec![3, 3, 3, 0, 3, 0];
        let mut bits = Vec::new();
        project_branches(&methods[0], &counts, &mut bits);
        assert_eq!(bits, vec![1, 0]);
    }

    #[test]
    fn test_statement_projection_orders_nodes() {
        let methods = parse_edge_file(
            "method 0\nN EXIT->ENTRY\nN ENTRY->2\nB 0 I 2->3\nB 1 I 2->4\nN 3->EXIT\nN 4->EXIT\n",
        )
        .unwrap();
        let counts = vec![3, 3, 3, 0, 3, 0];
        let mut bits = Vec::new();
        project_statements(&methods[0], &counts, &mut bits);
        // Nodes 2 and 3 ran; node 4's edges never did.
        assert_eq!(bits, vec![1, 1, 0]);
    }
}
