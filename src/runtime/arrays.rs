//! Coverage arrays and the coverage-array handle registry.
//!
//! Arrays are fixed-size, zero-initialized, and allocated once before any
//! instrumented code runs. Probes write with relaxed atomics: coverage
//! writes are monotonic (set-to-1 or increment on word-sized cells), so a
//! racing lost update can only undercount, never corrupt. The reporter reads
//! the arrays once after the program quiesces.
//!
//! Instead of introspecting the instrumented program for its counter fields,
//! the runtime hands out a [`CoverageRegistry`] of array handles at setup
//! time; the reporter works from those handles alone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use strum::{Display, EnumIter};

use crate::{cfg::MethodId, instrument::ProgramPlan};

/// The coverage kinds the reporter can emit, one matrix file each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum CoverageKind {
    /// Branch-edge hit bits.
    Branch,
    /// Statement coverage, projected from edge counts.
    Stmt,
    /// Statement-pair (edge) coverage.
    StmtPair,
    /// Acyclic path coverage.
    Path,
    /// Definition-use associations.
    Dua,
    /// Definition coverage, projected from DUA results.
    Def,
    /// DUAs deduplicated by (definition, use) statement pair.
    DuBlock,
}

impl CoverageKind {
    /// Returns the matrix file name for this kind; `inferred` selects the
    /// branch-inferred-only variant.
    #[must_use]
    pub fn file_name(self, inferred: bool) -> String {
        if inferred {
            format!("{self}inf.cvg")
        } else {
            format!("{self}.cvg")
        }
    }
}

/// A fixed-size vector of monotonic coverage cells.
#[derive(Debug)]
pub struct CoverageArray {
    cells: Vec<AtomicU32>,
}

impl CoverageArray {
    /// Allocates a zero-initialized array.
    #[must_use]
    pub fn new(len: usize) -> Self {
        let mut cells = Vec::with_capacity(len);
        cells.resize_with(len, || AtomicU32::new(0));
        Self { cells }
    }

    /// Sets the cell to 1. Out-of-range indices indicate an encoding bug;
    /// they trap in debug builds and are ignored in release builds.
    pub fn hit(&self, index: usize) {
        debug_assert!(index < self.cells.len(), "coverage index {index} out of range");
        if let Some(cell) = self.cells.get(index) {
            cell.store(1, Ordering::Relaxed);
        }
    }

    /// Increments the cell (frequency mode). Same bounds policy as [`hit`].
    ///
    /// [`hit`]: Self::hit
    pub fn add(&self, index: usize) {
        debug_assert!(index < self.cells.len(), "coverage index {index} out of range");
        if let Some(cell) = self.cells.get(index) {
            cell.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Reads one cell; 0 for out-of-range indices.
    #[must_use]
    pub fn get(&self, index: usize) -> u32 {
        self.cells.get(index).map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Returns the array length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if the array has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Copies the current cell values out for reporting.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u32> {
        self.cells.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }
}

/// The coverage-array handles of one instrumented program.
#[derive(Debug)]
pub struct CoverageRegistry {
    edges: Arc<CoverageArray>,
    /// One path array per (method, depth level).
    paths: HashMap<(MethodId, u8), Arc<CoverageArray>>,
    dua: Arc<CoverageArray>,
    /// Shared sink for unattributable interprocedural path state.
    dummy: Arc<CoverageArray>,
}

impl CoverageRegistry {
    /// Allocates every array the plan needs. Must run before any probe.
    #[must_use]
    pub fn allocate(plan: &ProgramPlan) -> Self {
        let mut paths = HashMap::new();
        for method_plan in plan.methods() {
            let Some(numbering) = method_plan.paths() else {
                continue;
            };
            let method = method_plan.cfg().method();
            let len = usize::try_from(numbering.array_len()).unwrap_or(usize::MAX);
            paths.insert((method, 0), Arc::new(CoverageArray::new(len)));
            for &depth in plan.interproc().depths_of(method) {
                paths.insert((method, depth), Arc::new(CoverageArray::new(len)));
            }
        }

        Self {
            edges: Arc::new(CoverageArray::new(plan.edge_slot_count() as usize)),
            paths,
            dua: Arc::new(CoverageArray::new(plan.duas().array_len() as usize)),
            dummy: Arc::new(CoverageArray::new(plan.interproc().dummy_len() as usize)),
        }
    }

    /// Returns the global edge-counter array.
    #[must_use]
    pub fn edges(&self) -> &Arc<CoverageArray> {
        &self.edges
    }

    /// Returns a method's path array at the given depth level.
    #[must_use]
    pub fn path_array(&self, method: MethodId, depth: u8) -> Option<&Arc<CoverageArray>> {
        self.paths.get(&(method, depth))
    }

    /// Returns every path array with its (method, depth) key, sorted, so the
    /// reporter emits path columns in one stable order.
    #[must_use]
    pub fn path_arrays(&self) -> Vec<((MethodId, u8), &Arc<CoverageArray>)> {
        let mut entries: Vec<_> = self.paths.iter().map(|(&k, v)| (k, v)).collect();
        entries.sort_by_key(|&(k, _)| k);
        entries
    }

    /// Returns the DUA coverage array.
    #[must_use]
    pub fn dua(&self) -> &Arc<CoverageArray> {
        &self.dua
    }

    /// Returns the shared dummy path array.
    #[must_use]
    pub fn dummy(&self) -> &Arc<CoverageArray> {
        &self.dummy
    }
}
