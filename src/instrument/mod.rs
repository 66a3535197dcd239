//! Build-time instrumentation planning.
//!
//! The submodules implement the individual passes; [`ProgramPlan`] runs them
//! in one fixed order over a whole program so every global index space
//! (branch indices, edge-counter slots, path IDs, DUA slots) is assigned in a
//! single deterministic pass:
//!
//! 1. global branch enumeration ([`crate::cfg::BranchTable`]),
//! 2. spanning-tree selection and edge-counter assignment per method,
//! 3. Ball-Larus path numbering and path probes per method,
//! 4. interprocedural propagation planning over the call sites,
//! 5. DUA slot layout and def/use probes.
//!
//! The output is a per-method [`ProbeRegistry`] (the fragments the external
//! code rewriter splices in), the side files for the reporter, and the array
//! sizes the runtime allocates before any instrumented code runs.

pub mod dua;
pub mod edges;
pub mod interproc;
pub mod paths;
pub mod probes;
pub mod spanning;

use std::collections::HashMap;
use std::io::Write;

use tracing::{info, warn};

use crate::{
    cfg::{BranchTable, MethodCfg, MethodId},
    Result,
};

pub use dua::{Dua, DuaPlan, PlannedDua, VarStorage};
pub use edges::{EdgeInstrumenter, MethodEdgePlan};
pub use interproc::{CallPropagation, CallSite, CallTargets, DepthPass, InterprocPlan, ShimPlan};
pub use paths::PathNumbering;
pub use probes::{InsertionPoint, ProbeOp, ProbePosition, ProbeRegistry};
pub use spanning::{SpanningTree, SpanningWeights};

/// Instrumentation policy knobs.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentOptions {
    /// Count path executions instead of recording hit bits. Edge counters
    /// always count; the flow-conservation reconstruction needs additive
    /// cells.
    pub frequency: bool,
    /// Maximum interprocedural path-propagation depth; 0 disables it.
    pub interproc_depth: u8,
    /// Instrument only non-inferable DUAs and infer the rest from branches.
    pub hybrid: bool,
    /// Methods whose acyclic path count exceeds this are skipped for path
    /// profiling (edge and DUA instrumentation still apply).
    pub max_paths: u64,
    /// Dummy-array size when no candidate callee's path count is known.
    pub dummy_paths: u32,
    /// Spanning-tree weight policy.
    pub weights: SpanningWeights,
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        Self {
            frequency: false,
            interproc_depth: 0,
            hybrid: true,
            max_paths: 65_536,
            dummy_paths: 256,
            weights: SpanningWeights::default(),
        }
    }
}

/// One method's complete instrumentation plan.
#[derive(Debug)]
pub struct MethodPlan {
    cfg: MethodCfg,
    edges: MethodEdgePlan,
    /// `None` if the method's path count exceeded the cap.
    paths: Option<PathNumbering>,
    registry: ProbeRegistry,
}

impl MethodPlan {
    /// Returns the method's control-flow graph.
    #[must_use]
    pub const fn cfg(&self) -> &MethodCfg {
        &self.cfg
    }

    /// Returns the edge-counter plan.
    #[must_use]
    pub const fn edges(&self) -> &MethodEdgePlan {
        &self.edges
    }

    /// Returns the path numbering, `None` if path profiling was skipped.
    #[must_use]
    pub const fn paths(&self) -> Option<&PathNumbering> {
        self.paths.as_ref()
    }

    /// Returns the composed insertion points for the code rewriter.
    #[must_use]
    pub const fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }
}

/// The program-wide instrumentation plan.
#[derive(Debug)]
pub struct ProgramPlan {
    methods: Vec<MethodPlan>,
    by_method: HashMap<MethodId, usize>,
    branches: BranchTable,
    interproc: InterprocPlan,
    duas: DuaPlan,
    edge_slots: u32,
    options: InstrumentOptions,
}

impl ProgramPlan {
    /// Plans instrumentation for a whole program.
    ///
    /// Methods are processed in the given order; that order fixes every
    /// global index space, so the same input must be replayed to the
    /// reporter through the side files.
    ///
    /// # Errors
    ///
    /// Fatal build-time errors (disconnected graph, requirement data that
    /// does not match the program) abort planning; an over-cap path count
    /// only disables path profiling for that method, with a warning.
    pub fn build(
        cfgs: Vec<MethodCfg>,
        duas: Vec<Dua>,
        calls: Vec<CallSite>,
        options: InstrumentOptions,
    ) -> Result<Self> {
        let mut branches = BranchTable::new();
        for cfg in &cfgs {
            branches.assign(cfg);
        }

        let mut instrumenter = EdgeInstrumenter::new(options.weights);
        let mut methods = Vec::with_capacity(cfgs.len());
        let mut by_method = HashMap::with_capacity(cfgs.len());
        let mut numberings = HashMap::new();

        for cfg in cfgs {
            let mut registry = ProbeRegistry::new();
            let edges = instrumenter.instrument(&cfg, &mut registry)?;

            let paths = match PathNumbering::compute(&cfg, options.max_paths) {
                Ok(numbering) => {
                    numbering.plan_probes(&cfg, &mut registry);
                    numberings.insert(cfg.method(), numbering.clone());
                    Some(numbering)
                }
                Err(crate::Error::PathsExceeded { method, paths, cap }) => {
                    warn!(%method, paths, cap, "path count over cap, skipping path profiling");
                    None
                }
                Err(e) => return Err(e),
            };

            by_method.insert(cfg.method(), methods.len());
            methods.push(MethodPlan {
                cfg,
                edges,
                paths,
                registry,
            });
        }

        let interproc = InterprocPlan::compute(
            &calls,
            &numberings,
            options.interproc_depth,
            options.dummy_paths,
        );

        let duas = DuaPlan::compute(duas, options.hybrid, branches.len())?;
        for plan in &mut methods {
            duas.plan_probes(&plan.cfg, &mut plan.registry);
        }

        info!(
            methods = methods.len(),
            branches = branches.len(),
            edge_slots = instrumenter.slot_count(),
            dua_slots = duas.array_len(),
            "instrumentation plan complete"
        );

        Ok(Self {
            methods,
            by_method,
            branches,
            interproc,
            duas,
            edge_slots: instrumenter.slot_count(),
            options,
        })
    }

    /// Returns the per-method plans in planning order.
    #[must_use]
    pub fn methods(&self) -> &[MethodPlan] {
        &self.methods
    }

    /// Returns the plan of one method.
    #[must_use]
    pub fn method(&self, method: MethodId) -> Option<&MethodPlan> {
        self.by_method.get(&method).map(|&i| &self.methods[i])
    }

    /// Returns the global branch table.
    #[must_use]
    pub const fn branches(&self) -> &BranchTable {
        &self.branches
    }

    /// Returns the interprocedural propagation plan.
    #[must_use]
    pub const fn interproc(&self) -> &InterprocPlan {
        &self.interproc
    }

    /// Returns the DUA plan.
    #[must_use]
    pub const fn duas(&self) -> &DuaPlan {
        &self.duas
    }

    /// Returns the length of the global edge-counter array.
    #[must_use]
    pub const fn edge_slot_count(&self) -> u32 {
        self.edge_slots
    }

    /// Returns the options the plan was built with.
    #[must_use]
    pub const fn options(&self) -> &InstrumentOptions {
        &self.options
    }

    /// Writes the complete edge file, one section per method in planning
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] on write failure.
    pub fn write_edge_file<W: Write>(&self, w: &mut W) -> Result<()> {
        for plan in &self.methods {
            edges::write_edge_section(w, &plan.cfg, &plan.edges, &self.branches)?;
        }
        Ok(())
    }

    /// Writes a deterministic textual dump of the plan for debugging.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] on write failure.
    pub fn dump<W: Write>(&self, w: &mut W) -> Result<()> {
        writeln!(
            w,
            "plan: {} methods, {} branches, {} edge slots, {} dua slots",
            self.methods.len(),
            self.branches.len(),
            self.edge_slots,
            self.duas.array_len()
        )?;
        for plan in &self.methods {
            let paths = plan
                .paths
                .as_ref()
                .map_or_else(|| "skipped".to_owned(), |n| n.array_len().to_string());
            writeln!(
                w,
                "method {}: {} edges, {} instrumented, paths {}, {} insertion points",
                plan.cfg.method(),
                plan.cfg.edge_count(),
                plan.edges.instrumented_count(),
                paths,
                plan.registry.len()
            )?;
            for point in plan.registry.points() {
                writeln!(w, "  {:?}: {} ops", point.position(), point.ops().len())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{NodeId, StmtId};

    fn branchy(method: u32, first_stmt: u32) -> MethodCfg {
        let mut cfg = MethodCfg::new(MethodId(method));
        let a = cfg.add_node(StmtId(first_stmt), false).unwrap();
        let b = cfg.add_node(StmtId(first_stmt + 1), false).unwrap();
        let c = cfg.add_node(StmtId(first_stmt + 2), false).unwrap();
        cfg.add_edge(NodeId::ENTRY, a, false).unwrap();
        cfg.add_edge(a, b, true).unwrap();
        cfg.add_edge(a, c, false).unwrap();
        cfg.add_edge(b, NodeId::EXIT, true).unwrap();
        cfg.add_edge(c, NodeId::EXIT, true).unwrap();
        cfg
    }

    #[test]
    fn test_program_plan_wires_all_passes() {
        let duas = vec![
            Dua {
                name: "x".into(),
                storage: VarStorage::Local(0),
                def_stmt: StmtId(0),
                use_stmt: StmtId(2),
                reach_def: vec![0],
                reach_use: vec![1],
                in_order_kill: Vec::new(),
                not_in_order_kill: Vec::new(),
            },
            Dua {
                name: "x".into(),
                storage: VarStorage::Local(0),
                def_stmt: StmtId(1),
                use_stmt: StmtId(2),
                reach_def: vec![0],
                reach_use: vec![1],
                in_order_kill: Vec::new(),
                not_in_order_kill: Vec::new(),
            },
        ];
        let calls = vec![CallSite {
            caller: MethodId(0),
            node: NodeId::new(2),
            targets: CallTargets::Static(MethodId(1)),
        }];
        let options = InstrumentOptions {
            interproc_depth: 1,
            ..InstrumentOptions::default()
        };

        let plan =
            ProgramPlan::build(vec![branchy(0, 0), branchy(1, 10)], duas, calls, options).unwrap();

        assert_eq!(plan.methods().len(), 2);
        // Each branchy method has 2 branches.
        assert_eq!(plan.branches().len(), 4);
        assert!(plan.method(MethodId(1)).is_some());
        assert!(plan.methods()[0].paths().is_some());
        assert_eq!(plan.interproc().depths_of(MethodId(1)), &[1]);
        assert_eq!(plan.duas().entries_per_use(), 2);
        assert!(plan.edge_slot_count() > 0);
    }

    #[test]
    fn test_over_cap_method_skips_paths_only() {
        let options = InstrumentOptions {
            max_paths: 1,
            ..InstrumentOptions::default()
        };
        let plan =
            ProgramPlan::build(vec![branchy(0, 0)], Vec::new(), Vec::new(), options).unwrap();

        let method = &plan.methods()[0];
        assert!(method.paths().is_none());
        // Edge counters are unaffected by the path cap.
        assert!(method.edges().instrumented_count() > 0);
    }

    #[test]
    fn test_edge_file_has_one_section_per_method() {
        let plan = ProgramPlan::build(
            vec![branchy(0, 0), branchy(1, 10)],
            Vec::new(),
            Vec::new(),
            InstrumentOptions::default(),
        )
        .unwrap();

        let mut out = Vec::new();
        plan.write_edge_file(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("method ")).count(), 2);
    }
}
