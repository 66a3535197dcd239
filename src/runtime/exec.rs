//! Probe-fragment interpreter.
//!
//! The code rewriter normally compiles [`ProbeOp`] fragments into the target
//! program; this interpreter executes them directly against the runtime
//! state instead. It exists for the harness side: replaying an execution
//! through the planned insertion points produces exactly the array contents
//! an instrumented run would, which is how the reconstruction pipeline is
//! exercised end to end.

use crate::{
    cfg::MethodId,
    instrument::ProbeOp,
    runtime::{
        arrays::CoverageRegistry,
        lastdef::{AliasedTable, LastDefRegisters, Liveness},
        paths::PathTracer,
    },
};

/// The storage slot touched by an aliased definition or use.
#[derive(Debug, Clone, Copy)]
pub struct AliasedAccess {
    /// Container object identity.
    pub container: u64,
    /// Element or field index within the container.
    pub index: u32,
}

/// Executes probe fragments for one method activation.
pub struct ProbeExecutor<'a, L: Liveness> {
    registry: &'a CoverageRegistry,
    regs: &'a LastDefRegisters,
    aliased: &'a AliasedTable<L>,
    method: MethodId,
    tracer: PathTracer,
    frequency: bool,
}

impl<'a, L: Liveness> ProbeExecutor<'a, L> {
    /// Creates an executor for one activation of `method`.
    #[must_use]
    pub fn new(
        registry: &'a CoverageRegistry,
        regs: &'a LastDefRegisters,
        aliased: &'a AliasedTable<L>,
        method: MethodId,
        frequency: bool,
    ) -> Self {
        Self {
            registry,
            regs,
            aliased,
            method,
            tracer: PathTracer::new(frequency),
            frequency,
        }
    }

    /// Receives a caller-propagated accumulator for a deeper depth level.
    /// Must run before the method-entry fragments.
    pub fn receive(&mut self, depth: u8, accumulator: u32) {
        if let Some(array) = self.registry.path_array(self.method, depth) {
            self.tracer.init(accumulator, std::sync::Arc::clone(array));
        }
    }

    /// Executes one insertion point's fragments in order.
    ///
    /// `access` carries the container slot for aliased definition/use
    /// fragments; points without aliased fragments ignore it.
    pub fn exec(&mut self, ops: &[ProbeOp], access: Option<AliasedAccess>) {
        for op in ops {
            self.exec_op(op, access);
        }
    }

    fn exec_op(&mut self, op: &ProbeOp, access: Option<AliasedAccess>) {
        match op {
            ProbeOp::EdgeCount { slot } => self.registry.edges().add(*slot as usize),
            ProbeOp::PathInit { depth, value } => {
                if let Some(array) = self.registry.path_array(self.method, *depth) {
                    self.tracer.init(*value, std::sync::Arc::clone(array));
                }
            }
            ProbeOp::PathAdd { value } => self.tracer.add(*value),
            ProbeOp::PathCommit => self.tracer.commit(),
            ProbeOp::PathBackEdge {
                exit_value,
                reset_value,
            } => self.tracer.back_edge(*exit_value, *reset_value),
            ProbeOp::DefRecord { var, def } => self.regs.record(*var, *def),
            ProbeOp::AliasedDefRecord { def } => {
                if let Some(access) = access {
                    self.aliased.record(access.container, access.index, *def);
                }
            }
            ProbeOp::UseCheck {
                var,
                use_base,
                defs,
            } => {
                if let Some(def) = self.regs.last_def(*var) {
                    self.mark_use(*use_base, defs, def);
                }
            }
            ProbeOp::AliasedUseCheck { use_base, defs } => {
                if let Some(access) = access {
                    if let Some(def) = self.aliased.last_def(access.container, access.index) {
                        self.mark_use(*use_base, defs, def);
                    }
                }
            }
        }
    }

    /// Maps a recorded definition ID onto the use's slot block. An ID not in
    /// `defs` does not reach this use and records nothing.
    fn mark_use(&self, use_base: u32, defs: &[u32], def: u32) {
        if let Some(ordinal) = defs.iter().position(|&d| d == def) {
            let slot = use_base + u32::try_from(ordinal).unwrap_or(u32::MAX);
            self.registry.dua().hit(slot as usize);
        }
    }

    /// Returns the current accumulator of a depth level, as a call site
    /// passing state onward would read it.
    #[must_use]
    pub fn accumulator(&self, depth: usize) -> Option<u32> {
        self.tracer.accumulator(depth)
    }

    /// Returns `true` if the executor counts frequencies.
    #[must_use]
    pub const fn frequency(&self) -> bool {
        self.frequency
    }
}

impl<L: Liveness> std::fmt::Debug for ProbeExecutor<'_, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeExecutor")
            .field("method", &self.method)
            .field("depths", &self.tracer.depth_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfg::{MethodCfg, NodeId, StmtId},
        instrument::{CallSite, Dua, InstrumentOptions, ProbePosition, ProgramPlan, VarStorage},
        runtime::lastdef::AlwaysLive,
    };

    fn diamond_plan() -> ProgramPlan {
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

        ProgramPlan::build(
            vec![cfg],
            Vec::new(),
            Vec::<CallSite>::new(),
            InstrumentOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_path_ops_mark_the_method_array() {
        let plan = diamond_plan();
        let registry = CoverageRegistry::allocate(&plan);
        let regs = LastDefRegisters::new(0);
        let aliased = AliasedTable::new();

        let mut exec =
            ProbeExecutor::<AlwaysLive>::new(&registry, &regs, &aliased, MethodId(0), false);
        exec.exec(&[ProbeOp::PathInit { depth: 0, value: 0 }], None);
        exec.exec(&[ProbeOp::PathAdd { value: 1 }], None);
        exec.exec(&[ProbeOp::PathCommit], None);

        let paths = registry.path_array(MethodId(0), 0).unwrap();
        assert_eq!(paths.snapshot(), vec![0, 1]);
    }

    #[test]
    fn test_use_check_reads_last_def() {
        let duas = vec![
            Dua {
                name: "x".into(),
                storage: VarStorage::Local(0),
                def_stmt: StmtId(1),
                use_stmt: StmtId(3),
                reach_def: Vec::new(),
                reach_use: Vec::new(),
                in_order_kill: Vec::new(),
                not_in_order_kill: Vec::new(),
            },
            Dua {
                name: "x".into(),
                storage: VarStorage::Local(0),
                def_stmt: StmtId(2),
                use_stmt: StmtId(3),
                reach_def: Vec::new(),
                reach_use: Vec::new(),
                in_order_kill: Vec::new(),
                not_in_order_kill: Vec::new(),
            },
        ];
        let mut cfg = MethodCfg::new(MethodId(0));
        let a = cfg.add_node(StmtId(1), false).unwrap();
        let b = cfg.add_node(StmtId(2), false).unwrap();
        let c = cfg.add_node(StmtId(3), false).unwrap();
        cfg.add_edge(NodeId::ENTRY, a, false).unwrap();
        cfg.add_edge(a, b, true).unwrap();
        cfg.add_edge(b, c, true).unwrap();
        cfg.add_edge(c, NodeId::EXIT, true).unwrap();
        let plan = ProgramPlan::build(
            vec![cfg],
            duas,
            Vec::<CallSite>::new(),
            InstrumentOptions::default(),
        )
        .unwrap();

        let registry = CoverageRegistry::allocate(&plan);
        let regs = LastDefRegisters::new(plan.duas().var_count() as usize);
        let aliased = AliasedTable::new();
        let mut exec =
            ProbeExecutor::<AlwaysLive>::new(&registry, &regs, &aliased, MethodId(0), false);

        let use_check = ProbeOp::UseCheck {
            var: 0,
            use_base: 0,
            defs: vec![0, 1],
        };

        // A use before any definition records nothing.
        exec.exec(std::slice::from_ref(&use_check), None);
        assert_eq!(registry.dua().snapshot(), vec![0, 0]);

        // Second definition runs last, so the use marks slot base+1.
        exec.exec(&[ProbeOp::DefRecord { var: 0, def: 0 }], None);
        exec.exec(&[ProbeOp::DefRecord { var: 0, def: 1 }], None);
        exec.exec(std::slice::from_ref(&use_check), None);

        assert_eq!(registry.dua().get(0), 0);
        assert_eq!(registry.dua().get(1), 1);
    }

    #[test]
    fn test_def_reaching_two_uses_marks_each_use_correctly() {
        // `x` has two defs (s0, s1) and two uses (s2, s3); both defs reach
        // both uses, supplied in opposite orders per use. Running only the
        // first definition must mark its own cell in each block, never the
        // other definition's.
        let dua = |def: u32, use_: u32| Dua {
            name: "x".into(),
            storage: VarStorage::Local(0),
            def_stmt: StmtId(def),
            use_stmt: StmtId(use_),
            reach_def: Vec::new(),
            reach_use: Vec::new(),
            in_order_kill: Vec::new(),
            not_in_order_kill: Vec::new(),
        };
        let duas = vec![dua(0, 2), dua(1, 2), dua(1, 3), dua(0, 3)];

        let mut cfg = MethodCfg::new(MethodId(0));
        let d0 = cfg.add_node(StmtId(0), false).unwrap();
        let d1 = cfg.add_node(StmtId(1), false).unwrap();
        let u0 = cfg.add_node(StmtId(2), false).unwrap();
        let u1 = cfg.add_node(StmtId(3), false).unwrap();
        cfg.add_edge(NodeId::ENTRY, d0, false).unwrap();
        cfg.add_edge(d0, d1, true).unwrap();
        cfg.add_edge(d1, u0, true).unwrap();
        cfg.add_edge(u0, u1, true).unwrap();
        cfg.add_edge(u1, NodeId::EXIT, true).unwrap();
        let plan = ProgramPlan::build(
            vec![cfg],
            duas,
            Vec::<CallSite>::new(),
            InstrumentOptions::default(),
        )
        .unwrap();

        let registry = CoverageRegistry::allocate(&plan);
        let regs = LastDefRegisters::new(plan.duas().var_count() as usize);
        let aliased = AliasedTable::new();
        let mut exec =
            ProbeExecutor::<AlwaysLive>::new(&registry, &regs, &aliased, MethodId(0), false);

        let method = plan.method(MethodId(0)).unwrap();
        for position in [
            ProbePosition::AfterNode(d0),
            ProbePosition::BeforeNode(u0),
            ProbePosition::BeforeNode(u1),
        ] {
            if let Some(ops) = method.registry().ops_at(position) {
                exec.exec(ops, None);
            }
        }

        // Block 0 holds (s0, s2) then (s1, s2); block 1 holds (s1, s3) then
        // (s0, s3). Only the s0 cells may be marked.
        assert_eq!(registry.dua().snapshot(), vec![1, 0, 0, 1]);
    }

    #[test]
    fn test_aliased_ops_need_access_context() {
        let plan = diamond_plan();
        let registry = CoverageRegistry::allocate(&plan);
        let regs = LastDefRegisters::new(0);
        let aliased = AliasedTable::new();
        let mut exec =
            ProbeExecutor::<AlwaysLive>::new(&registry, &regs, &aliased, MethodId(0), false);

        let access = AliasedAccess {
            container: 42,
            index: 3,
        };
        exec.exec(&[ProbeOp::AliasedDefRecord { def: 2 }], Some(access));
        assert_eq!(aliased.last_def(42, 3), Some(2));

        // A use against a never-defined slot records nothing.
        exec.exec(
            &[ProbeOp::AliasedUseCheck {
                use_base: 0,
                defs: vec![2],
            }],
            Some(AliasedAccess {
                container: 7,
                index: 0,
            }),
        );
    }
}
