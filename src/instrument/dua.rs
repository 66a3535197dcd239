//! Definition-use-association planning.
//!
//! A DUA pairs one definition site and one use site of a variable, annotated
//! with four branch-requirement sets produced by the upstream
//! reaching-definition analysis. Uses with exactly one reaching definition
//! need no runtime state at all: their coverage is inferred offline from the
//! branch vector. Uses with several reaching definitions get a slot block in
//! the DUA coverage array, `entries_per_use` wide, and runtime probes record
//! *which* definition last executed:
//!
//! - register-tracked variables keep a last-definition register updated at
//!   every definition and consulted at the use,
//! - aliased storage (fields, array elements) goes through the side table
//!   keyed by container identity and element index.
//!
//! Definition sites carry program-wide IDs shared by every use the
//! definition reaches; the use probe remaps the recorded ID onto its own
//! slot block. Registers are keyed by the upstream variable number, so
//! same-named locals in different scopes stay apart.
//!
//! In hybrid mode only the non-inferable DUAs are instrumented directly and
//! the rest rely on inference; in direct mode every DUA is instrumented. The
//! DUA file and index file written here carry the mode marker so the reporter
//! merges the two result sets without double counting.

use std::collections::HashMap;
use std::io::Write;

use tracing::debug;

use crate::{
    cfg::{MethodCfg, StmtId},
    instrument::probes::{ProbeOp, ProbePosition, ProbeRegistry},
    Result,
};

/// How a variable's storage is addressed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarStorage {
    /// A statically identifiable local or parameter; tracked by a
    /// last-definition register. The payload is the program-wide variable
    /// number register allocation keys on, so distinct locals sharing a
    /// display name never share a register.
    Local(u32),
    /// An instance field; tracked through the aliased side table.
    Field,
    /// An array element; tracked through the aliased side table.
    ArrayElem,
}

impl VarStorage {
    /// Returns `true` if the storage needs the side table rather than a
    /// last-definition register.
    #[must_use]
    pub const fn is_aliased(self) -> bool {
        matches!(self, Self::Field | Self::ArrayElem)
    }
}

/// One definition-use association as delivered by the upstream analysis.
#[derive(Debug, Clone)]
pub struct Dua {
    /// Variable name, used in the DUA file and for register allocation.
    pub name: String,
    /// Storage addressing mode.
    pub storage: VarStorage,
    /// Statement performing the definition.
    pub def_stmt: StmtId,
    /// Statement performing the use.
    pub use_stmt: StmtId,
    /// Global branch indices that must fire for the definition to be reached.
    pub reach_def: Vec<u32>,
    /// Global branch indices that must fire for the use to be reached.
    pub reach_use: Vec<u32>,
    /// Branches that, if fired, definitely killed the definition en route.
    pub in_order_kill: Vec<u32>,
    /// Branches that may have killed the definition depending on order.
    pub not_in_order_kill: Vec<u32>,
}

impl Dua {
    /// The canonical name used in the DUA file: `var@defStmt->useStmt`.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{}@{}->{}", self.name, self.def_stmt, self.use_stmt)
    }

    fn requirement_sets(&self) -> [&[u32]; 4] {
        [
            &self.reach_def,
            &self.reach_use,
            &self.in_order_kill,
            &self.not_in_order_kill,
        ]
    }
}

/// A DUA with its assigned slots and instrumentation decision.
#[derive(Debug, Clone)]
pub struct PlannedDua {
    dua: Dua,
    inferable: bool,
    instrumented: bool,
    def_ordinal: u32,
    def_id: u32,
    use_base: u32,
    var_slot: Option<u32>,
}

impl PlannedDua {
    /// Returns the underlying association.
    #[must_use]
    pub const fn dua(&self) -> &Dua {
        &self.dua
    }

    /// Returns `true` if this DUA's use has a single reaching definition.
    #[must_use]
    pub const fn inferable(&self) -> bool {
        self.inferable
    }

    /// Returns `true` if runtime probes record this DUA directly.
    #[must_use]
    pub const fn instrumented(&self) -> bool {
        self.instrumented
    }

    /// Returns the slot of this DUA in the coverage array.
    #[must_use]
    pub const fn slot(&self) -> u32 {
        self.use_base + self.def_ordinal
    }

    /// Returns the program-wide ID of this DUA's definition site. One
    /// definition reaching several uses records the same ID everywhere.
    #[must_use]
    pub const fn def_id(&self) -> u32 {
        self.def_id
    }
}

/// The build-side DUA plan: slot layout, register allocation, probe placement.
#[derive(Debug)]
pub struct DuaPlan {
    duas: Vec<PlannedDua>,
    /// Per use group, the definition IDs of its reaching defs in slot order.
    group_defs: Vec<Vec<u32>>,
    hybrid: bool,
    entries_per_use: u32,
    array_len: u32,
    var_count: u32,
}

impl DuaPlan {
    /// Lays out the DUA coverage array and decides which DUAs to instrument.
    ///
    /// DUAs sharing a (variable, use statement) pair form one use group;
    /// every group gets `entries_per_use` consecutive slots, the next power
    /// of two of the largest group. `branch_count` is the size of the global
    /// branch index space; requirement sets are validated against it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MissingRequirement`] if any requirement set
    /// references a branch index outside the global branch table, which
    /// means the requirement dataset does not match this program.
    pub fn compute(duas: Vec<Dua>, hybrid: bool, branch_count: usize) -> Result<Self> {
        for dua in &duas {
            for set in dua.requirement_sets() {
                for &branch in set {
                    if branch as usize >= branch_count {
                        return Err(crate::Error::MissingRequirement(format!(
                            "{} references branch {branch}, but only {branch_count} branches exist",
                            dua.describe()
                        )));
                    }
                }
            }
        }

        // Use groups in first-appearance order; definition ordinals in
        // appearance order within each group. Both orders are part of the
        // contract with the index file. Definition sites get program-wide
        // IDs so a def reaching several uses records one value.
        let mut groups: HashMap<(String, StmtId), u32> = HashMap::new();
        let mut def_ids: HashMap<(String, StmtId), u32> = HashMap::new();
        let mut group_defs: Vec<Vec<u32>> = Vec::new();
        let mut ordinals = Vec::with_capacity(duas.len());
        for dua in &duas {
            let key = (dua.name.clone(), dua.use_stmt);
            let group = *groups.entry(key).or_insert_with(|| {
                group_defs.push(Vec::new());
                u32::try_from(group_defs.len() - 1).unwrap_or(u32::MAX)
            });
            let next_id = u32::try_from(def_ids.len()).unwrap_or(u32::MAX);
            let def_id = *def_ids
                .entry((dua.name.clone(), dua.def_stmt))
                .or_insert(next_id);
            let members = &mut group_defs[group as usize];
            ordinals.push((group, u32::try_from(members.len()).unwrap_or(u32::MAX), def_id));
            members.push(def_id);
        }

        let max_defs = group_defs.iter().map(Vec::len).max().unwrap_or(0);
        let entries_per_use = u32::try_from(max_defs)
            .unwrap_or(u32::MAX)
            .next_power_of_two()
            .max(1);
        let array_len = entries_per_use * u32::try_from(group_defs.len()).unwrap_or(u32::MAX);

        // One last-definition register per register-tracked variable that is
        // actually instrumented, keyed by the upstream variable number.
        let mut var_slots: HashMap<u32, u32> = HashMap::new();
        let mut planned = Vec::with_capacity(duas.len());
        for (dua, (group, def_ordinal, def_id)) in duas.into_iter().zip(ordinals) {
            let inferable = group_defs[group as usize].len() == 1;
            let instrumented = !hybrid || !inferable;
            let var_slot = match dua.storage {
                VarStorage::Local(var) if instrumented => {
                    let next = u32::try_from(var_slots.len()).unwrap_or(u32::MAX);
                    Some(*var_slots.entry(var).or_insert(next))
                }
                _ => None,
            };
            planned.push(PlannedDua {
                dua,
                inferable,
                instrumented,
                def_ordinal,
                def_id,
                use_base: group * entries_per_use,
                var_slot,
            });
        }

        debug!(
            duas = planned.len(),
            uses = group_defs.len(),
            entries_per_use,
            hybrid,
            "DUA plan complete"
        );

        Ok(Self {
            duas: planned,
            group_defs,
            hybrid,
            entries_per_use,
            array_len,
            var_count: u32::try_from(var_slots.len()).unwrap_or(u32::MAX),
        })
    }

    /// Returns the planned DUAs in input order.
    #[must_use]
    pub fn duas(&self) -> &[PlannedDua] {
        &self.duas
    }

    /// Returns `true` if the plan was built in hybrid mode.
    #[must_use]
    pub const fn hybrid(&self) -> bool {
        self.hybrid
    }

    /// Returns the slot-block width of one use group.
    #[must_use]
    pub const fn entries_per_use(&self) -> u32 {
        self.entries_per_use
    }

    /// Returns the length of the DUA coverage array.
    #[must_use]
    pub const fn array_len(&self) -> u32 {
        self.array_len
    }

    /// Returns the number of last-definition registers needed.
    #[must_use]
    pub const fn var_count(&self) -> u32 {
        self.var_count
    }

    /// Registers definition and use probes for the DUAs whose statements
    /// live in this method. Statements belonging to other methods are
    /// skipped; the orchestrator calls this once per method.
    pub fn plan_probes(&self, cfg: &MethodCfg, registry: &mut ProbeRegistry) {
        for planned in self.duas.iter().filter(|p| p.instrumented) {
            if let Some(node) = cfg.node_of_stmt(planned.dua.def_stmt) {
                let op = match planned.var_slot {
                    Some(var) => ProbeOp::DefRecord {
                        var,
                        def: planned.def_id,
                    },
                    None => ProbeOp::AliasedDefRecord {
                        def: planned.def_id,
                    },
                };
                registry.register(ProbePosition::AfterNode(node), op);
            }
            if let Some(node) = cfg.node_of_stmt(planned.dua.use_stmt) {
                let group = (planned.use_base / self.entries_per_use) as usize;
                let defs = self.group_defs[group].clone();
                let op = match planned.var_slot {
                    Some(var) => ProbeOp::UseCheck {
                        var,
                        use_base: planned.use_base,
                        defs,
                    },
                    None => ProbeOp::AliasedUseCheck {
                        use_base: planned.use_base,
                        defs,
                    },
                };
                registry.register(ProbePosition::BeforeNode(node), op);
            }
        }
    }

    /// Writes the DUA description file.
    ///
    /// First line is the mode marker (`H` hybrid, `N` direct), then five
    /// lines per DUA: inferability marker (`+` inferable, `-` not) and name,
    /// followed by the four requirement sets as space-separated branch IDs.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] on write failure.
    pub fn write_dua_file<W: Write>(&self, w: &mut W) -> Result<()> {
        writeln!(w, "{}", if self.hybrid { 'H' } else { 'N' })?;
        for planned in &self.duas {
            let marker = if planned.inferable { '+' } else { '-' };
            writeln!(w, "{marker} {}", planned.dua.describe())?;
            for set in planned.dua.requirement_sets() {
                writeln!(w, "{}", join_ids(set))?;
            }
        }
        Ok(())
    }

    /// Writes the DUA index file: the mode marker, then one byte offset into
    /// the runtime DUA array per DUA, in DUA-file order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] on write failure.
    pub fn write_index_file<W: Write>(&self, w: &mut W) -> Result<()> {
        writeln!(w, "{}", if self.hybrid { 'H' } else { 'N' })?;
        for planned in &self.duas {
            // Offset of the DUA's 4-byte cell.
            writeln!(w, "{}", planned.slot() * 4)?;
        }
        Ok(())
    }
}

fn join_ids(ids: &[u32]) -> String {
    let mut line = String::new();
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        line.push_str(&id.to_string());
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{MethodId, NodeId};

    fn dua(name: &str, storage: VarStorage, def: u32, use_: u32) -> Dua {
        Dua {
            name: name.into(),
            storage,
            def_stmt: StmtId(def),
            use_stmt: StmtId(use_),
            reach_def: vec![0],
            reach_use: vec![1],
            in_order_kill: Vec::new(),
            not_in_order_kill: Vec::new(),
        }
    }

    #[test]
    fn test_entries_per_use_rounds_up() {
        // Three reaching definitions of `x` at one use: block width 4.
        let duas = vec![
            dua("x", VarStorage::Local(0), 0, 9),
            dua("x", VarStorage::Local(0), 3, 9),
            dua("x", VarStorage::Local(0), 5, 9),
        ];
        let plan = DuaPlan::compute(duas, false, 4).unwrap();
        assert_eq!(plan.entries_per_use(), 4);
        assert_eq!(plan.array_len(), 4);

        let slots: Vec<u32> = plan.duas().iter().map(PlannedDua::slot).collect();
        assert_eq!(slots, vec![0, 1, 2]);
    }

    #[test]
    fn test_groups_share_block_width() {
        // One 2-def use and one 1-def use: width 2, two blocks.
        let duas = vec![
            dua("x", VarStorage::Local(0), 0, 9),
            dua("x", VarStorage::Local(0), 3, 9),
            dua("y", VarStorage::Local(1), 1, 9),
        ];
        let plan = DuaPlan::compute(duas, false, 4).unwrap();
        assert_eq!(plan.entries_per_use(), 2);
        assert_eq!(plan.array_len(), 4);
        assert_eq!(plan.duas()[2].slot(), 2);
    }

    #[test]
    fn test_hybrid_skips_inferable() {
        let duas = vec![
            dua("x", VarStorage::Local(0), 0, 9),
            dua("x", VarStorage::Local(0), 3, 9),
            dua("y", VarStorage::Local(1), 1, 8),
        ];
        let plan = DuaPlan::compute(duas, true, 4).unwrap();
        assert!(plan.duas()[0].instrumented());
        assert!(plan.duas()[1].instrumented());
        // Single reaching definition: inferred, not probed.
        assert!(plan.duas()[2].inferable());
        assert!(!plan.duas()[2].instrumented());
        assert_eq!(plan.var_count(), 1);
    }

    #[test]
    fn test_unknown_branch_requirement_is_fatal() {
        let mut bad = dua("x", VarStorage::Local(0), 0, 9);
        bad.reach_use = vec![7];
        match DuaPlan::compute(vec![bad], false, 4) {
            Err(crate::Error::MissingRequirement(msg)) => {
                assert!(msg.contains("branch 7"));
            }
            other => panic!("expected MissingRequirement, got {other:?}"),
        }
    }

    #[test]
    fn test_probe_placement_by_storage() {
        let duas = vec![
            dua("x", VarStorage::Local(0), 0, 2),
            dua("x", VarStorage::Local(0), 1, 2),
            dua("a", VarStorage::ArrayElem, 0, 2),
            dua("a", VarStorage::ArrayElem, 1, 2),
        ];
        let plan = DuaPlan::compute(duas, false, 4).unwrap();

        let mut cfg = MethodCfg::new(MethodId(0));
        let d0 = cfg.add_node(StmtId(0), false).unwrap();
        let d1 = cfg.add_node(StmtId(1), false).unwrap();
        let u = cfg.add_node(StmtId(2), false).unwrap();
        cfg.add_edge(NodeId::ENTRY, d0, false).unwrap();
        cfg.add_edge(d0, d1, true).unwrap();
        cfg.add_edge(d1, u, true).unwrap();
        cfg.add_edge(u, NodeId::EXIT, true).unwrap();

        let mut registry = ProbeRegistry::new();
        plan.plan_probes(&cfg, &mut registry);

        let at_d0 = registry.ops_at(ProbePosition::AfterNode(d0)).unwrap();
        assert!(at_d0.contains(&ProbeOp::DefRecord { var: 0, def: 0 }));
        assert!(at_d0.contains(&ProbeOp::AliasedDefRecord { def: 2 }));

        let at_use = registry.ops_at(ProbePosition::BeforeNode(u)).unwrap();
        assert!(at_use.contains(&ProbeOp::UseCheck {
            var: 0,
            use_base: 0,
            defs: vec![0, 1]
        }));
        assert!(at_use.contains(&ProbeOp::AliasedUseCheck {
            use_base: 2,
            defs: vec![2, 3]
        }));
    }

    #[test]
    fn test_definition_ids_are_shared_across_uses() {
        // Both defs of `x` reach both uses; each use orders them differently,
        // but a definition site keeps one ID everywhere.
        let duas = vec![
            dua("x", VarStorage::Local(0), 0, 2),
            dua("x", VarStorage::Local(0), 1, 2),
            dua("x", VarStorage::Local(0), 1, 3),
            dua("x", VarStorage::Local(0), 0, 3),
        ];
        let plan = DuaPlan::compute(duas, false, 4).unwrap();

        let ids: Vec<u32> = plan.duas().iter().map(PlannedDua::def_id).collect();
        assert_eq!(ids, vec![0, 1, 1, 0]);
        // Slots still follow per-use appearance order.
        let slots: Vec<u32> = plan.duas().iter().map(PlannedDua::slot).collect();
        assert_eq!(slots, vec![0, 1, 2, 3]);
        // One variable, one register.
        assert_eq!(plan.var_count(), 1);
    }

    #[test]
    fn test_dua_file_format() {
        let mut first = dua("x", VarStorage::Local(0), 0, 9);
        first.in_order_kill = vec![2, 3];
        let duas = vec![first, dua("x", VarStorage::Local(0), 3, 9)];
        let plan = DuaPlan::compute(duas, true, 4).unwrap();

        let mut out = Vec::new();
        plan.write_dua_file(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "H");
        assert_eq!(lines[1], "- x@s0->s9");
        assert_eq!(lines[2], "0");
        assert_eq!(lines[3], "1");
        assert_eq!(lines[4], "2 3");
        assert_eq!(lines[5], "");
        assert_eq!(lines[6], "- x@s3->s9");
        assert_eq!(lines.len(), 11);
    }

    #[test]
    fn test_index_file_offsets() {
        let duas = vec![
            dua("x", VarStorage::Local(0), 0, 9),
            dua("x", VarStorage::Local(0), 3, 9),
            dua("y", VarStorage::Local(1), 1, 8),
        ];
        let plan = DuaPlan::compute(duas, false, 4).unwrap();

        let mut out = Vec::new();
        plan.write_index_file(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        // Slots 0, 1, 2 as byte offsets of 4-byte cells.
        assert_eq!(text, "N\n0\n4\n8\n");
    }
}
