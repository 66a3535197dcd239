//! Last-definition tracking for DUA probes.
//!
//! Register-tracked variables get one slot in [`LastDefRegisters`], updated
//! at every definition with the program-wide ID of the definition that ran;
//! a register is empty until its variable's first definition executes.
//! Aliased storage (fields, array elements) cannot be assigned a register
//! statically; the [`AliasedTable`] keys last-definition IDs by
//! (container identity, element index) instead. The table would grow without
//! bound as containers die, so every 1000 recorded definitions it sweeps
//! entries whose container a host-provided liveness oracle no longer
//! vouches for. The sweep is amortized housekeeping, not a correctness
//! mechanism: a stale entry only matters if a dead container's identity is
//! reused, which the oracle contract excludes.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

/// Interval between aliased-table sweeps, in recorded definitions.
const SWEEP_INTERVAL: u64 = 1000;

/// One last-definition register per register-tracked variable.
#[derive(Debug)]
pub struct LastDefRegisters {
    regs: Vec<AtomicU32>,
}

impl LastDefRegisters {
    /// Allocates `count` registers, all empty.
    #[must_use]
    pub fn new(count: usize) -> Self {
        let mut regs = Vec::with_capacity(count);
        regs.resize_with(count, || AtomicU32::new(0));
        Self { regs }
    }

    /// Records that definition `def` of variable `var` executed.
    pub fn record(&self, var: u32, def: u32) {
        debug_assert!((var as usize) < self.regs.len(), "register {var} out of range");
        if let Some(reg) = self.regs.get(var as usize) {
            // Shifted by one so 0 stays the empty marker.
            reg.store(def.saturating_add(1), Ordering::Relaxed);
        }
    }

    /// Returns the ID of the variable's last executed definition, `None` if
    /// no definition has run yet.
    #[must_use]
    pub fn last_def(&self, var: u32) -> Option<u32> {
        self.regs
            .get(var as usize)
            .and_then(|r| match r.load(Ordering::Relaxed) {
                0 => None,
                shifted => Some(shifted - 1),
            })
    }

    /// Returns the number of registers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regs.len()
    }

    /// Returns `true` if no registers were allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }
}

/// Host-provided oracle telling the table which containers are still alive.
pub trait Liveness: Send + Sync {
    /// Returns `true` if the container identity still refers to a live object.
    fn is_live(&self, container: u64) -> bool;
}

/// Oracle that never reclaims; suitable for short-lived programs and tests.
#[derive(Debug, Default)]
pub struct AlwaysLive;

impl Liveness for AlwaysLive {
    fn is_live(&self, _container: u64) -> bool {
        true
    }
}

/// Last-definition side table for aliased storage.
pub struct AliasedTable<L = AlwaysLive> {
    entries: DashMap<(u64, u32), u32>,
    defs_recorded: AtomicU64,
    liveness: L,
}

impl AliasedTable<AlwaysLive> {
    /// Creates a table that never sweeps entries out.
    #[must_use]
    pub fn new() -> Self {
        Self::with_liveness(AlwaysLive)
    }
}

impl Default for AliasedTable<AlwaysLive> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Liveness> AliasedTable<L> {
    /// Creates a table backed by the given liveness oracle.
    #[must_use]
    pub fn with_liveness(liveness: L) -> Self {
        Self {
            entries: DashMap::new(),
            defs_recorded: AtomicU64::new(0),
            liveness,
        }
    }

    /// Records that definition `def` of `(container, index)` executed.
    ///
    /// Every [`SWEEP_INTERVAL`]th call also sweeps dead containers; readers
    /// and writers in other threads proceed shard by shard during the sweep.
    pub fn record(&self, container: u64, index: u32, def: u32) {
        self.entries.insert((container, index), def);
        let recorded = self.defs_recorded.fetch_add(1, Ordering::Relaxed) + 1;
        if recorded % SWEEP_INTERVAL == 0 {
            self.sweep();
        }
    }

    /// Returns the last definition ID recorded for `(container, index)`.
    #[must_use]
    pub fn last_def(&self, container: u64, index: u32) -> Option<u32> {
        self.entries.get(&(container, index)).map(|e| *e)
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sweep(&self) {
        let before = self.entries.len();
        self.entries.retain(|&(container, _), _| self.liveness.is_live(container));
        debug!(before, after = self.entries.len(), "aliased table sweep");
    }
}

impl<L> std::fmt::Debug for AliasedTable<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasedTable")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[test]
    fn test_registers_keep_latest_def() {
        let regs = LastDefRegisters::new(3);
        regs.record(0, 1);
        regs.record(0, 3);
        regs.record(1, 2);
        assert_eq!(regs.last_def(0), Some(3));
        assert_eq!(regs.last_def(1), Some(2));
        // An untouched register reports no definition, including ID 0.
        assert_eq!(regs.last_def(2), None);
    }

    #[test]
    fn test_register_distinguishes_def_zero_from_empty() {
        let regs = LastDefRegisters::new(1);
        assert_eq!(regs.last_def(0), None);
        regs.record(0, 0);
        assert_eq!(regs.last_def(0), Some(0));
    }

    #[test]
    fn test_table_tracks_per_slot() {
        let table = AliasedTable::new();
        table.record(10, 0, 1);
        table.record(10, 1, 2);
        table.record(20, 0, 3);
        assert_eq!(table.last_def(10, 0), Some(1));
        assert_eq!(table.last_def(10, 1), Some(2));
        assert_eq!(table.last_def(20, 0), Some(3));
        assert_eq!(table.last_def(30, 0), None);
    }

    struct DeadSet(Mutex<HashSet<u64>>);

    impl Liveness for DeadSet {
        fn is_live(&self, container: u64) -> bool {
            !self.0.lock().unwrap().contains(&container)
        }
    }

    #[test]
    fn test_sweep_purges_dead_containers() {
        let table = AliasedTable::with_liveness(DeadSet(Mutex::new(HashSet::new())));
        table.record(1, 0, 0);
        table.record(2, 0, 0);

        table.liveness.0.lock().unwrap().insert(1);

        // Drive the def counter up to the sweep boundary.
        for _ in 0..(SWEEP_INTERVAL - 2) {
            table.record(2, 0, 0);
        }
        assert_eq!(table.last_def(1, 0), None);
        assert_eq!(table.last_def(2, 0), Some(0));
    }
}
