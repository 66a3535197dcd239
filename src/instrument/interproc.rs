//! Interprocedural path-state propagation planning.
//!
//! Path profiling can follow execution across call edges up to a configured
//! depth `D`: a call site passes (accumulator, path array) pairs as extra
//! parameters, so a callee's probes extend the caller's path record. This
//! module plans that propagation statically:
//!
//! - which depth levels every method must accept (the union over all call
//!   chains of length at most `D` that reach it),
//! - what each call site passes at each depth,
//! - a shared dummy array for unresolved/external/library targets that
//!   absorbs the extra arguments, sacrificing attribution but preserving
//!   bounds-safety,
//! - adapter shims for externally-owned polymorphic bases, so overriding
//!   methods can carry the extended parameter list the base cannot.
//!
//! The physical signature rewriting is the code rewriter's job; this module
//! only produces the plan.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    cfg::{MethodId, NodeId},
    instrument::paths::PathNumbering,
};

/// Statically resolved targets of one call site.
#[derive(Debug, Clone)]
pub enum CallTargets {
    /// A single, statically known target.
    Static(MethodId),
    /// A polymorphic call through a declared method with known overrides.
    Virtual {
        /// The declared (possibly abstract) method.
        declared: MethodId,
        /// Concrete overrides that may be dispatched to.
        overrides: Vec<MethodId>,
        /// `true` if the declaring type is externally owned and needs a shim.
        external_base: bool,
    },
    /// An unresolved or library target; propagated state goes to the dummy array.
    External,
}

/// One call site in an instrumented method.
#[derive(Debug, Clone)]
pub struct CallSite {
    /// The calling method.
    pub caller: MethodId,
    /// The node whose statement performs the call.
    pub node: NodeId,
    /// Resolved callee set.
    pub targets: CallTargets,
}

/// What a call site passes for one propagated depth level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthPass {
    /// The depth level the callee receives this state at.
    pub depth: u8,
    /// Increment added to the caller's accumulator before passing. With
    /// first-successor path completion this is the call node's first
    /// acyclic out-edge value, which the numbering assigns zero.
    pub remaining: u32,
}

/// The propagation plan of one call site.
#[derive(Debug, Clone)]
pub struct CallPropagation {
    /// Index of the call site in the planner's input.
    pub site: usize,
    /// States passed, one per propagated depth, shallowest first.
    pub passes: Vec<DepthPass>,
    /// `true` if the passed state lands in the shared dummy array.
    pub dummy: bool,
}

/// Adapter shim for an externally-owned polymorphic base.
///
/// The shim gives the abstract declaration the extended parameter signature
/// (the union of depths required by any override) and forwards to the
/// original entry point, so overriding subclasses of a class this build does
/// not own can still receive the extra parameters.
#[derive(Debug, Clone)]
pub struct ShimPlan {
    /// The externally-owned declared method.
    pub declared: MethodId,
    /// The overrides sharing the extended signature.
    pub overrides: Vec<MethodId>,
    /// The unioned depth levels of the extended signature.
    pub depths: Vec<u8>,
}

/// The interprocedural propagation plan for a whole program.
#[derive(Debug)]
pub struct InterprocPlan {
    max_depth: u8,
    /// Depth levels (beyond 0) each method must accept, sorted ascending.
    extended: HashMap<MethodId, Vec<u8>>,
    calls: Vec<CallPropagation>,
    shims: Vec<ShimPlan>,
    dummy_len: u32,
}

impl InterprocPlan {
    /// Plans propagation for the given call sites.
    ///
    /// `numberings` supplies the path numbering of every instrumented method;
    /// methods without one (path cap exceeded) neither propagate nor receive
    /// state. `dummy_paths` sizes the dummy array when no candidate target's
    /// path count is known.
    #[must_use]
    pub fn compute(
        sites: &[CallSite],
        numberings: &HashMap<MethodId, PathNumbering>,
        max_depth: u8,
        dummy_paths: u32,
    ) -> Self {
        let mut extended: HashMap<MethodId, Vec<u8>> = HashMap::new();

        if max_depth > 0 {
            // Fixpoint over the call sites: a method reachable through a call
            // chain of length d <= max_depth must accept depth d. Depths are
            // bounded by max_depth, so this terminates.
            let mut changed = true;
            while changed {
                changed = false;
                for site in sites {
                    if !numberings.contains_key(&site.caller) {
                        continue;
                    }
                    let caller_depths = live_depths(&extended, site.caller);
                    for callee in callees(&site.targets) {
                        if !numberings.contains_key(&callee) {
                            continue;
                        }
                        for &d in &caller_depths {
                            if d < max_depth {
                                let entry = extended.entry(callee).or_default();
                                if !entry.contains(&(d + 1)) {
                                    entry.push(d + 1);
                                    entry.sort_unstable();
                                    changed = true;
                                }
                            }
                        }
                    }
                }
            }
        }

        // Per-site propagation and dummy sizing.
        let mut calls = Vec::with_capacity(sites.len());
        let mut dummy_len: u32 = 0;
        for (idx, site) in sites.iter().enumerate() {
            if !numberings.contains_key(&site.caller) || max_depth == 0 {
                continue;
            }
            let caller_depths = live_depths(&extended, site.caller);
            let passes: Vec<DepthPass> = caller_depths
                .iter()
                .filter(|&&d| d < max_depth)
                .map(|&d| DepthPass {
                    depth: d + 1,
                    remaining: 0,
                })
                .collect();
            if passes.is_empty() {
                continue;
            }

            let dummy = matches!(site.targets, CallTargets::External);
            if dummy {
                let plausible = callees(&site.targets)
                    .into_iter()
                    .filter_map(|m| numberings.get(&m))
                    .map(|n| u32::try_from(n.array_len()).unwrap_or(u32::MAX))
                    .max()
                    .unwrap_or(dummy_paths);
                dummy_len = dummy_len.max(plausible.max(1));
            }
            calls.push(CallPropagation {
                site: idx,
                passes,
                dummy,
            });
        }

        // Shims for externally-owned bases: all overrides get the union of
        // the depths any of them requires.
        let mut shims = Vec::new();
        for site in sites {
            if let CallTargets::Virtual {
                declared,
                overrides,
                external_base: true,
            } = &site.targets
            {
                let mut depths: Vec<u8> = Vec::new();
                for m in std::iter::once(declared).chain(overrides.iter()) {
                    if let Some(d) = extended.get(m) {
                        for &level in d {
                            if !depths.contains(&level) {
                                depths.push(level);
                            }
                        }
                    }
                }
                if !depths.is_empty() {
                    depths.sort_unstable();
                    shims.push(ShimPlan {
                        declared: *declared,
                        overrides: overrides.clone(),
                        depths,
                    });
                }
            }
        }

        debug!(
            methods_extended = extended.len(),
            calls = calls.len(),
            shims = shims.len(),
            dummy_len,
            "interprocedural plan complete"
        );

        Self {
            max_depth,
            extended,
            calls,
            shims,
            dummy_len,
        }
    }

    /// Returns the configured maximum propagation depth.
    #[must_use]
    pub const fn max_depth(&self) -> u8 {
        self.max_depth
    }

    /// Returns the depth levels (beyond 0) a method must accept.
    #[must_use]
    pub fn depths_of(&self, method: MethodId) -> &[u8] {
        self.extended.get(&method).map_or(&[], Vec::as_slice)
    }

    /// Returns the per-site propagation plans.
    #[must_use]
    pub fn calls(&self) -> &[CallPropagation] {
        &self.calls
    }

    /// Returns the adapter shim plans.
    #[must_use]
    pub fn shims(&self) -> &[ShimPlan] {
        &self.shims
    }

    /// Returns the length of the shared dummy array, 0 if none is needed.
    #[must_use]
    pub const fn dummy_len(&self) -> u32 {
        self.dummy_len
    }
}

/// The depth levels live in a method: its own depth 0 plus received ones.
fn live_depths(extended: &HashMap<MethodId, Vec<u8>>, method: MethodId) -> Vec<u8> {
    let mut depths = vec![0];
    if let Some(received) = extended.get(&method) {
        depths.extend_from_slice(received);
    }
    depths
}

fn callees(targets: &CallTargets) -> Vec<MethodId> {
    match targets {
        CallTargets::Static(m) => vec![*m],
        CallTargets::Virtual {
            declared,
            overrides,
            ..
        } => {
            let mut all = vec![*declared];
            all.extend_from_slice(overrides);
            all
        }
        CallTargets::External => Vec::new(),
    }
}
