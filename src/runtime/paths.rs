//! Runtime path accumulators.
//!
//! A [`PathTracer`] holds one accumulator per live depth level: the method's
//! own depth-0 state plus any deeper states received from callers. Probes
//! drive it through the semantics planned by the numbering pass: initialize
//! at entry, add edge increments, commit at returns, commit-and-reset at
//! loop back-edges.

use std::sync::Arc;

use super::arrays::CoverageArray;

#[derive(Debug)]
struct DepthState {
    acc: u32,
    /// The value the accumulator was initialized with; back-edges in deeper
    /// frames reset to it, confining enumeration to one iteration's span.
    entry: u32,
    array: Arc<CoverageArray>,
}

/// The live path-accumulator set of one method activation.
#[derive(Debug)]
pub struct PathTracer {
    states: Vec<DepthState>,
    frequency: bool,
}

impl PathTracer {
    /// Creates a tracer with no live accumulators.
    #[must_use]
    pub fn new(frequency: bool) -> Self {
        Self {
            states: Vec::new(),
            frequency,
        }
    }

    /// Initializes the accumulator for one depth level.
    ///
    /// Depth 0 comes from the method-entry probe; deeper levels are the
    /// caller-passed accumulator plus the call site's remaining increment,
    /// arriving with the caller's array handle.
    pub fn init(&mut self, value: u32, array: Arc<CoverageArray>) {
        self.states.push(DepthState {
            acc: value,
            entry: value,
            array,
        });
    }

    /// Adds an edge increment to every live accumulator.
    pub fn add(&mut self, value: u32) {
        for state in &mut self.states {
            state.acc = state.acc.wrapping_add(value);
        }
    }

    /// Marks each live accumulator's path slot (a return-like edge).
    pub fn commit(&self) {
        for state in &self.states {
            mark(&state.array, state.acc, self.frequency);
        }
    }

    /// Commits with the back-edge's source→EXIT pseudo-value added, then
    /// resets for the next iteration: the depth-0 accumulator to the
    /// ENTRY→loop-head pseudo-value, deeper ones to their arrival value.
    pub fn back_edge(&mut self, exit_value: u32, reset_value: u32) {
        for (depth, state) in self.states.iter_mut().enumerate() {
            mark(
                &state.array,
                state.acc.wrapping_add(exit_value),
                self.frequency,
            );
            state.acc = if depth == 0 { reset_value } else { state.entry };
        }
    }

    /// Returns the number of live depth levels.
    #[must_use]
    pub fn depth_count(&self) -> usize {
        self.states.len()
    }

    /// Returns the current accumulator of a depth level; used when passing
    /// state onward at a call site.
    #[must_use]
    pub fn accumulator(&self, depth: usize) -> Option<u32> {
        self.states.get(depth).map(|s| s.acc)
    }

    /// Returns the array handle of a depth level, for call-site pass-through.
    #[must_use]
    pub fn array(&self, depth: usize) -> Option<&Arc<CoverageArray>> {
        self.states.get(depth).map(|s| &s.array)
    }
}

fn mark(array: &CoverageArray, index: u32, frequency: bool) {
    if frequency {
        array.add(index as usize);
    } else {
        array.hit(index as usize);
    }
}
