// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # pathprobe
//!
//! A coverage-instrumentation and reconstruction engine: given the
//! control-flow graphs of a program's methods, `pathprobe` decides which
//! edges must carry a runtime counter and which can be omitted, assigns
//! Ball-Larus numeric encodings so a single integer accumulator identifies
//! an entire acyclic execution path, plans minimal-overhead probes recording
//! into compact in-memory arrays, and offline-reconstructs full edge,
//! branch, path, and definition-use-association (DUA) coverage from the
//! partial data recorded at runtime.
//!
//! ## Features
//!
//! - **Selective edge instrumentation** - a maximum-weight spanning tree
//!   over each method's edge set marks the edges whose counts flow
//!   conservation recovers offline; only the rest get counters
//! - **Acyclic path profiling** - Ball-Larus path numbering with
//!   commit-and-reset handling of loop back-edges, and bounded-depth
//!   propagation of path state across calls, including polymorphic and
//!   external targets
//! - **DUA tracking** - branch-based inference where a use has one reaching
//!   definition, last-definition registers and an aliased-storage side table
//!   where it does not, and a hybrid mode merging both without double
//!   counting
//! - **Cheap runtime** - fixed-size arrays of relaxed atomic cells,
//!   allocated once before any instrumented code runs; probes never
//!   synchronize and never fail into the host program
//!
//! ## Architecture
//!
//! Data flows one way at each stage:
//!
//! 1. **Build time** ([`cfg`], [`instrument`]): CFGs in, probe plans and
//!    side files out. Index spaces are assigned in one deterministic pass.
//! 2. **Run time** ([`runtime`]): probes append to pre-sized coverage
//!    arrays through handles handed out at setup.
//! 3. **Report time** ([`report`]): side files plus recorded arrays in,
//!    coverage matrix files out.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pathprobe::prelude::*;
//!
//! # fn front_end() -> (Vec<MethodCfg>, Vec<Dua>, Vec<CallSite>) { unimplemented!() }
//! let (cfgs, duas, calls) = front_end();
//! let plan = ProgramPlan::build(cfgs, duas, calls, InstrumentOptions::default())?;
//!
//! // Hand plan.methods()[..].registry() to the code rewriter, write the
//! // side files, and allocate the runtime arrays:
//! let registry = CoverageRegistry::allocate(&plan);
//!
//! // After the instrumented program has run:
//! let reporter = Reporter::new("side", "out");
//! let summary = reporter.report(&registry);
//! println!("{} matrices written", summary.written().len());
//! # Ok::<(), pathprobe::Error>(())
//! ```

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
pub mod prelude;

/// Control-flow graph model: nodes, edges, branches, and their index spaces.
pub mod cfg;

/// Build-time instrumentation planning: spanning trees, edge counters, path
/// numbering, interprocedural propagation, and DUA layout.
pub mod instrument;

/// Runtime coverage storage and probe semantics.
pub mod runtime;

/// Offline reconstruction and matrix reporting.
pub mod report;

/// Small shared utilities.
pub mod utils;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

pub use error::Error;
