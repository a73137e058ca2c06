//! # prodforge Core
//!
//! The deterministic engine behind prodforge: given a job definition and a
//! job index, compute that job's inputs, outputs, seed and configuration,
//! and invert the mapping from an output filename back to the job.
//!
//! ## Design Philosophy
//!
//! Every operation here is a pure function of `(&JobDefinition, index)`.
//! Nothing is cached and nothing is mutated, so:
//! - Any index can be resolved in any order, on any thread
//! - Reverse resolution is forward resolution run on a decoded index
//! - File and environment access stay in the config and CLI crates

pub mod error;
pub mod catalog;
pub mod merge;
pub mod sequencer;
pub mod filename;
pub mod location;
pub mod definition;
pub mod resolver;
pub mod target;
pub mod materialize;

// Re-export key types at crate root for ergonomics
pub use error::{Error, FieldError, Result};
pub use catalog::{AuxiliaryCatalog, SelectionMode, select};
pub use merge::{PrimaryInputs, SkipPlan, compute_skip, compute_skip_with, merge_factor};
pub use sequencer::{Sequencer, SequencerCodec, derive_seed};
pub use filename::{DataFilename, DatasetName};
pub use location::{InputLocator, Location, Protocol};
pub use definition::{ConfigKeys, JobDefinition, OutputPattern, OutputStream, ResamplingSpec, Template};
pub use resolver::{ComputedJobParameters, Resolver, resolve, resolve_range};
pub use target::resolve_target;
pub use materialize::{Materializer, materialize, render_for_input};
