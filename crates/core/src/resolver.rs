//! Job parameter resolution.
//!
//! [`resolve`] composes selection, skip arithmetic and the sequencer codec
//! into the complete parameter set for one job index.

use std::collections::BTreeMap;
use std::ops::Range;

use serde::Serialize;
use tracing::debug;

use crate::catalog::select;
use crate::definition::JobDefinition;
use crate::error::{Error, Result};
use crate::merge::{SkipPlan, compute_skip_with};
use crate::sequencer::{Sequencer, seed_for};

/// Everything that varies from one job of a definition to the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComputedJobParameters {
    pub job_index: u64,
    pub sequencer: Sequencer,
    pub seed: u32,
    pub events: u64,
    /// This job's window of the primary inputs, for jobs that read them.
    pub primary_inputs: Option<Vec<String>>,
    /// Auxiliary files per role, keyed by role name.
    pub aux_inputs: BTreeMap<String, Vec<String>>,
    pub skip: Option<SkipPlan>,
    /// Mixer skip bounds, keyed by configuration key.
    pub aux_skip: BTreeMap<String, u64>,
    /// Output filename per output key.
    pub outputs: BTreeMap<String, String>,
}

impl ComputedJobParameters {
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }

    /// Every input file the job reads, primary first.
    pub fn all_inputs(&self) -> impl Iterator<Item = &String> {
        self.primary_inputs
            .iter()
            .flatten()
            .chain(self.aux_inputs.values().flatten())
    }
}

/// Resolve the parameters of job `job_index` of `def`.
pub fn resolve(def: &JobDefinition, job_index: u64) -> Result<ComputedJobParameters> {
    if job_index >= def.njobs {
        return Err(Error::IndexRange {
            index: job_index,
            njobs: def.njobs,
        });
    }

    let primary_inputs = match &def.primary {
        Some(primary) => Some(primary.slice(job_index)?.to_vec()),
        None => None,
    };

    let mut aux_inputs = BTreeMap::new();
    for (role, catalog) in &def.aux {
        let files = select(catalog, def.selection, role, job_index, catalog.per_job)?;
        aux_inputs.insert(role.clone(), files);
    }

    let skip = match &def.resampling {
        Some(r) => Some(compute_skip_with(
            def.events_per_job,
            r.events_per_input_file,
            job_index,
            r.max_events_to_skip,
        )?),
        None => None,
    };

    let sequencer = def.codec().encode(job_index);
    let outputs = def
        .outputs
        .iter()
        .map(|out| (out.key.clone(), out.pattern.render(sequencer)))
        .collect();

    debug!(
        definition = %def.name,
        job_index,
        sequencer = %sequencer,
        "resolved job parameters"
    );

    Ok(ComputedJobParameters {
        job_index,
        sequencer,
        seed: seed_for(sequencer),
        events: def.events_per_job,
        primary_inputs,
        aux_inputs,
        skip,
        aux_skip: def.aux_skip_bounds(),
        outputs,
    })
}

/// Iterator resolving a contiguous range of job indices.
pub struct Resolver<'a> {
    def: &'a JobDefinition,
    indices: Range<u64>,
}

impl<'a> Resolver<'a> {
    pub fn new(def: &'a JobDefinition) -> Self {
        Self::range(def, 0..def.njobs)
    }

    /// Indices beyond `njobs` yield `IndexRange` errors rather than being
    /// silently dropped.
    pub fn range(def: &'a JobDefinition, indices: Range<u64>) -> Self {
        Self { def, indices }
    }
}

impl Iterator for Resolver<'_> {
    type Item = Result<ComputedJobParameters>;

    fn next(&mut self) -> Option<Self::Item> {
        self.indices.next().map(|i| resolve(self.def, i))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indices.size_hint()
    }
}

/// Resolve every index in `indices`, stopping at the first error.
pub fn resolve_range(
    def: &JobDefinition,
    indices: Range<u64>,
) -> Result<Vec<ComputedJobParameters>> {
    Resolver::range(def, indices).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AuxiliaryCatalog, SelectionMode};
    use crate::definition::{OutputPattern, OutputStream, ResamplingSpec, Template};
    use crate::merge::PrimaryInputs;

    const MIXER: &str = "physics.filters.MuBeamFlashMixer.fileNames";

    fn definition(njobs: u64) -> JobDefinition {
        let mut def = JobDefinition::new(
            "cnf.mu2e.CeEndpointMix.MDC2025ac.0",
            Template::compose("Production/JobConfig/mixing/Mix.fcl", [("a", "1")]),
            njobs,
            1202,
        );
        def.events_per_job = 500;
        def.aux.insert(
            MIXER.into(),
            AuxiliaryCatalog::new((0..20).map(|i| format!("mubeam_{i:02}.art")).collect(), 2),
        );
        def.outputs.push(OutputStream::new(
            "outputs.PrimaryOutput.fileName",
            OutputPattern::parse("dig.mu2e.CeEndpointMix.MDC2025ac.{sequencer}.art").unwrap(),
        ));
        def
    }

    #[test]
    fn resolves_sequencer_outputs_and_inputs() {
        let def = definition(1000);
        let p = resolve(&def, 428).unwrap();
        assert_eq!(p.job_index, 428);
        assert_eq!(p.sequencer.to_string(), "001202_00000428");
        assert_eq!(
            p.output("outputs.PrimaryOutput.fileName"),
            Some("dig.mu2e.CeEndpointMix.MDC2025ac.001202_00000428.art")
        );
        assert_eq!(p.aux_inputs[MIXER].len(), 2);
        assert_eq!(p.events, 500);
        assert!(p.skip.is_none());
        assert!(p.primary_inputs.is_none());
        assert_eq!(p.seed, crate::sequencer::derive_seed(1202, 428));
    }

    #[test]
    fn resolution_is_deterministic() {
        let def = definition(100);
        for i in [0, 1, 50, 99] {
            assert_eq!(resolve(&def, i).unwrap(), resolve(&def, i).unwrap());
        }
    }

    #[test]
    fn index_out_of_range() {
        let def = definition(10);
        assert_eq!(
            resolve(&def, 10).unwrap_err(),
            Error::IndexRange { index: 10, njobs: 10 }
        );
    }

    #[test]
    fn sequential_mode_is_used_when_selected() {
        let mut def = definition(10);
        def.selection = SelectionMode::Sequential;
        let p = resolve(&def, 3).unwrap();
        assert_eq!(p.aux_inputs[MIXER], vec!["mubeam_06.art", "mubeam_07.art"]);
    }

    #[test]
    fn resampling_jobs_carry_skip_plan() {
        let mut def = definition(10);
        def.resampling = Some(ResamplingSpec {
            events_per_input_file: 1000,
            max_events_to_skip: None,
        });
        let skip = resolve(&def, 3).unwrap().skip.unwrap();
        assert_eq!(skip.files_to_skip, 1);
        assert_eq!(skip.max_events_to_skip, 999);
    }

    #[test]
    fn primary_inputs_sliced_by_merge_factor() {
        let mut def = definition(2);
        def.primary = Some(PrimaryInputs::new(
            vec!["a.art".into(), "b.art".into(), "c.art".into()],
            2,
        ));
        let p = resolve(&def, 1).unwrap();
        assert_eq!(p.primary_inputs, Some(vec!["c.art".to_string()]));
        let all: Vec<&String> = p.all_inputs().collect();
        assert_eq!(all[0], "c.art");
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn empty_catalog_surfaces_role() {
        let mut def = definition(5);
        def.aux.insert("physics.producers.gen.fileNames".into(), AuxiliaryCatalog::new(vec![], 1));
        let err = resolve(&def, 0).unwrap_err();
        assert!(err.to_string().contains("physics.producers.gen.fileNames"));
    }

    #[test]
    fn resolver_iterates_range() {
        let def = definition(5);
        let all = resolve_range(&def, 0..5).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[4].job_index, 4);

        let past_end: Vec<_> = Resolver::range(&def, 4..6).collect();
        assert!(past_end[0].is_ok());
        assert!(past_end[1].is_err());
        assert_eq!(Resolver::new(&def).count(), 5);
    }
}
