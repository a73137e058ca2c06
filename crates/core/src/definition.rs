//! Job definition types.
//!
//! A [`JobDefinition`] describes one family of jobs: the shared template,
//! how many jobs there are, which auxiliary catalogs they draw from and
//! how their outputs are named. It is built once and never mutated; every
//! per-job value is computed from it on demand.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{AuxiliaryCatalog, SelectionMode};
use crate::error::{Error, FieldError, Result};
use crate::merge::PrimaryInputs;
use crate::sequencer::{MAX_RUN, SUBRUN_CAPACITY, Sequencer, SequencerCodec};

/// Placeholder substituted with the job's sequencer in output patterns.
pub const SEQUENCER_PLACEHOLDER: &str = "{sequencer}";

/// Opaque template text. Never parsed or re-expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    text: String,
}

impl Template {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// `#include "<include>"` followed by one `key: value` line per override.
    /// Values are written exactly as given.
    pub fn compose<K, V>(include: &str, overrides: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut text = format!("#include \"{include}\"\n");
        for (key, value) in overrides {
            text.push_str(key.as_ref());
            text.push_str(": ");
            text.push_str(value.as_ref());
            text.push('\n');
        }
        Self { text }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// An output filename pattern split around its `{sequencer}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OutputPattern {
    prefix: String,
    suffix: String,
}

impl OutputPattern {
    /// The pattern must contain `{sequencer}` exactly once.
    pub fn parse(pattern: &str) -> std::result::Result<Self, String> {
        let mut parts = pattern.split(SEQUENCER_PLACEHOLDER);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(prefix), Some(suffix), None) => Ok(Self {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            }),
            (_, None, _) => Err(format!("pattern '{pattern}' has no {SEQUENCER_PLACEHOLDER}")),
            _ => Err(format!(
                "pattern '{pattern}' has more than one {SEQUENCER_PLACEHOLDER}"
            )),
        }
    }

    pub fn render(&self, seq: Sequencer) -> String {
        format!("{}{seq}{}", self.prefix, self.suffix)
    }

    /// The text standing where the sequencer would be, if `name` fits the
    /// pattern's fixed parts.
    pub fn extract<'a>(&self, name: &'a str) -> Option<&'a str> {
        if name.len() < self.prefix.len() + self.suffix.len() {
            return None;
        }
        name.strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())
    }
}

impl fmt::Display for OutputPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEQUENCER_PLACEHOLDER}{}", self.prefix, self.suffix)
    }
}

impl TryFrom<String> for OutputPattern {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, String> {
        Self::parse(&s)
    }
}

impl From<OutputPattern> for String {
    fn from(p: OutputPattern) -> Self {
        p.to_string()
    }
}

/// One declared output: the configuration key its filename is written
/// under and the pattern that names it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputStream {
    pub key: String,
    pub pattern: OutputPattern,
    /// Storage location the output dataset is uploaded to, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl OutputStream {
    pub fn new(key: impl Into<String>, pattern: OutputPattern) -> Self {
        Self {
            key: key.into(),
            pattern,
            location: None,
        }
    }
}

/// Marks a definition as resampling-style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResamplingSpec {
    pub events_per_input_file: u64,
    #[serde(default)]
    pub max_events_to_skip: Option<u64>,
}

/// Configuration keys the computed parameters are written under.
///
/// An empty key suppresses its line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigKeys {
    pub first_run: String,
    pub first_subrun: String,
    pub max_events: String,
    pub seed: String,
    pub primary_inputs: String,
    pub files_to_skip: String,
    pub max_events_to_skip: String,
}

impl Default for ConfigKeys {
    fn default() -> Self {
        Self {
            first_run: "source.firstRun".into(),
            first_subrun: "source.firstSubRun".into(),
            max_events: "source.maxEvents".into(),
            seed: "services.SeedService.baseSeed".into(),
            primary_inputs: "source.fileNames".into(),
            files_to_skip: String::new(),
            max_events_to_skip: String::new(),
        }
    }
}

impl ConfigKeys {
    /// Skip keys addressed to the named resampling filter module.
    pub fn with_resampler(mut self, module: &str) -> Self {
        self.files_to_skip = format!("physics.filters.{module}.mu2e.FilesToSkip");
        self.max_events_to_skip = format!("physics.filters.{module}.mu2e.MaxEventsToSkip");
        self
    }

    /// Skip-bound key of the mixer reading an auxiliary role:
    /// `<module>.fileNames` becomes `<module>.mu2e.MaxEventsToSkip`.
    pub fn aux_skip_key(role: &str) -> Option<String> {
        role.strip_suffix(".fileNames")
            .filter(|module| !module.is_empty())
            .map(|module| format!("{module}.mu2e.MaxEventsToSkip"))
    }
}

/// The static description of a family of jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDefinition {
    pub name: String,
    pub template: Template,
    pub njobs: u64,
    /// Base run number of the first job.
    pub run: u32,
    pub subruns_per_run: u64,
    pub events_per_job: u64,
    /// Role name (the configuration key its files are written under) to catalog.
    pub aux: BTreeMap<String, AuxiliaryCatalog>,
    pub selection: SelectionMode,
    pub outputs: Vec<OutputStream>,
    pub primary: Option<PrimaryInputs>,
    pub resampling: Option<ResamplingSpec>,
    pub keys: ConfigKeys,
}

impl JobDefinition {
    /// A minimal definition with no catalogs or outputs.
    pub fn new(name: impl Into<String>, template: Template, njobs: u64, run: u32) -> Self {
        Self {
            name: name.into(),
            template,
            njobs,
            run,
            subruns_per_run: SUBRUN_CAPACITY,
            events_per_job: 1,
            aux: BTreeMap::new(),
            selection: SelectionMode::default(),
            outputs: Vec::new(),
            primary: None,
            resampling: None,
            keys: ConfigKeys::default(),
        }
    }

    pub fn codec(&self) -> SequencerCodec {
        SequencerCodec::with_capacity(self.run, self.subruns_per_run)
    }

    /// Check every field and report all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.njobs == 0 {
            errors.push(FieldError::new("njobs", "must be positive"));
        }
        if self.events_per_job == 0 {
            errors.push(FieldError::new("events_per_job", "must be positive"));
        }
        if self.run > MAX_RUN {
            errors.push(FieldError::new(
                "run",
                format!("{} does not fit in six digits", self.run),
            ));
        }
        if self.subruns_per_run == 0 || self.subruns_per_run > SUBRUN_CAPACITY {
            errors.push(FieldError::new(
                "subruns_per_run",
                format!("must be between 1 and {SUBRUN_CAPACITY}"),
            ));
        } else if self.run <= MAX_RUN && self.codec().last_run(self.njobs) > u64::from(MAX_RUN) {
            errors.push(FieldError::new(
                "njobs",
                format!("{} jobs roll over past run {MAX_RUN}", self.njobs),
            ));
        }

        for (role, catalog) in &self.aux {
            let field = format!("aux.{role}");
            if role.trim().is_empty() {
                errors.push(FieldError::new(field.clone(), "role name is empty"));
            }
            if catalog.per_job > 0 && catalog.is_empty() {
                errors.push(FieldError::new(field.clone(), "no catalog supplied"));
            }
            if catalog.max_events_to_skip.is_some() && ConfigKeys::aux_skip_key(role).is_none() {
                errors.push(FieldError::new(
                    field,
                    "a skip bound needs a role of the form <module>.fileNames",
                ));
            }
        }

        if self.outputs.is_empty() {
            errors.push(FieldError::new("outputs", "at least one output is required"));
        }
        let mut keys = HashSet::new();
        for out in &self.outputs {
            if out.key.trim().is_empty() {
                errors.push(FieldError::new("outputs", "output key is empty"));
            } else if !keys.insert(out.key.as_str()) {
                errors.push(FieldError::new(
                    format!("outputs.{}", out.key),
                    "declared more than once",
                ));
            }
        }

        if let Some(primary) = &self.primary {
            if primary.files.is_empty() {
                errors.push(FieldError::new("primary.files", "no input files"));
            }
            if primary.merge_factor == 0 {
                errors.push(FieldError::new("primary.merge_factor", "must be positive"));
            } else if self.njobs > primary.njobs() {
                errors.push(FieldError::new(
                    "njobs",
                    format!(
                        "{} jobs but primary inputs only cover {}",
                        self.njobs,
                        primary.njobs()
                    ),
                ));
            }
        }

        if let Some(resampling) = &self.resampling {
            if resampling.events_per_input_file == 0 {
                errors.push(FieldError::new(
                    "resampling.events_per_input_file",
                    "must be positive",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::DescriptorValidation(errors))
        }
    }

    /// The output stream a filename was produced by, with the sequencer text
    /// extracted from it.
    pub fn match_output<'a>(&self, name: &'a str) -> Option<(&OutputStream, &'a str)> {
        self.outputs
            .iter()
            .find_map(|out| out.pattern.extract(name).map(|seq| (out, seq)))
    }

    /// Total auxiliary files each job reads across all roles.
    pub fn aux_files_per_job(&self) -> usize {
        self.aux.values().map(|c| c.per_job).sum()
    }

    /// Per-role mixer skip bounds, keyed by configuration key.
    pub fn aux_skip_bounds(&self) -> BTreeMap<String, u64> {
        self.aux
            .iter()
            .filter_map(|(role, catalog)| {
                let bound = catalog.max_events_to_skip?;
                ConfigKeys::aux_skip_key(role).map(|key| (key, bound))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> JobDefinition {
        let mut def = JobDefinition::new("cnf.mu2e.Test.MDC2025ac.0", Template::default(), 10, 1430);
        def.outputs.push(OutputStream::new(
            "outputs.PrimaryOutput.fileName",
            OutputPattern::parse("dts.mu2e.Test.MDC2025ac.{sequencer}.art").unwrap(),
        ));
        def
    }

    #[test]
    fn compose_writes_overrides_verbatim() {
        let t = Template::compose(
            "Production/JobConfig/primary/CeEndpoint.fcl",
            [("physics.producers.generate.inputs", "{ a : 1 }"), ("x", "\"q\"")],
        );
        assert_eq!(
            t.text(),
            "#include \"Production/JobConfig/primary/CeEndpoint.fcl\"\n\
             physics.producers.generate.inputs: { a : 1 }\n\
             x: \"q\"\n"
        );
    }

    #[test]
    fn pattern_render_and_extract() {
        let p = OutputPattern::parse("sim.mu2e.X.Y.{sequencer}.art").unwrap();
        let seq = Sequencer::new(1430, 7);
        let name = p.render(seq);
        assert_eq!(name, "sim.mu2e.X.Y.001430_00000007.art");
        assert_eq!(p.extract(&name), Some("001430_00000007"));
        assert_eq!(p.extract("sim.mu2e.Z.Y.001430_00000007.art"), None);
        assert_eq!(p.to_string(), "sim.mu2e.X.Y.{sequencer}.art");
    }

    #[test]
    fn pattern_requires_single_placeholder() {
        assert!(OutputPattern::parse("sim.mu2e.X.Y.art").is_err());
        assert!(OutputPattern::parse("{sequencer}.{sequencer}").is_err());
    }

    #[test]
    fn valid_definition_passes() {
        assert!(definition().validate().is_ok());
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut def = definition();
        def.njobs = 0;
        def.events_per_job = 0;
        def.aux.insert(
            "physics.filters.MuBeamFlashMixer.fileNames".into(),
            AuxiliaryCatalog::new(vec![], 1),
        );
        let Err(Error::DescriptorValidation(errors)) = def.validate() else {
            panic!("expected validation failure");
        };
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"njobs"));
        assert!(fields.contains(&"events_per_job"));
        assert!(fields.contains(&"aux.physics.filters.MuBeamFlashMixer.fileNames"));
    }

    #[test]
    fn validation_rejects_run_rollover_past_six_digits() {
        let mut def = definition();
        def.run = 999_999;
        def.subruns_per_run = 5;
        def.njobs = 6;
        assert!(def.validate().is_err());
        def.njobs = 5;
        assert!(def.validate().is_ok());
    }

    #[test]
    fn validation_checks_primary_coverage() {
        let mut def = definition();
        def.primary = Some(PrimaryInputs::new(vec!["a".into(), "b".into(), "c".into()], 2));
        def.njobs = 3;
        assert!(def.validate().is_err());
        def.njobs = 2;
        assert!(def.validate().is_ok());
    }

    #[test]
    fn duplicate_output_keys_rejected() {
        let mut def = definition();
        let dup = def.outputs[0].clone();
        def.outputs.push(dup);
        assert!(def.validate().is_err());
    }

    #[test]
    fn aux_skip_keys_follow_mixer_module() {
        assert_eq!(
            ConfigKeys::aux_skip_key("physics.filters.MuBeamFlashMixer.fileNames").as_deref(),
            Some("physics.filters.MuBeamFlashMixer.mu2e.MaxEventsToSkip")
        );
        assert_eq!(ConfigKeys::aux_skip_key("physics.filters.gen.inputs"), None);

        let mut def = definition();
        def.aux.insert(
            "physics.filters.gen.inputs".into(),
            AuxiliaryCatalog::new(vec!["a.art".into()], 1).with_max_events_to_skip(10),
        );
        assert!(def.validate().is_err());
    }

    #[test]
    fn zero_per_job_role_needs_no_files() {
        let mut def = definition();
        def.aux.insert("physics.filters.Unused.fileNames".into(), AuxiliaryCatalog::new(vec![], 0));
        assert!(def.validate().is_ok());
        assert_eq!(def.aux_files_per_job(), 0);
    }

    #[test]
    fn resampler_keys() {
        let keys = ConfigKeys::default().with_resampler("beamResampler");
        assert_eq!(
            keys.max_events_to_skip,
            "physics.filters.beamResampler.mu2e.MaxEventsToSkip"
        );
    }
}
