//! Job definition descriptor files.
//!
//! Descriptors are TOML (`.toml`) or JSON (`.json`) files:
//!
//! ```toml
//! owner = "mu2e"
//! desc = "CeEndpointMix"
//! dsconf = "MDC2025ac"
//! run = 1202
//! njobs = 1000
//! events_per_job = 500
//! selection = "pseudo-random"        # or "sequential"
//!
//! [template]
//! include = "Production/JobConfig/mixing/Mix.fcl"   # or: file = "mix.fcl"
//! overrides = [
//!     { key = "services.GeometryService.inputFile", value = '"geom_run1_a.txt"' },
//! ]
//!
//! [[aux]]
//! role = "physics.filters.MuBeamFlashMixer.fileNames"
//! per_job = 2
//! catalog = "mubeam.txt"             # or: files = ["a.art", "b.art"]
//!
//! [[outputs]]
//! key = "outputs.PrimaryOutput.fileName"
//! pattern = "dig.{owner}.{desc}.{dsconf}.{sequencer}.art"
//! location = "disk"
//!
//! [primary]                          # optional: jobs reading input files
//! catalog = "inputs.txt"
//! merge_factor = 2
//!
//! [resampling]                       # optional: resampling jobs
//! module = "beamResampler"
//! events_per_input_file = 1000
//!
//! [keys]                             # optional: configuration key names
//! first_subrun = ""                  # empty suppresses the line
//! ```
//!
//! Output patterns written in the dotted style with a bare `sequencer`
//! field (`sim.mu2e.X.Y.sequencer.art`) are accepted as well.
//!
//! A descriptor may give a list of alternatives for any of the top-level
//! scalar fields (`desc = ["CeEndpointMix", "CeEndpointMix1BB"]`). It then
//! stands for the cartesian product of those lists, in field order with
//! the last list varying fastest. A JSON descriptor may also be a list of
//! entries, each expanded the same way. [`DefinitionQuery`] picks one.

use std::path::{Path, PathBuf};

use prodforge_core::definition::{SEQUENCER_PLACEHOLDER, Template};
use prodforge_core::sequencer::SUBRUN_CAPACITY;
use prodforge_core::{
    AuxiliaryCatalog, ConfigKeys, Error, FieldError, JobDefinition, OutputPattern, OutputStream,
    PrimaryInputs, ResamplingSpec, SelectionMode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ConfigError;
use crate::catalog::CatalogSource;

/// On-disk descriptor schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefinitionFile {
    /// Defaults to the descriptor file stem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsconf: Option<String>,

    /// Required unless primary inputs determine it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub njobs: Option<u64>,

    #[serde(default)]
    pub run: u32,

    #[serde(default = "default_subruns_per_run")]
    pub subruns_per_run: u64,

    #[serde(default = "default_events_per_job")]
    pub events_per_job: u64,

    #[serde(default)]
    pub selection: SelectionMode,

    #[serde(default)]
    pub template: TemplateSpec,

    #[serde(default)]
    pub aux: Vec<AuxSpec>,

    #[serde(default)]
    pub outputs: Vec<OutputSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<PrimarySpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resampling: Option<ResamplingFileSpec>,

    #[serde(default)]
    pub keys: KeysSpec,
}

fn default_subruns_per_run() -> u64 {
    SUBRUN_CAPACITY
}
fn default_events_per_job() -> u64 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,

    /// Template text file, read verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    #[serde(default)]
    pub overrides: Vec<Override>,
}

/// One literal `key: value` line. The value is written exactly as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuxSpec {
    pub role: String,

    #[serde(default = "default_per_job")]
    pub per_job: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,

    /// Skip bound for the mixer reading this role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_events_to_skip: Option<u64>,

    /// Alternative to `max_events_to_skip`: totals of the mixed dataset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfiles: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nevents: Option<u64>,
}

fn default_per_job() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSpec {
    pub key: String,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrimarySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,

    /// Files per job. Derived from `merge_events` and `nevents` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_factor: Option<u64>,

    /// Events each job should collect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_events: Option<u64>,

    /// Total events in the input dataset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nevents: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResamplingFileSpec {
    /// Filter module that reads the resampled stream.
    pub module: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_per_input_file: Option<u64>,

    /// Alternative to `events_per_input_file`: dataset totals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfiles: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nevents: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_events_to_skip: Option<u64>,
}

/// Partial [`ConfigKeys`]; absent entries keep their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeysSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_subrun: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_events: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_inputs: Option<String>,
}

impl KeysSpec {
    fn apply(&self, mut keys: ConfigKeys) -> ConfigKeys {
        let pairs = [
            (&self.first_run, &mut keys.first_run),
            (&self.first_subrun, &mut keys.first_subrun),
            (&self.max_events, &mut keys.max_events),
            (&self.seed, &mut keys.seed),
            (&self.primary_inputs, &mut keys.primary_inputs),
        ];
        for (given, slot) in pairs {
            if let Some(v) = given {
                *slot = v.clone();
            }
        }
        keys
    }
}

/// Top-level fields that may list alternatives, in expansion order.
const EXPANDABLE_FIELDS: &[&str] = &[
    "name",
    "owner",
    "desc",
    "dsconf",
    "run",
    "njobs",
    "subruns_per_run",
    "events_per_job",
    "selection",
];

/// Picks one definition out of an expanded descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionQuery {
    /// Position in the expanded list; wins over `desc` and `dsconf`.
    pub index: Option<usize>,
    pub desc: Option<String>,
    pub dsconf: Option<String>,
}

impl DefinitionQuery {
    pub fn is_empty(&self) -> bool {
        self.index.is_none() && self.desc.is_none() && self.dsconf.is_none()
    }

    fn matches(&self, file: &DefinitionFile) -> bool {
        let field = |want: &Option<String>, have: &Option<String>| {
            want.as_ref().is_none_or(|w| have.as_ref() == Some(w))
        };
        field(&self.desc, &file.desc) && field(&self.dsconf, &file.dsconf)
    }

    /// Position of the single entry this query names.
    fn pick(&self, files: &[DefinitionFile]) -> Result<usize, ConfigError> {
        if let Some(index) = self.index {
            return if index < files.len() {
                Ok(index)
            } else {
                Err(ConfigError::ValidationError(format!(
                    "definition index {index} out of range ({} definitions)",
                    files.len()
                )))
            };
        }
        if self.is_empty() {
            return match files.len() {
                1 => Ok(0),
                n => Err(ConfigError::ValidationError(format!(
                    "descriptor expands to {n} definitions; select one by desc, dsconf or index"
                ))),
            };
        }
        let matches: Vec<usize> = (0..files.len()).filter(|&i| self.matches(&files[i])).collect();
        match matches.as_slice() {
            [one] => Ok(*one),
            found => Err(ConfigError::ValidationError(format!(
                "expected 1 definition for desc={}, dsconf={}; found {}",
                self.desc.as_deref().unwrap_or("*"),
                self.dsconf.as_deref().unwrap_or("*"),
                found.len()
            ))),
        }
    }
}

/// Load and validate a descriptor that stands for a single definition.
pub fn load_definition(path: &Path) -> Result<JobDefinition, ConfigError> {
    select_definition(path, &DefinitionQuery::default())
}

/// Load and validate the one definition `query` names.
pub fn select_definition(path: &Path, query: &DefinitionQuery) -> Result<JobDefinition, ConfigError> {
    let files = read_definition_files(path)?;
    let index = query.pick(&files)?;
    build_entry(path, &files, index)
}

/// Load and validate every definition a descriptor expands to.
pub fn load_definitions(path: &Path) -> Result<Vec<JobDefinition>, ConfigError> {
    let files = read_definition_files(path)?;
    (0..files.len()).map(|i| build_entry(path, &files, i)).collect()
}

/// Load the definitions whose `dsconf` starts with `prefix`.
pub fn load_definitions_for_dsconf(path: &Path, prefix: &str) -> Result<Vec<JobDefinition>, ConfigError> {
    let files = read_definition_files(path)?;
    let picked: Vec<usize> = (0..files.len())
        .filter(|&i| files[i].dsconf.as_deref().is_some_and(|d| d.starts_with(prefix)))
        .collect();
    if picked.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "no definitions with dsconf starting with '{prefix}'"
        )));
    }
    picked.into_iter().map(|i| build_entry(path, &files, i)).collect()
}

fn read_definition_files(path: &Path) -> Result<Vec<DefinitionFile>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_definition_files(path, &content)
}

fn build_entry(path: &Path, files: &[DefinitionFile], index: usize) -> Result<JobDefinition, ConfigError> {
    let base_dir = path.parent().unwrap_or(Path::new("."));
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("definition");
    let default_name = if files.len() == 1 {
        stem.to_string()
    } else {
        format!("{stem}.{index}")
    };
    let def = files[index].build(&default_name, base_dir)?;
    tracing::info!(
        name = %def.name,
        entry = index,
        njobs = def.njobs,
        roles = def.aux.len(),
        "loaded job definition from {}",
        path.display()
    );
    Ok(def)
}

/// Parse descriptor text that must stand for exactly one definition.
pub fn parse_definition_file(path: &Path, content: &str) -> Result<DefinitionFile, ConfigError> {
    let mut files = parse_definition_files(path, content)?;
    match files.len() {
        1 => Ok(files.remove(0)),
        n => Err(ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: format!("expected one definition, descriptor expands to {n}"),
        }),
    }
}

/// Parse descriptor text into one file per combination of listed
/// alternatives. The extension picks JSON, anything else is TOML.
pub fn parse_definition_files(path: &Path, content: &str) -> Result<Vec<DefinitionFile>, ConfigError> {
    let parse_error = |reason: String| ConfigError::ParseError {
        path: path.to_path_buf(),
        reason,
    };
    let is_json = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let value: Value = if is_json {
        serde_json::from_str(content).map_err(|e| parse_error(e.to_string()))?
    } else {
        toml::from_str(content).map_err(|e| parse_error(e.to_string()))?
    };

    let entries = match value {
        Value::Array(entries) => entries,
        single => vec![single],
    };
    let mut files = Vec::new();
    for (i, entry) in entries.into_iter().enumerate() {
        let Value::Object(entry) = entry else {
            return Err(parse_error(format!("entry {i} is not a table")));
        };
        for combination in expand_alternatives(entry).map_err(&parse_error)? {
            let file: DefinitionFile = serde_json::from_value(Value::Object(combination))
                .map_err(|e| parse_error(format!("entry {i}: {e}")))?;
            files.push(file);
        }
    }
    if files.is_empty() {
        return Err(parse_error("no definitions found".into()));
    }
    Ok(files)
}

/// Cartesian product of the list-valued expandable fields of one entry.
fn expand_alternatives(entry: Map<String, Value>) -> Result<Vec<Map<String, Value>>, String> {
    let mut combinations = vec![entry];
    for &field in EXPANDABLE_FIELDS {
        let Some(Value::Array(choices)) = combinations[0].get(field).cloned() else {
            continue;
        };
        if choices.is_empty() {
            return Err(format!("{field}: empty list of alternatives"));
        }
        combinations = combinations
            .into_iter()
            .flat_map(|combination| {
                choices.iter().map(move |choice| {
                    let mut expanded = combination.clone();
                    expanded.insert(field.to_string(), choice.clone());
                    expanded
                })
            })
            .collect();
    }
    Ok(combinations)
}

impl DefinitionFile {
    /// Turn the file schema into a validated [`JobDefinition`]. Every field
    /// problem is collected before failing.
    pub fn build(&self, default_name: &str, base_dir: &Path) -> Result<JobDefinition, ConfigError> {
        let mut errors = Vec::new();

        let name = self
            .name
            .as_deref()
            .map(|n| self.expand(n, "name", &mut errors))
            .unwrap_or_else(|| default_name.to_string());

        let template = self.template(base_dir, &mut errors)?;

        let primary = match &self.primary {
            Some(spec) => self.primary_inputs(spec, base_dir, &mut errors)?,
            None => None,
        };

        let njobs = match (self.njobs, &primary) {
            (Some(n), _) => n,
            (None, Some(p)) => p.njobs(),
            (None, None) => {
                errors.push(FieldError::new(
                    "njobs",
                    "required when there are no primary inputs",
                ));
                0
            }
        };

        let mut def = JobDefinition::new(name, template, njobs, self.run);
        def.subruns_per_run = self.subruns_per_run;
        def.events_per_job = self.events_per_job;
        def.selection = self.selection;
        def.primary = primary;
        def.keys = self.keys.apply(ConfigKeys::default());

        for spec in &self.aux {
            let field = format!("aux.{}", spec.role);
            let files = match CatalogSource::from_parts(spec.files.clone(), spec.catalog.clone()) {
                Ok(Some(source)) => source.load(base_dir)?,
                Ok(None) if spec.per_job == 0 => Vec::new(),
                Ok(None) => {
                    errors.push(FieldError::new(field, "no catalog supplied"));
                    continue;
                }
                Err(problem) => {
                    errors.push(FieldError::new(field, problem));
                    continue;
                }
            };
            if def.aux.contains_key(&spec.role) {
                errors.push(FieldError::new(field, "role declared more than once"));
                continue;
            }
            let mut catalog = AuxiliaryCatalog::new(files, spec.per_job);
            match aux_skip_bound(spec) {
                Ok(Some(bound)) => catalog = catalog.with_max_events_to_skip(bound),
                Ok(None) => {}
                Err(problem) => errors.push(FieldError::new(field, problem)),
            }
            def.aux.insert(spec.role.clone(), catalog);
        }

        for spec in &self.outputs {
            let field = format!("outputs.{}", spec.key);
            let pattern = self.expand(&normalize_pattern(&spec.pattern), &field, &mut errors);
            match OutputPattern::parse(&pattern) {
                Ok(pattern) => def.outputs.push(OutputStream {
                    key: spec.key.clone(),
                    pattern,
                    location: spec.location.clone(),
                }),
                Err(problem) => errors.push(FieldError::new(field, problem)),
            }
        }

        if let Some(spec) = &self.resampling {
            def.keys = def.keys.with_resampler(&spec.module);
            match resampling_rate(spec) {
                Ok(events_per_input_file) => {
                    def.resampling = Some(ResamplingSpec {
                        events_per_input_file,
                        max_events_to_skip: spec.max_events_to_skip,
                    })
                }
                Err(problem) => errors.push(FieldError::new("resampling", problem)),
            }
        }

        if let Err(Error::DescriptorValidation(found)) = def.validate() {
            errors.extend(found);
        }
        if errors.is_empty() {
            Ok(def)
        } else {
            Err(Error::DescriptorValidation(errors).into())
        }
    }

    fn template(&self, base_dir: &Path, errors: &mut Vec<FieldError>) -> Result<Template, ConfigError> {
        let spec = &self.template;
        let overrides = spec.overrides.iter().map(|o| (&o.key, &o.value));
        match (&spec.include, &spec.file) {
            (Some(_), Some(_)) => {
                errors.push(FieldError::new(
                    "template",
                    "give either include or file, not both",
                ));
                Ok(Template::default())
            }
            (Some(include), None) => Ok(Template::compose(include, overrides)),
            (None, Some(file)) => {
                let path = base_dir.join(file);
                let mut text = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                for (key, value) in overrides {
                    if !text.is_empty() && !text.ends_with('\n') {
                        text.push('\n');
                    }
                    text.push_str(&format!("{key}: {value}\n"));
                }
                Ok(Template::from_text(text))
            }
            (None, None) => {
                errors.push(FieldError::new("template", "needs include or file"));
                Ok(Template::default())
            }
        }
    }

    fn primary_inputs(
        &self,
        spec: &PrimarySpec,
        base_dir: &Path,
        errors: &mut Vec<FieldError>,
    ) -> Result<Option<PrimaryInputs>, ConfigError> {
        let files = match CatalogSource::from_parts(spec.files.clone(), spec.catalog.clone()) {
            Ok(Some(source)) => source.load(base_dir)?,
            Ok(None) => {
                errors.push(FieldError::new("primary", "no catalog supplied"));
                return Ok(None);
            }
            Err(problem) => {
                errors.push(FieldError::new("primary", problem));
                return Ok(None);
            }
        };

        let merge_factor = match (spec.merge_factor, spec.merge_events, spec.nevents) {
            (Some(m), _, _) => m,
            (None, Some(events), Some(nevents)) => {
                match prodforge_core::merge_factor(events, files.len() as u64, nevents) {
                    Ok(m) => m,
                    Err(e) => {
                        errors.push(FieldError::new("primary.merge_events", e.to_string()));
                        return Ok(None);
                    }
                }
            }
            (None, Some(_), None) => {
                errors.push(FieldError::new(
                    "primary.nevents",
                    "required to derive merge_factor from merge_events",
                ));
                return Ok(None);
            }
            (None, None, _) => 1,
        };
        Ok(Some(PrimaryInputs::new(files, merge_factor)))
    }

    /// Substitute `{owner}`, `{desc}` and `{dsconf}`.
    fn expand(&self, text: &str, field: &str, errors: &mut Vec<FieldError>) -> String {
        let mut out = text.to_string();
        for (placeholder, value) in [
            ("{owner}", &self.owner),
            ("{desc}", &self.desc),
            ("{dsconf}", &self.dsconf),
        ] {
            if !out.contains(placeholder) {
                continue;
            }
            match value {
                Some(v) => out = out.replace(placeholder, v),
                None => errors.push(FieldError::new(
                    field,
                    format!("uses {placeholder} but it is not set"),
                )),
            }
        }
        out
    }
}

/// Rewrite a bare `sequencer` dot field to the placeholder.
pub fn normalize_pattern(pattern: &str) -> String {
    if pattern.contains(SEQUENCER_PLACEHOLDER) {
        return pattern.to_string();
    }
    pattern
        .split('.')
        .map(|field| {
            if field == "sequencer" {
                SEQUENCER_PLACEHOLDER
            } else {
                field
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn aux_skip_bound(spec: &AuxSpec) -> Result<Option<u64>, String> {
    match (spec.max_events_to_skip, spec.nfiles, spec.nevents) {
        (Some(bound), _, _) => Ok(Some(bound)),
        (None, Some(nfiles), Some(nevents)) => prodforge_core::merge::events_per_file(nfiles, nevents)
            .map(Some)
            .map_err(|e| e.to_string()),
        (None, None, None) => Ok(None),
        _ => Err("nfiles and nevents must be given together".into()),
    }
}

fn resampling_rate(spec: &ResamplingFileSpec) -> Result<u64, String> {
    match (spec.events_per_input_file, spec.nfiles, spec.nevents) {
        (Some(rate), _, _) => Ok(rate),
        (None, Some(nfiles), Some(nevents)) => {
            prodforge_core::merge::events_per_file(nfiles, nevents).map_err(|e| e.to_string())
        }
        _ => Err("needs events_per_input_file, or nfiles and nevents".into()),
    }
}
