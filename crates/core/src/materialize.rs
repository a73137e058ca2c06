//! Configuration text rendering.
//!
//! The template is copied through untouched. Computed values are appended
//! after a marker comment in a fixed order, so two tools given the same
//! definition produce byte-identical text.
//!
//! Template mode skips the definition altogether: one job per input file,
//! with the outputs named after the fields of that input.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::definition::{ConfigKeys, JobDefinition, Template};
use crate::error::{Error, Result};
use crate::filename::DataFilename;
use crate::location::InputLocator;
use crate::resolver::ComputedJobParameters;

/// Render with the default keys and input names as listed in the catalogs.
pub fn materialize(template: &Template, params: &ComputedJobParameters) -> String {
    render(template, &ConfigKeys::default(), params)
}

/// Renders jobs of one definition, formatting input names for a location.
#[derive(Debug, Clone)]
pub struct Materializer {
    pub template: Template,
    pub keys: ConfigKeys,
    pub locator: InputLocator,
}

impl Materializer {
    pub fn new(template: Template, keys: ConfigKeys, locator: InputLocator) -> Self {
        Self {
            template,
            keys,
            locator,
        }
    }

    pub fn for_definition(def: &JobDefinition, locator: InputLocator) -> Self {
        Self::new(def.template.clone(), def.keys.clone(), locator)
    }

    pub fn render(&self, params: &ComputedJobParameters) -> Result<String> {
        let located = self.locate(params)?;
        Ok(render(&self.template, &self.keys, &located))
    }

    /// A copy of `params` with every input replaced by its readable path.
    pub fn locate(&self, params: &ComputedJobParameters) -> Result<ComputedJobParameters> {
        let mut located = params.clone();
        if let Some(files) = &mut located.primary_inputs {
            *files = self.locator.format_all(files)?;
        }
        for files in located.aux_inputs.values_mut() {
            *files = self.locator.format_all(files)?;
        }
        Ok(located)
    }
}

fn render(template: &Template, keys: &ConfigKeys, params: &ComputedJobParameters) -> String {
    let mut out = String::from(template.text());
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    // Writing into a String cannot fail.
    let _ = writeln!(out, "# Code added by prodforge for job {}:", params.job_index);

    // Jobs reading primary inputs take run and subrun from those inputs.
    if params.primary_inputs.is_none() {
        line(&mut out, &keys.first_run, params.sequencer.run);
        line(&mut out, &keys.first_subrun, params.sequencer.subrun);
    }
    line(&mut out, &keys.max_events, params.events);
    line(&mut out, &keys.seed, params.seed);

    if let Some(files) = &params.primary_inputs {
        line(&mut out, &keys.primary_inputs, list(files));
    }
    for (role, files) in &params.aux_inputs {
        line(&mut out, role, list(files));
    }

    if let Some(skip) = &params.skip {
        line(&mut out, &keys.files_to_skip, skip.files_to_skip);
        line(&mut out, &keys.max_events_to_skip, skip.max_events_to_skip);
    }
    for (key, bound) in &params.aux_skip {
        line(&mut out, key, bound);
    }

    for (key, name) in &params.outputs {
        line(&mut out, key, quote(name));
    }
    out
}

/// Render a template for the job reading `input`.
///
/// Every `<key>.fileName: "<pattern>"` line whose pattern holds a
/// `{placeholder}` is filled from the input's `owner`, `desc`, `dsconf`
/// and `sequencer` fields; `overrides` replace or add placeholder values.
/// `source.fileNames` is set to the input as given.
pub fn render_for_input(
    template: &Template,
    input: &str,
    overrides: &BTreeMap<String, String>,
) -> Result<String> {
    let basename = input.rsplit('/').next().unwrap_or(input);
    let file = DataFilename::parse(basename)?;
    let mut vars = BTreeMap::from([
        ("owner".to_string(), file.owner),
        ("desc".to_string(), file.description),
        ("dsconf".to_string(), file.dsconf),
        ("sequencer".to_string(), file.sequencer),
    ]);
    vars.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut out = String::from(template.text());
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    let _ = writeln!(out, "# Code added by prodforge for input {basename}:");
    line(&mut out, "source.fileNames", list(&[input.to_string()]));
    for (key, pattern) in output_patterns(template.text()) {
        let name = fill(key, pattern, &vars)?;
        line(&mut out, key, quote(&name));
    }
    Ok(out)
}

/// `(key, pattern)` for each quoted `*.fileName` value holding a placeholder.
fn output_patterns(text: &str) -> Vec<(&str, &str)> {
    text.lines()
        .filter_map(|l| {
            let (key, value) = l.trim().split_once(':')?;
            let key = key.trim();
            let pattern = value.trim().strip_prefix('"')?.strip_suffix('"')?;
            (key.ends_with(".fileName") && !key.contains(char::is_whitespace) && pattern.contains('{'))
                .then_some((key, pattern))
        })
        .collect()
}

fn fill(key: &str, pattern: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let problem = |reason: String| Error::TemplateFill {
        key: key.to_string(),
        reason,
    };
    let mut out = String::new();
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| problem(format!("unclosed '{{' in \"{pattern}\"")))?;
        let name = &after[..close];
        let value = vars
            .get(name)
            .ok_or_else(|| problem(format!("no value for {{{name}}}")))?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn line(out: &mut String, key: &str, value: impl std::fmt::Display) {
    if !key.is_empty() {
        let _ = writeln!(out, "{key}: {value}");
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

/// `[ "a", "b" ]`, or `[ ]` when empty.
fn list(files: &[String]) -> String {
    if files.is_empty() {
        return "[ ]".into();
    }
    let quoted: Vec<String> = files.iter().map(|f| quote(f)).collect();
    format!("[ {} ]", quoted.join(", "))
}
