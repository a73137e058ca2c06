//! Error types for the prodforge engine.
//!
//! Uses `thiserror` for ergonomic error definitions. Every variant carries
//! the role name, job index or raw filename needed to diagnose the failure
//! without re-running the resolution.

use std::fmt;

use thiserror::Error;

/// The top-level error type for all resolution operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // --- Selection ---
    #[error("catalog for role '{role}' is empty but {requested} file(s) were requested")]
    EmptyCatalog { role: String, requested: usize },

    // --- Merge / skip arithmetic ---
    #[error("invalid rate: {what} must be non-zero")]
    InvalidRate { what: String },

    // --- Sequencer codec ---
    #[error("malformed sequencer '{raw}': {reason}")]
    SequencerParse { raw: String, reason: String },

    // --- Resolution ---
    #[error("job index {index} out of range (njobs = {njobs})")]
    IndexRange { index: u64, njobs: u64 },

    #[error("cannot parse target '{target}': {reason}")]
    TargetParse { target: String, reason: String },

    #[error("target '{target}' was not produced by this definition: {reason}")]
    TargetMismatch { target: String, reason: String },

    // --- Descriptor ---
    #[error("job definition is invalid: {}", FieldErrors(.0))]
    DescriptorValidation(Vec<FieldError>),

    // --- Filenames and locations ---
    #[error("malformed data filename '{name}': {reason}")]
    Filename { name: String, reason: String },

    #[error("cannot locate '{file}': {reason}")]
    Location { file: String, reason: String },

    // --- Template mode ---
    #[error("cannot fill template key '{key}': {reason}")]
    TemplateFill { key: String, reason: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// A single field-level problem found while validating a job definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub problem: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: problem.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

struct FieldErrors<'a>(&'a [FieldError]);

impl fmt::Display for FieldErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl Error {
    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::EmptyCatalog { .. } => "empty_catalog",
            Error::InvalidRate { .. } => "invalid_rate",
            Error::SequencerParse { .. } => "sequencer_parse",
            Error::IndexRange { .. } => "index_range",
            Error::TargetParse { .. } => "target_parse",
            Error::TargetMismatch { .. } => "target_mismatch",
            Error::DescriptorValidation(_) => "descriptor_validation",
            Error::Filename { .. } => "filename",
            Error::Location { .. } => "location",
            Error::TemplateFill { .. } => "template_fill",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_range_displays_context() {
        let err = Error::IndexRange {
            index: 10,
            njobs: 10,
        };
        assert!(err.to_string().contains("10"));
        assert_eq!(err.kind(), "index_range");
    }

    #[test]
    fn validation_lists_every_field() {
        let err = Error::DescriptorValidation(vec![
            FieldError::new("njobs", "must be positive"),
            FieldError::new("aux.mubeam", "no catalog supplied"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("njobs: must be positive"));
        assert!(msg.contains("aux.mubeam: no catalog supplied"));
    }

    #[test]
    fn empty_catalog_names_role() {
        let err = Error::EmptyCatalog {
            role: "physics.filters.MuBeamFlashMixer.fileNames".into(),
            requested: 2,
        };
        assert!(err.to_string().contains("MuBeamFlashMixer"));
    }
}
