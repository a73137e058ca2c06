//! Reverse resolution: output filename to job parameters.
//!
//! A target is decoded to a job index and then resolved forward again. The
//! re-rendered output must equal the target exactly, so both directions
//! always agree.

use tracing::debug;

use crate::definition::JobDefinition;
use crate::error::{Error, Result};
use crate::filename::DataFilename;
use crate::resolver::{ComputedJobParameters, resolve};
use crate::sequencer::Sequencer;

/// Recover the parameters of the job that produces `target`.
pub fn resolve_target(def: &JobDefinition, target: &str) -> Result<ComputedJobParameters> {
    let Some((stream, raw_seq)) = def.match_output(target) else {
        return Err(unmatched(def, target));
    };

    let seq = Sequencer::parse(raw_seq).map_err(|e| Error::TargetParse {
        target: target.to_string(),
        reason: e.to_string(),
    })?;

    let job_index = def
        .codec()
        .decode_sequencer(seq)
        .map_err(|e| Error::TargetMismatch {
            target: target.to_string(),
            reason: e.to_string(),
        })?;
    debug!(filename = %target, job_index, key = %stream.key, "decoded target");

    let params = resolve(def, job_index)?;

    match params.output(&stream.key) {
        Some(rendered) if rendered == target => Ok(params),
        Some(rendered) => Err(Error::TargetMismatch {
            target: target.to_string(),
            reason: format!("job {job_index} would write '{rendered}'"),
        }),
        None => Err(Error::TargetMismatch {
            target: target.to_string(),
            reason: format!("job {job_index} has no output '{}'", stream.key),
        }),
    }
}

/// Classify a target that fits none of the output patterns. A well-formed
/// data filename belongs to some other dataset; anything else is garbage.
fn unmatched(def: &JobDefinition, target: &str) -> Error {
    match DataFilename::parse(target).and_then(|f| f.sequencer()) {
        Ok(_) => Error::TargetMismatch {
            target: target.to_string(),
            reason: format!("no output of '{}' names this dataset", def.name),
        },
        Err(e) => Error::TargetParse {
            target: target.to_string(),
            reason: e.to_string(),
        },
    }
}
