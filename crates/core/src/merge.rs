//! Merge and skip arithmetic for resampling jobs.
//!
//! Resampling jobs read one flat stream of events spread over many input
//! files. Job `i` skips the whole files consumed by jobs `0..i` so that
//! consecutive jobs see disjoint, contiguous event ranges. Per-file event
//! counts are assumed uniform.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Skip hints handed to the resampling module of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipPlan {
    pub files_to_skip: u64,
    pub max_events_to_skip: u64,
}

/// `floor(job_index * events_per_job / events_per_input_file)` whole files,
/// with `events_per_input_file - 1` as the in-file skip bound.
pub fn compute_skip(
    events_per_job: u64,
    events_per_input_file: u64,
    job_index: u64,
) -> Result<SkipPlan> {
    compute_skip_with(events_per_job, events_per_input_file, job_index, None)
}

/// Like [`compute_skip`], with an optional configured `max_events_to_skip`.
pub fn compute_skip_with(
    events_per_job: u64,
    events_per_input_file: u64,
    job_index: u64,
    max_events_override: Option<u64>,
) -> Result<SkipPlan> {
    if events_per_input_file == 0 {
        return Err(Error::InvalidRate {
            what: "events_per_input_file".into(),
        });
    }
    let consumed = u128::from(job_index) * u128::from(events_per_job);
    let files = consumed / u128::from(events_per_input_file);
    Ok(SkipPlan {
        files_to_skip: u64::try_from(files).unwrap_or(u64::MAX),
        max_events_to_skip: max_events_override.unwrap_or(events_per_input_file - 1),
    })
}

/// Mean events per file of a dataset holding `nevents` in `nfiles`.
pub fn events_per_file(nfiles: u64, nevents: u64) -> Result<u64> {
    if nfiles == 0 {
        return Err(Error::InvalidRate {
            what: "nfiles".into(),
        });
    }
    Ok(nevents / nfiles)
}

/// Number of input files a job must read to collect `merge_events` events.
///
/// One file more than the integer quotient, so a job never runs short when
/// the requested events do not divide evenly.
pub fn merge_factor(merge_events: u64, nfiles: u64, nevents: u64) -> Result<u64> {
    let per_file = events_per_file(nfiles, nevents)?;
    if per_file == 0 {
        return Err(Error::InvalidRate {
            what: "events per file".into(),
        });
    }
    Ok(merge_events / per_file + 1)
}

/// Primary input files consumed `merge_factor` at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryInputs {
    pub files: Vec<String>,
    #[serde(default = "default_merge_factor")]
    pub merge_factor: u64,
}

fn default_merge_factor() -> u64 {
    1
}

impl PrimaryInputs {
    pub fn new(files: Vec<String>, merge_factor: u64) -> Self {
        Self {
            files,
            merge_factor,
        }
    }

    /// Jobs needed to cover every file once.
    pub fn njobs(&self) -> u64 {
        if self.merge_factor == 0 {
            return 0;
        }
        (self.files.len() as u64).div_ceil(self.merge_factor)
    }

    /// The contiguous window of files read by `job_index`. The last job may
    /// receive fewer than `merge_factor` files.
    pub fn slice(&self, job_index: u64) -> Result<&[String]> {
        let njobs = self.njobs();
        if job_index >= njobs {
            return Err(Error::IndexRange {
                index: job_index,
                njobs,
            });
        }
        let start = (job_index * self.merge_factor) as usize;
        let end = (start + self.merge_factor as usize).min(self.files.len());
        Ok(&self.files[start..end])
    }
}
