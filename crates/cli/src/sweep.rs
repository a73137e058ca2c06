//! Parallel sweeps over every job of a definition.
//!
//! `0..njobs` is cut into chunks; each chunk is resolved on a blocking
//! worker against a shared `Arc<JobDefinition>`. Workers share nothing
//! mutable and their partial results are merged after join.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

use prodforge_core::{JobDefinition, Resolver};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct SweepOptions {
    pub workers: usize,
    pub chunk_size: u64,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            chunk_size: 4096,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    Resolve(#[from] prodforge_core::Error),

    #[error("sweep worker failed: {0}")]
    Worker(String),
}

/// Run `work` over every chunk of `0..def.njobs` and return the partial
/// results in chunk order.
async fn sweep<T, F>(def: Arc<JobDefinition>, opts: SweepOptions, work: F) -> Result<Vec<T>, SweepError>
where
    T: Send + 'static,
    F: Fn(&JobDefinition, Range<u64>) -> Result<T, prodforge_core::Error> + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let permits = Arc::new(Semaphore::new(opts.workers.max(1)));
    let chunk = opts.chunk_size.max(1);
    let mut tasks = JoinSet::new();

    let mut start = 0u64;
    let mut chunk_no = 0usize;
    while start < def.njobs {
        let end = start.saturating_add(chunk).min(def.njobs);
        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SweepError::Worker(e.to_string()))?;
        let def = def.clone();
        let work = work.clone();
        let n = chunk_no;
        tasks.spawn_blocking(move || {
            let _permit = permit;
            work(&def, start..end).map(|out| (n, out))
        });
        start = end;
        chunk_no += 1;
    }
    debug!(chunks = chunk_no, workers = opts.workers, "sweep dispatched");

    let mut parts = Vec::with_capacity(chunk_no);
    while let Some(joined) = tasks.join_next().await {
        let part = joined.map_err(|e| SweepError::Worker(e.to_string()))??;
        parts.push(part);
    }
    parts.sort_by_key(|(n, _)| *n);
    Ok(parts.into_iter().map(|(_, out)| out).collect())
}

/// How often the files of one auxiliary role are used across a sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleUsage {
    pub files: usize,
    pub picks: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub unused: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub njobs: u64,
    pub roles: BTreeMap<String, RoleUsage>,
}

/// Count auxiliary file usage over every job.
pub async fn usage_report(def: Arc<JobDefinition>, opts: SweepOptions) -> Result<UsageReport, SweepError> {
    let parts = sweep(def.clone(), opts, |def, range| {
        let mut counts: HashMap<String, HashMap<String, u64>> = HashMap::new();
        for params in Resolver::range(def, range) {
            for (role, files) in params?.aux_inputs {
                let role_counts = counts.entry(role).or_default();
                for f in files {
                    *role_counts.entry(f).or_default() += 1;
                }
            }
        }
        Ok(counts)
    })
    .await?;

    let mut merged: HashMap<String, HashMap<String, u64>> = HashMap::new();
    for part in parts {
        for (role, counts) in part {
            let into = merged.entry(role).or_default();
            for (file, n) in counts {
                *into.entry(file).or_default() += n;
            }
        }
    }

    let roles = def
        .aux
        .iter()
        .map(|(role, catalog)| {
            let counts = merged.remove(role).unwrap_or_default();
            let per_file: Vec<u64> = catalog
                .files
                .iter()
                .map(|f| counts.get(f).copied().unwrap_or(0))
                .collect();
            let picks = per_file.iter().sum::<u64>();
            let usage = RoleUsage {
                files: per_file.len(),
                picks,
                min: per_file.iter().copied().min().unwrap_or(0),
                max: per_file.iter().copied().max().unwrap_or(0),
                mean: if per_file.is_empty() {
                    0.0
                } else {
                    picks as f64 / per_file.len() as f64
                },
                unused: per_file.iter().filter(|&&n| n == 0).count(),
            };
            (role.clone(), usage)
        })
        .collect();

    Ok(UsageReport {
        njobs: def.njobs,
        roles,
    })
}

/// Jobs whose output under `key` is not in `present`, as `(index, filename)`
/// in index order.
pub async fn missing_outputs(
    def: Arc<JobDefinition>,
    key: String,
    present: HashSet<String>,
    opts: SweepOptions,
) -> Result<Vec<(u64, String)>, SweepError> {
    let present = Arc::new(present);
    let parts = sweep(def, opts, move |def, range| {
        let mut missing = Vec::new();
        for params in Resolver::range(def, range) {
            let params = params?;
            if let Some(name) = params.outputs.get(&key) {
                if !present.contains(name) {
                    missing.push((params.job_index, name.clone()));
                }
            }
        }
        Ok(missing)
    })
    .await?;
    Ok(parts.into_iter().flatten().collect())
}
