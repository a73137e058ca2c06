//! Run/subrun sequencer codec and seed derivation.
//!
//! A sequencer is the fixed-width `RRRRRR_SSSSSSSS` token embedded in every
//! output filename. Job indices map onto the subrun field of the base run
//! and roll over into the following run once a run's subrun capacity is
//! exhausted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Width of the run component.
pub const RUN_WIDTH: usize = 6;
/// Width of the subrun component.
pub const SUBRUN_WIDTH: usize = 8;
/// Largest run number representable in six digits.
pub const MAX_RUN: u32 = 999_999;
/// Number of subruns an eight-digit field can hold.
pub const SUBRUN_CAPACITY: u64 = 100_000_000;

/// A decoded `(run, subrun)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sequencer {
    pub run: u32,
    pub subrun: u32,
}

impl Sequencer {
    pub fn new(run: u32, subrun: u32) -> Self {
        Self { run, subrun }
    }

    /// Strictly parse `RRRRRR_SSSSSSSS`.
    pub fn parse(raw: &str) -> Result<Self> {
        let err = |reason: &str| Error::SequencerParse {
            raw: raw.to_string(),
            reason: reason.to_string(),
        };

        let (run, subrun) = raw
            .split_once('_')
            .ok_or_else(|| err("missing '_' separator"))?;
        if run.len() != RUN_WIDTH {
            return Err(err("run field must be exactly 6 digits"));
        }
        if subrun.len() != SUBRUN_WIDTH {
            return Err(err("subrun field must be exactly 8 digits"));
        }
        if !run.bytes().chain(subrun.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(err("fields must be numeric"));
        }

        // Width checks above guarantee both parses fit.
        let run = run.parse::<u32>().map_err(|e| err(&e.to_string()))?;
        let subrun = subrun.parse::<u32>().map_err(|e| err(&e.to_string()))?;
        Ok(Self { run, subrun })
    }
}

impl fmt::Display for Sequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}_{:08}", self.run, self.subrun)
    }
}

impl FromStr for Sequencer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Maps job indices to sequencers for one base run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerCodec {
    pub base_run: u32,
    pub subruns_per_run: u64,
}

impl SequencerCodec {
    /// Codec with the full eight-digit subrun capacity.
    pub fn new(base_run: u32) -> Self {
        Self {
            base_run,
            subruns_per_run: SUBRUN_CAPACITY,
        }
    }

    /// Codec that rolls over into the next run after `subruns_per_run` jobs.
    /// The capacity is clamped to `1..=SUBRUN_CAPACITY`.
    pub fn with_capacity(base_run: u32, subruns_per_run: u64) -> Self {
        Self {
            base_run,
            subruns_per_run: subruns_per_run.clamp(1, SUBRUN_CAPACITY),
        }
    }

    /// Highest run number touched by `njobs` jobs.
    pub fn last_run(&self, njobs: u64) -> u64 {
        let last_index = njobs.saturating_sub(1);
        u64::from(self.base_run) + last_index / self.subruns_per_run
    }

    pub fn encode(&self, job_index: u64) -> Sequencer {
        let run = u64::from(self.base_run) + job_index / self.subruns_per_run;
        let subrun = job_index % self.subruns_per_run;
        Sequencer {
            // Definitions are validated so that every run stays within six digits.
            run: u32::try_from(run).unwrap_or(u32::MAX),
            subrun: subrun as u32,
        }
    }

    /// Exact left inverse of [`encode`](Self::encode).
    pub fn decode_sequencer(&self, seq: Sequencer) -> Result<u64> {
        if seq.run < self.base_run {
            return Err(Error::SequencerParse {
                raw: seq.to_string(),
                reason: format!("run {} precedes base run {}", seq.run, self.base_run),
            });
        }
        if u64::from(seq.subrun) >= self.subruns_per_run {
            return Err(Error::SequencerParse {
                raw: seq.to_string(),
                reason: format!(
                    "subrun {} exceeds {} subruns per run",
                    seq.subrun, self.subruns_per_run
                ),
            });
        }
        let runs = u64::from(seq.run - self.base_run);
        Ok(runs * self.subruns_per_run + u64::from(seq.subrun))
    }

    /// Parse and decode a sequencer string into `(base_run, job_index)`.
    pub fn decode(&self, raw: &str) -> Result<(u32, u64)> {
        let seq = Sequencer::parse(raw)?;
        Ok((self.base_run, self.decode_sequencer(seq)?))
    }
}

/// Encode `(run_number, job_index)` as a single-run sequencer.
///
/// No rollover happens here: a sequencer string alone cannot tell a rolled
/// over index from a later base run, so `job_index` must fit the subrun
/// field. Use [`SequencerCodec`] for definitions spanning several runs.
pub fn encode(run_number: u32, job_index: u64) -> Result<String> {
    if run_number > MAX_RUN {
        return Err(Error::SequencerParse {
            raw: format!("{run_number}_{job_index}"),
            reason: format!("run {run_number} does not fit in {RUN_WIDTH} digits"),
        });
    }
    if job_index >= SUBRUN_CAPACITY {
        return Err(Error::SequencerParse {
            raw: format!("{run_number}_{job_index}"),
            reason: format!("index {job_index} does not fit in {SUBRUN_WIDTH} digits"),
        });
    }
    Ok(Sequencer::new(run_number, job_index as u32).to_string())
}

/// Exact inverse of [`encode`].
pub fn decode(raw: &str) -> Result<(u32, u64)> {
    let seq = Sequencer::parse(raw)?;
    Ok((seq.run, u64::from(seq.subrun)))
}

/// 32-bit deterministic hash of the concatenated `Display` forms of `parts`:
/// the first eight hex digits of their SHA-256 digest.
pub fn hash32(parts: &[&dyn fmt::Display]) -> u32 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.to_string().as_bytes());
    }
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Seed for `(run_number, job_index)`. Depends on nothing else.
pub fn derive_seed(run_number: u32, job_index: u64) -> u32 {
    let seq = SequencerCodec::new(run_number).encode(job_index);
    seed_for(seq)
}

/// Seed for an already-encoded sequencer.
pub fn seed_for(seq: Sequencer) -> u32 {
    hash32(&[&seq])
}
