//! Auxiliary catalog selection.
//!
//! Two strategies pick the auxiliary files a job consumes:
//!
//! - **Sequential**: job `i` starts at `(i * count) mod total` and walks
//!   forward, wrapping around the end of the catalog.
//! - **Pseudo-random** (scheme `v2`): a keyed SHA-256 permutation of the
//!   catalog per `(role, epoch)`. Within an epoch each file is handed out at
//!   most once, so usage stays balanced while the order looks random.
//!
//! Both are pure functions of their arguments. There is no cursor state.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Version tag mixed into every pseudo-random draw.
pub const SELECTION_SCHEME: &str = "prodforge-select-v2";

/// The files available for one auxiliary role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxiliaryCatalog {
    /// Ordered file identifiers.
    pub files: Vec<String>,
    /// Files each job needs from this catalog.
    pub per_job: usize,
    /// In-file skip bound handed to the mixer reading this role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_events_to_skip: Option<u64>,
}

impl AuxiliaryCatalog {
    pub fn new(files: Vec<String>, per_job: usize) -> Self {
        Self {
            files,
            per_job,
            max_events_to_skip: None,
        }
    }

    pub fn with_max_events_to_skip(mut self, max_events_to_skip: u64) -> Self {
        self.max_events_to_skip = Some(max_events_to_skip);
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// How auxiliary files are chosen for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionMode {
    Sequential,
    #[default]
    #[serde(alias = "random", alias = "pseudo_random")]
    PseudoRandom,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Sequential => "sequential",
            SelectionMode::PseudoRandom => "pseudo-random",
        }
    }
}

/// Select `count` files from `catalog` for `job_index`.
///
/// `role` keys the pseudo-random permutation; sequential selection ignores it.
pub fn select(
    catalog: &AuxiliaryCatalog,
    mode: SelectionMode,
    role: &str,
    job_index: u64,
    count: usize,
) -> Result<Vec<String>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if catalog.is_empty() {
        return Err(Error::EmptyCatalog {
            role: role.to_string(),
            requested: count,
        });
    }

    let positions = match mode {
        SelectionMode::Sequential => sequential_positions(catalog.len(), job_index, count),
        SelectionMode::PseudoRandom => random_positions(catalog.len(), role, job_index, count),
    };
    Ok(positions
        .into_iter()
        .map(|p| catalog.files[p].clone())
        .collect())
}

/// Positions `(job_index * count) mod total ..` with rollover.
pub fn sequential_positions(total: usize, job_index: u64, count: usize) -> Vec<usize> {
    let total_u = total as u128;
    let start = (u128::from(job_index) * count as u128 % total_u) as usize;
    (0..count).map(|k| (start + k) % total).collect()
}

/// Positions chosen by the keyed permutation scheme.
pub fn random_positions(total: usize, role: &str, job_index: u64, count: usize) -> Vec<usize> {
    if count <= total {
        let jobs_per_epoch = (total / count) as u64;
        let epoch = job_index / jobs_per_epoch;
        let slot = (job_index % jobs_per_epoch) as usize;
        let perm = KeyedPermutation::new(total, role, epoch.to_string());
        let first = slot * count;
        return (first..first + count).map(|p| perm.at(p)).collect();
    }

    // More files than the catalog holds: concatenate whole permutations.
    let mut out = Vec::with_capacity(count);
    let mut round = 0u64;
    while out.len() < count {
        let perm = KeyedPermutation::new(total, role, format!("{job_index}/{round}"));
        let take = (count - out.len()).min(total);
        out.extend((0..take).map(|p| perm.at(p)));
        round += 1;
    }
    out
}

const FEISTEL_ROUNDS: u64 = 4;

/// Keyed bijection on `0..total`.
///
/// A balanced Feistel network over the smallest even bit width covering
/// `total`, restricted to `0..total` by cycle walking. Evaluating one
/// position is independent of every other position.
struct KeyedPermutation<'a> {
    total: u64,
    half_bits: u32,
    role: &'a str,
    key: String,
}

impl<'a> KeyedPermutation<'a> {
    fn new(total: usize, role: &'a str, key: String) -> Self {
        let total = total as u64;
        let bits = (u64::BITS - total.saturating_sub(1).leading_zeros()).max(2);
        Self {
            total,
            half_bits: bits.div_ceil(2),
            role,
            key,
        }
    }

    fn at(&self, position: usize) -> usize {
        // The domain holds at most 4 * total values, so walks are short.
        let mut x = self.feistel(position as u64);
        while x >= self.total {
            x = self.feistel(x);
        }
        x as usize
    }

    fn feistel(&self, x: u64) -> u64 {
        let mask = (1u64 << self.half_bits) - 1;
        let mut left = x >> self.half_bits;
        let mut right = x & mask;
        for round in 0..FEISTEL_ROUNDS {
            let f = draw(self.role, &self.key, round, right) & mask;
            (left, right) = (right, left ^ f);
        }
        (left << self.half_bits) | right
    }
}

/// One 64-bit round value: the first eight digest bytes of
/// `SHA-256("{scheme}:{role}:{key}:{round}:{input}")`, big-endian.
fn draw(role: &str, key: &str, round: u64, input: u64) -> u64 {
    let digest =
        Sha256::digest(format!("{SELECTION_SCHEME}:{role}:{key}:{round}:{input}").as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn catalog(n: usize, per_job: usize) -> AuxiliaryCatalog {
        AuxiliaryCatalog::new((0..n).map(|i| format!("aux_{i:02}.art")).collect(), per_job)
    }

    #[test]
    fn sequential_rollover_walks_catalog() {
        let cat = catalog(3, 1);
        let picks: Vec<Vec<String>> = (0..5)
            .map(|i| select(&cat, SelectionMode::Sequential, "r", i, 1).unwrap())
            .collect();
        let expected: Vec<Vec<String>> = [0, 1, 2, 0, 1]
            .iter()
            .map(|&p| vec![cat.files[p].clone()])
            .collect();
        assert_eq!(picks, expected);
    }

    #[test]
    fn sequential_slices_and_wraps() {
        let cat = catalog(6, 2);
        assert_eq!(
            select(&cat, SelectionMode::Sequential, "r", 1, 2).unwrap(),
            cat.files[2..4].to_vec()
        );
        let small = catalog(4, 2);
        assert_eq!(
            select(&small, SelectionMode::Sequential, "r", 2, 2).unwrap(),
            small.files[0..2].to_vec()
        );
        // Walking past the end wraps inside a single job.
        assert_eq!(sequential_positions(5, 1, 3), vec![3, 4, 0]);
    }

    #[test]
    fn sequential_allows_more_than_catalog() {
        let cat = catalog(2, 5);
        let picks = select(&cat, SelectionMode::Sequential, "r", 0, 5).unwrap();
        assert_eq!(picks.len(), 5);
        assert_eq!(picks[0], picks[2]);
    }

    #[test]
    fn sequential_usage_is_balanced() {
        let mut counts = vec![0u32; 7];
        for i in 0..100u64 {
            for p in sequential_positions(7, i, 3) {
                counts[p] += 1;
            }
        }
        let min = *counts.iter().min().unwrap();
        let max = *counts.iter().max().unwrap();
        assert!(max - min <= 1, "counts = {counts:?}");
    }

    #[test]
    fn zero_count_is_empty_even_for_empty_catalog() {
        let empty = AuxiliaryCatalog::default();
        assert!(
            select(&empty, SelectionMode::PseudoRandom, "r", 3, 0)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn empty_catalog_is_error() {
        let empty = AuxiliaryCatalog::default();
        let err = select(&empty, SelectionMode::Sequential, "mubeam", 0, 1).unwrap_err();
        assert_eq!(
            err,
            Error::EmptyCatalog {
                role: "mubeam".into(),
                requested: 1
            }
        );
    }

    #[test]
    fn random_is_deterministic() {
        let cat = catalog(10, 3);
        let a = select(&cat, SelectionMode::PseudoRandom, "gen", 0, 3).unwrap();
        let b = select(&cat, SelectionMode::PseudoRandom, "gen", 0, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn random_varies_with_index_and_role() {
        let cat = catalog(10, 3);
        let r0 = select(&cat, SelectionMode::PseudoRandom, "gen", 0, 3).unwrap();
        let r1 = select(&cat, SelectionMode::PseudoRandom, "gen", 1, 3).unwrap();
        assert_ne!(r0, r1);

        let per_role: HashSet<Vec<usize>> = ["a", "b", "c", "d"]
            .iter()
            .map(|role| random_positions(50, role, 0, 5))
            .collect();
        assert!(per_role.len() > 1);
    }

    #[test]
    fn random_picks_distinct_files() {
        let cat = catalog(10, 5);
        for i in 0..50 {
            let picks = select(&cat, SelectionMode::PseudoRandom, "gen", i, 5).unwrap();
            let unique: HashSet<_> = picks.iter().collect();
            assert_eq!(unique.len(), 5, "job {i} picked duplicates: {picks:?}");
        }
        // The whole catalog in one job is a permutation.
        let all = random_positions(10, "gen", 3, 10);
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn random_repeats_deterministically_past_catalog_size() {
        let a = random_positions(3, "gen", 4, 8);
        assert_eq!(a.len(), 8);
        assert_eq!(a, random_positions(3, "gen", 4, 8));
        // Each complete round is itself a permutation.
        let first: HashSet<_> = a[..3].iter().collect();
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn random_usage_is_uniform() {
        let total = 100;
        let mut counts = vec![0u32; total];
        for i in 0..10_000u64 {
            for p in random_positions(total, "physics.filters.MuBeamFlashMixer.fileNames", i, 1) {
                counts[p] += 1;
            }
        }
        for (file, &n) in counts.iter().enumerate() {
            assert!((90..=110).contains(&n), "file {file} used {n} times");
        }
    }

    #[test]
    fn random_usage_bounded_for_multi_file_jobs() {
        let total = 30;
        let njobs = 3000u64;
        let count = 4;
        let mut counts = vec![0u64; total];
        for i in 0..njobs {
            for p in random_positions(total, "gen", i, count) {
                counts[p] += 1;
            }
        }
        // Each file appears at most once per epoch.
        let epochs = njobs.div_ceil((total / count) as u64);
        let expected = njobs * count as u64 / total as u64;
        for &n in &counts {
            assert!(n <= epochs);
            assert!(n * 2 >= expected, "starved file: {n} < {expected}/2");
        }
    }

    #[test]
    fn permutation_is_complete() {
        for total in [1usize, 2, 3, 17, 64, 1000] {
            let perm = KeyedPermutation::new(total, "role", "0".into());
            let values: HashSet<usize> = (0..total).map(|p| perm.at(p)).collect();
            assert_eq!(values, (0..total).collect(), "total = {total}");
        }
    }

    #[test]
    fn late_jobs_in_huge_catalog_are_cheap() {
        let total = 1_000_000;
        let started = std::time::Instant::now();
        for i in (total as u64 - 1000)..total as u64 {
            let picks = random_positions(total, "physics.filters.gen.fileNames", i, 1);
            assert!(picks[0] < total);
        }
        // Settling every earlier position would need ~10^9 digests here.
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn epoch_slots_partition_the_catalog() {
        // 12 files, 3 per job: jobs 0..4 of an epoch cover every file once.
        let mut seen: Vec<usize> = (0..4u64)
            .flat_map(|i| random_positions(12, "gen", i, 3))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn mode_parses_from_config_strings() {
        let m: SelectionMode = serde_json::from_str("\"sequential\"").unwrap();
        assert_eq!(m, SelectionMode::Sequential);
        let m: SelectionMode = serde_json::from_str("\"pseudo-random\"").unwrap();
        assert_eq!(m, SelectionMode::PseudoRandom);
        let m: SelectionMode = serde_json::from_str("\"random\"").unwrap();
        assert_eq!(m, SelectionMode::PseudoRandom);
    }
}
