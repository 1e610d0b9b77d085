//! Cache-key digest selection.
//!
//! # Responsibilities
//! - Enumerate the digest algorithms compiled into this binary
//! - Benchmark them once and memoize the fastest
//! - Honor an explicitly pinned algorithm without benchmarking
//!
//! # Design Decisions
//! - Selection is exactly-once per selector (`OnceLock`); concurrent first
//!   callers block on the running benchmark and then share its result
//! - The benchmark is CPU-bound; async callers run it on the blocking pool
//! - No usable result falls back to SHA-256

use std::collections::HashMap;
use std::fmt;
use std::hint::black_box;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};

use crate::observability::metrics;

/// Digest algorithm used to hash request bodies into cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Blake3,
    Blake2b,
    Blake2s,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Candidates in preference order.
    pub const CANDIDATES: [HashAlgorithm; 5] = [
        HashAlgorithm::Blake3,
        HashAlgorithm::Blake2b,
        HashAlgorithm::Blake2s,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
    ];

    /// Conservative default when benchmarking yields nothing.
    pub const FALLBACK: HashAlgorithm = HashAlgorithm::Sha256;

    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Blake3 => "blake3",
            HashAlgorithm::Blake2b => "blake2b",
            HashAlgorithm::Blake2s => "blake2s",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Whether this build carries an implementation of the algorithm.
    pub fn is_available(self) -> bool {
        match self {
            HashAlgorithm::Blake3 => cfg!(feature = "blake3"),
            HashAlgorithm::Blake2b | HashAlgorithm::Blake2s => cfg!(feature = "blake2"),
            HashAlgorithm::Sha256 | HashAlgorithm::Sha512 => true,
        }
    }

    /// Candidates available in this build, in preference order.
    pub fn available() -> impl Iterator<Item = HashAlgorithm> {
        Self::CANDIDATES.into_iter().filter(|alg| alg.is_available())
    }

    /// Hex-encoded digest of `data`.
    pub fn hex_digest(self, data: &[u8]) -> String {
        match self {
            #[cfg(feature = "blake3")]
            HashAlgorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
            #[cfg(feature = "blake2")]
            HashAlgorithm::Blake2b => hex::encode(blake2::Blake2b512::digest(data)),
            #[cfg(feature = "blake2")]
            HashAlgorithm::Blake2s => hex::encode(blake2::Blake2s256::digest(data)),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
            // Unavailable candidates are never selected; SHA-256 covers them.
            #[allow(unreachable_patterns)]
            _ => hex::encode(Sha256::digest(data)),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for an unknown or unavailable algorithm name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown or unavailable hash algorithm '{0}'")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for HashAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        HashAlgorithm::CANDIDATES
            .into_iter()
            .find(|alg| alg.name() == wanted && alg.is_available())
            .ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}

/// How the selector decides on an algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashPolicy {
    /// Benchmark the available candidates on first use.
    Auto,
    /// Use this algorithm, no benchmark.
    Pinned(HashAlgorithm),
}

impl FromStr for HashPolicy {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(HashPolicy::Auto)
        } else {
            s.parse().map(HashPolicy::Pinned)
        }
    }
}

/// Benchmark parameters.
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkParams {
    /// Size of the random block hashed per iteration.
    pub data_size: usize,
    /// Hashes per timed run.
    pub iterations: u32,
    /// Timed runs per candidate; the fastest one counts.
    pub repeat: u32,
    /// Untimed hashes before measuring.
    pub warmup_rounds: u32,
}

impl Default for BenchmarkParams {
    fn default() -> Self {
        Self {
            data_size: 1024 * 1024,
            iterations: 256,
            repeat: 5,
            warmup_rounds: 8,
        }
    }
}

/// Measure throughput (MiB/s) of every available candidate.
pub fn measure_hash_speed(params: &BenchmarkParams) -> HashMap<HashAlgorithm, f64> {
    let mut data = vec![0u8; params.data_size];
    rand::thread_rng().fill_bytes(&mut data);

    let mut results = HashMap::new();
    for alg in HashAlgorithm::available() {
        tracing::debug!(algorithm = %alg, "Measuring hash speed");

        for _ in 0..params.warmup_rounds {
            black_box(alg.hex_digest(black_box(&data)));
        }

        let best = (0..params.repeat.max(1))
            .map(|_| {
                let start = Instant::now();
                for _ in 0..params.iterations {
                    black_box(alg.hex_digest(black_box(&data)));
                }
                start.elapsed()
            })
            .min()
            .unwrap_or(Duration::ZERO);

        let total_mib = (params.data_size as f64 * f64::from(params.iterations)) / (1024.0 * 1024.0);
        let secs = best.as_secs_f64();
        let mib_per_sec = if secs > 0.0 { total_mib / secs } else { 0.0 };

        tracing::debug!(algorithm = %alg, mib_per_sec, "Measured hash speed");
        metrics::record_hash_throughput(alg.name(), mib_per_sec);
        results.insert(alg, mib_per_sec);
    }
    results
}

/// Pick the highest-throughput entry; ties go to the earlier candidate.
pub fn fastest(speeds: &HashMap<HashAlgorithm, f64>) -> Option<HashAlgorithm> {
    let mut best: Option<(HashAlgorithm, f64)> = None;
    for alg in HashAlgorithm::CANDIDATES {
        if let Some(&speed) = speeds.get(&alg) {
            if best.map_or(true, |(_, best_speed)| speed > best_speed) {
                best = Some((alg, speed));
            }
        }
    }
    best.map(|(alg, _)| alg)
}

/// Shared, lazily initialized choice of cache-key digest.
#[derive(Debug)]
pub struct HashSelector {
    policy: HashPolicy,
    params: BenchmarkParams,
    selected: OnceLock<HashAlgorithm>,
    #[cfg(test)]
    benchmark_runs: std::sync::atomic::AtomicUsize,
}

impl HashSelector {
    /// Create a selector; a pinned policy is resolved immediately.
    pub fn new(policy: HashPolicy) -> Self {
        Self::with_params(policy, BenchmarkParams::default())
    }

    /// Create a selector with custom benchmark parameters.
    pub fn with_params(policy: HashPolicy, params: BenchmarkParams) -> Self {
        let selected = OnceLock::new();
        if let HashPolicy::Pinned(alg) = policy {
            let _ = selected.set(alg);
        }
        Self {
            policy,
            params,
            selected,
            #[cfg(test)]
            benchmark_runs: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> HashPolicy {
        self.policy
    }

    /// The memoized algorithm, if selection has completed.
    pub fn get(&self) -> Option<HashAlgorithm> {
        self.selected.get().copied()
    }

    /// Return the selected algorithm, benchmarking on first call.
    ///
    /// Blocks the calling thread while the benchmark runs.
    pub fn select(&self) -> HashAlgorithm {
        *self.selected.get_or_init(|| {
            tracing::info!("Cache key hash algorithm auto-selection...");
            #[cfg(test)]
            self.benchmark_runs
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let speeds = measure_hash_speed(&self.params);
            match fastest(&speeds) {
                Some(alg) => alg,
                None => {
                    tracing::warn!(fallback = %HashAlgorithm::FALLBACK, "No hash benchmark results, using fallback");
                    HashAlgorithm::FALLBACK
                }
            }
        })
    }
}
