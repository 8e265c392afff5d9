//! Counter-based random context
//!
//! A `RandomContext` never advances a cursor. The k-th sample of a
//! distribution is a pure function of (seed, engine, distribution identity, k),
//! so any process can compute any slice of a logical sample sequence without
//! coordinating with the others and still agree bit-for-bit with a single
//! sequential generation.
//!
//! ChaCha engines key the cipher from the seed, select the stream from the
//! distribution identity and jump to word `k * 256` of that stream. A single
//! draw may consume up to 256 words before it would read into the next
//! sample's block. The xxh3 engine hashes (stream, index, word) under the seed.

use crate::config::SketchConfig;
use crate::distribution::{DistributionSpec, SketchDistribution};
use crate::error::{Result, SketchError};
use rand::{RngCore, SeedableRng};
use rand_chacha::{ChaCha8Rng, ChaCha20Rng};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3;

const WORDS_PER_SAMPLE_LOG2: u32 = 8;

/// Samples addressable per distribution stream. ChaCha block counters are
/// 64-bit, i.e. 2^68 words, and each sample owns 2^8 of them.
pub const MAX_SAMPLES: u64 = 1 << 60;

/// Sampling engine backing a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Engine {
    #[default]
    #[serde(rename = "chacha20")]
    ChaCha20,
    #[serde(rename = "chacha8")]
    ChaCha8,
    #[serde(rename = "xxh3")]
    Xxh3,
}

impl Engine {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChaCha20 => "chacha20",
            Self::ChaCha8 => "chacha8",
            Self::Xxh3 => "xxh3",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "chacha20" => Some(Self::ChaCha20),
            "chacha8" => Some(Self::ChaCha8),
            "xxh3" => Some(Self::Xxh3),
            _ => None,
        }
    }
}

/// Reproducible source of randomness for sketches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RandomContext {
    seed: u64,
    engine: Engine,
}

impl RandomContext {
    pub fn new(seed: u64) -> Self {
        Self::with_engine(seed, Engine::default())
    }

    pub fn with_engine(seed: u64, engine: Engine) -> Self {
        Self { seed, engine }
    }

    pub fn from_config(seed: u64, config: &SketchConfig) -> Self {
        Self::with_engine(seed, config.engine)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// An independent context for a sibling sketch. `self` is left untouched;
    /// equal salts always yield the same derived context.
    pub fn derive(&self, salt: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.seed.to_le_bytes());
        bytes[8..].copy_from_slice(&salt.to_le_bytes());
        Self {
            seed: xxh3::xxh3_64_with_seed(&bytes, self.seed),
            engine: self.engine,
        }
    }

    /// The sample at global position `index` of `dist`'s sequence.
    pub fn sample<D: SketchDistribution>(&self, index: u64, dist: &D) -> D::Value {
        self.sampler(dist.identity()).at(index, dist)
    }

    /// `count` consecutive samples starting at global position `offset`.
    pub fn generate<D: SketchDistribution>(
        &self,
        offset: u64,
        count: i64,
        dist: &D,
    ) -> Result<Vec<D::Value>> {
        let count = checked_count(offset, count)?;
        let mut out = Vec::new();
        out.try_reserve_exact(count as usize)
            .map_err(|_| SketchError::InvalidCount(count as i64))?;
        let sampler = self.sampler(dist.identity());
        out.extend((offset..offset + count).map(|i| sampler.at(i, dist)));
        Ok(out)
    }

    /// Samples at arbitrary global positions, in the order given.
    pub fn generate_at<D, I>(&self, indices: I, dist: &D) -> Result<Vec<D::Value>>
    where
        D: SketchDistribution,
        I: IntoIterator<Item = u64>,
    {
        let sampler = self.sampler(dist.identity());
        indices
            .into_iter()
            .map(|i| {
                if i >= MAX_SAMPLES {
                    Err(SketchError::InvalidCount(i as i64))
                } else {
                    Ok(sampler.at(i, dist))
                }
            })
            .collect()
    }

    /// Coordinate indices from a runtime distribution description.
    pub fn generate_indices(
        &self,
        offset: u64,
        count: i64,
        spec: &DistributionSpec,
    ) -> Result<Vec<usize>> {
        let dist = spec.realize_index()?;
        self.generate(offset, count, &dist)
    }

    /// Real values from a runtime distribution description.
    pub fn generate_values(
        &self,
        offset: u64,
        count: i64,
        spec: &DistributionSpec,
    ) -> Result<Vec<f64>> {
        let dist = spec.realize_value()?;
        self.generate(offset, count, &dist)
    }

    fn sampler(&self, stream: u64) -> Sampler {
        match self.engine {
            Engine::ChaCha20 => {
                let mut rng = ChaCha20Rng::seed_from_u64(self.seed);
                rng.set_stream(stream);
                Sampler::ChaCha20(rng)
            }
            Engine::ChaCha8 => {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
                rng.set_stream(stream);
                Sampler::ChaCha8(rng)
            }
            Engine::Xxh3 => Sampler::Xxh3 {
                seed: self.seed,
                stream,
            },
        }
    }
}

fn checked_count(offset: u64, count: i64) -> Result<u64> {
    if count < 0 {
        return Err(SketchError::InvalidCount(count));
    }
    let count = count as u64;
    match offset.checked_add(count) {
        Some(end) if end <= MAX_SAMPLES => Ok(count),
        _ => Err(SketchError::InvalidCount(count as i64)),
    }
}

/// Keyed, stream-selected engine positioned per sample
enum Sampler {
    ChaCha20(ChaCha20Rng),
    ChaCha8(ChaCha8Rng),
    Xxh3 { seed: u64, stream: u64 },
}

impl Sampler {
    fn at<D: SketchDistribution>(&self, index: u64, dist: &D) -> D::Value {
        let word_pos = (index as u128) << WORDS_PER_SAMPLE_LOG2;
        match self {
            Self::ChaCha20(base) => {
                let mut rng = base.clone();
                rng.set_word_pos(word_pos);
                dist.draw(&mut rng)
            }
            Self::ChaCha8(base) => {
                let mut rng = base.clone();
                rng.set_word_pos(word_pos);
                dist.draw(&mut rng)
            }
            Self::Xxh3 { seed, stream } => {
                let mut rng = CounterHashRng {
                    seed: *seed,
                    stream: *stream,
                    index,
                    word: 0,
                };
                dist.draw(&mut rng)
            }
        }
    }
}

/// Stateless-by-construction generator: word w of sample k is
/// `xxh3(stream || k || w)` seeded with the context seed.
struct CounterHashRng {
    seed: u64,
    stream: u64,
    index: u64,
    word: u64,
}

impl RngCore for CounterHashRng {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let mut block = [0u8; 24];
        block[..8].copy_from_slice(&self.stream.to_le_bytes());
        block[8..16].copy_from_slice(&self.index.to_le_bytes());
        block[16..].copy_from_slice(&self.word.to_le_bytes());
        self.word = self.word.wrapping_add(1);
        xxh3::xxh3_64_with_seed(&block, self.seed)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}
