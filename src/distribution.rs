//! Sampling distributions plugged into sketch parameter generation.
//!
//! Every distribution carries a stable identity derived from its name and
//! parameters. The random context mixes that identity into the sampling
//! stream, so two distributions never share samples even under one seed.

use crate::error::{Result, SketchError};
use rand::Rng;
use rand::distr::Uniform;
use rand_distr::{Cauchy, Distribution, Exp1, Normal};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

/// A distribution the random context can sample from
pub trait SketchDistribution {
    type Value;

    /// Identity of the distribution including its parameters
    fn identity(&self) -> u64;

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::Value;
}

/// Distribution over target coordinates [0, size)
pub trait IndexDistribution: SketchDistribution<Value = usize> + Sized {
    fn with_domain(size: i64) -> Result<Self>;

    fn domain(&self) -> usize;
}

/// Distribution of nonzero scaling factors for a hash sketch family
pub trait ValueDistribution: SketchDistribution<Value = f64> + Clone {
    /// Type tag of the sketch family scaled by this distribution
    fn type_tag(&self) -> &'static str;

    /// Portable description of this distribution
    fn spec(&self) -> DistributionSpec;
}

fn identity_of(name: &str, params: &[u64]) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(name.as_bytes());
    for param in params {
        hasher.update(&param.to_le_bytes());
    }
    hasher.digest()
}

/// Uniform choice of a target coordinate
#[derive(Debug, Clone)]
pub struct UniformIndex {
    size: usize,
    inner: Uniform<usize>,
}

impl UniformIndex {
    pub fn new(size: i64) -> Result<Self> {
        if size <= 0 {
            return Err(SketchError::DistributionDomain(format!(
                "index domain [0, {}) is empty",
                size
            )));
        }
        let size = size as usize;
        let inner = Uniform::new(0, size)
            .map_err(|e| SketchError::DistributionDomain(e.to_string()))?;
        Ok(Self { size, inner })
    }
}

impl SketchDistribution for UniformIndex {
    type Value = usize;

    fn identity(&self) -> u64 {
        identity_of("uniform_index", &[self.size as u64])
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.inner.sample(rng)
    }
}

impl IndexDistribution for UniformIndex {
    fn with_domain(size: i64) -> Result<Self> {
        Self::new(size)
    }

    fn domain(&self) -> usize {
        self.size
    }
}

/// Symmetric +1/-1 with equal probability (CountSketch signs)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rademacher;

impl SketchDistribution for Rademacher {
    type Value = f64;

    fn identity(&self) -> u64 {
        identity_of("rademacher", &[])
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if rng.random::<bool>() { 1.0 } else { -1.0 }
    }
}

impl ValueDistribution for Rademacher {
    fn type_tag(&self) -> &'static str {
        "CWT"
    }

    fn spec(&self) -> DistributionSpec {
        DistributionSpec::Rademacher
    }
}

/// Cauchy scaling factors (Meng-Mahoney transform)
#[derive(Debug, Clone)]
pub struct CauchyScale {
    median: f64,
    scale: f64,
    inner: Cauchy<f64>,
}

impl CauchyScale {
    pub fn new(median: f64, scale: f64) -> Result<Self> {
        if !median.is_finite() || !scale.is_finite() {
            return Err(SketchError::DistributionDomain(format!(
                "cauchy({}, {}): parameters must be finite",
                median, scale
            )));
        }
        let inner = Cauchy::new(median, scale).map_err(|e| {
            SketchError::DistributionDomain(format!("cauchy({}, {}): {}", median, scale, e))
        })?;
        Ok(Self {
            median,
            scale,
            inner,
        })
    }

    pub fn standard() -> Result<Self> {
        Self::new(0.0, 1.0)
    }
}

impl SketchDistribution for CauchyScale {
    type Value = f64;

    fn identity(&self) -> u64 {
        identity_of("cauchy", &[self.median.to_bits(), self.scale.to_bits()])
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        loop {
            let v = self.inner.sample(rng);
            if v != 0.0 && v.is_finite() {
                return v;
            }
        }
    }
}

impl ValueDistribution for CauchyScale {
    fn type_tag(&self) -> &'static str {
        "MMT"
    }

    fn spec(&self) -> DistributionSpec {
        DistributionSpec::Cauchy {
            median: self.median,
            scale: self.scale,
        }
    }
}

/// Random sign times E^(-1/p) with E ~ Exp(1) (Woodruff-Zhang transform)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WzExponential {
    p: f64,
}

impl WzExponential {
    pub fn new(p: f64) -> Result<Self> {
        if !(1.0..=2.0).contains(&p) {
            return Err(SketchError::DistributionDomain(format!(
                "WZT requires 1 <= p <= 2 (got {})",
                p
            )));
        }
        Ok(Self { p })
    }

    pub fn p(&self) -> f64 {
        self.p
    }
}

impl SketchDistribution for WzExponential {
    type Value = f64;

    fn identity(&self) -> u64 {
        identity_of("wz_exponential", &[self.p.to_bits()])
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let sign = if rng.random::<bool>() { 1.0 } else { -1.0 };
        loop {
            let e: f64 = Exp1.sample(rng);
            let magnitude = e.powf(-1.0 / self.p);
            if e > 0.0 && magnitude.is_finite() {
                return sign * magnitude;
            }
        }
    }
}

impl ValueDistribution for WzExponential {
    fn type_tag(&self) -> &'static str {
        "WZT"
    }

    fn spec(&self) -> DistributionSpec {
        DistributionSpec::WzExponential { p: self.p }
    }
}

/// Normal samples, used by dense projections sharing a context
#[derive(Debug, Clone)]
pub struct Gaussian {
    mean: f64,
    std_dev: f64,
    inner: Normal<f64>,
}

impl Gaussian {
    pub fn new(mean: f64, std_dev: f64) -> Result<Self> {
        let inner = Normal::new(mean, std_dev).map_err(|e| {
            SketchError::DistributionDomain(format!("normal({}, {}): {}", mean, std_dev, e))
        })?;
        Ok(Self {
            mean,
            std_dev,
            inner,
        })
    }
}

impl SketchDistribution for Gaussian {
    type Value = f64;

    fn identity(&self) -> u64 {
        identity_of("normal", &[self.mean.to_bits(), self.std_dev.to_bits()])
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.inner.sample(rng)
    }
}

/// Runtime description of a distribution, as found in sketch descriptions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionSpec {
    UniformIndex { size: i64 },
    Rademacher,
    Cauchy { median: f64, scale: f64 },
    WzExponential { p: f64 },
    Normal { mean: f64, std_dev: f64 },
}

impl DistributionSpec {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UniformIndex { .. } => "uniform_index",
            Self::Rademacher => "rademacher",
            Self::Cauchy { .. } => "cauchy",
            Self::WzExponential { .. } => "wz_exponential",
            Self::Normal { .. } => "normal",
        }
    }

    /// Realize as an index distribution; only discrete index specs qualify.
    pub fn realize_index(&self) -> Result<UniformIndex> {
        match self {
            Self::UniformIndex { size } => UniformIndex::new(*size),
            other => Err(SketchError::UnsupportedDistribution(format!(
                "{} cannot produce coordinate indices",
                other.name()
            ))),
        }
    }

    /// Realize as a real-valued distribution.
    pub fn realize_value(&self) -> Result<ValueSampler> {
        match self {
            Self::UniformIndex { .. } => Err(SketchError::UnsupportedDistribution(
                "uniform_index cannot produce scaling values".to_string(),
            )),
            Self::Rademacher => Ok(ValueSampler::Rademacher(Rademacher)),
            Self::Cauchy { median, scale } => {
                Ok(ValueSampler::Cauchy(CauchyScale::new(*median, *scale)?))
            }
            Self::WzExponential { p } => Ok(ValueSampler::WzExponential(WzExponential::new(*p)?)),
            Self::Normal { mean, std_dev } => {
                Ok(ValueSampler::Normal(Gaussian::new(*mean, *std_dev)?))
            }
        }
    }
}

/// A realized real-valued distribution chosen at runtime
#[derive(Debug, Clone)]
pub enum ValueSampler {
    Rademacher(Rademacher),
    Cauchy(CauchyScale),
    WzExponential(WzExponential),
    Normal(Gaussian),
}

impl SketchDistribution for ValueSampler {
    type Value = f64;

    fn identity(&self) -> u64 {
        match self {
            Self::Rademacher(d) => d.identity(),
            Self::Cauchy(d) => d.identity(),
            Self::WzExponential(d) => d.identity(),
            Self::Normal(d) => d.identity(),
        }
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Self::Rademacher(d) => d.draw(rng),
            Self::Cauchy(d) => d.draw(rng),
            Self::WzExponential(d) => d.draw(rng),
            Self::Normal(d) => d.draw(rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_uniform_index_stays_in_domain() {
        let dist = UniformIndex::new(3).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..1000 {
            assert!(dist.draw(&mut rng) < 3);
        }
        assert_eq!(dist.domain(), 3);
    }

    #[test]
    fn test_empty_index_domain_rejected() {
        assert!(matches!(
            UniformIndex::new(0),
            Err(SketchError::DistributionDomain(_))
        ));
        assert!(matches!(
            UniformIndex::with_domain(-4),
            Err(SketchError::DistributionDomain(_))
        ));
    }

    #[test]
    fn test_rademacher_is_balanced_signs() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let samples: Vec<f64> = (0..4000).map(|_| Rademacher.draw(&mut rng)).collect();
        assert!(samples.iter().all(|&v| v == 1.0 || v == -1.0));
        let positives = samples.iter().filter(|&&v| v > 0.0).count();
        assert!(positives > 1800 && positives < 2200);
    }

    #[test]
    fn test_wzt_values_nonzero() {
        let dist = WzExponential::new(1.5).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..1000 {
            let v = dist.draw(&mut rng);
            assert!(v != 0.0 && v.is_finite());
        }
        assert!(WzExponential::new(0.5).is_err());
        assert!(WzExponential::new(f64::NAN).is_err());
    }

    #[test]
    fn test_cauchy_rejects_non_finite_parameters() {
        for (median, scale) in [
            (f64::INFINITY, 1.0),
            (f64::NAN, 1.0),
            (0.0, f64::INFINITY),
            (0.0, f64::NAN),
            (0.0, 0.0),
        ] {
            assert!(matches!(
                CauchyScale::new(median, scale),
                Err(SketchError::DistributionDomain(_))
            ));
        }
        let dist = CauchyScale::new(2.5, 0.5).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!((0..100).all(|_| dist.draw(&mut rng).is_finite()));
    }

    #[test]
    fn test_identity_depends_on_parameters() {
        assert_ne!(
            UniformIndex::new(3).unwrap().identity(),
            UniformIndex::new(4).unwrap().identity()
        );
        assert_ne!(
            CauchyScale::standard().unwrap().identity(),
            CauchyScale::new(0.0, 2.0).unwrap().identity()
        );
        assert_ne!(Rademacher.identity(), WzExponential::new(1.0).unwrap().identity());
    }

    #[test]
    fn test_spec_realization() {
        let idx = DistributionSpec::UniformIndex { size: 5 }.realize_index().unwrap();
        assert_eq!(idx.domain(), 5);

        assert!(matches!(
            DistributionSpec::Rademacher.realize_index(),
            Err(SketchError::UnsupportedDistribution(_))
        ));
        assert!(matches!(
            DistributionSpec::UniformIndex { size: 5 }.realize_value(),
            Err(SketchError::UnsupportedDistribution(_))
        ));

        let cauchy = DistributionSpec::Cauchy {
            median: 0.0,
            scale: 1.0,
        }
        .realize_value()
        .unwrap();
        assert_eq!(cauchy.identity(), CauchyScale::standard().unwrap().identity());
    }

    #[test]
    fn test_spec_json_shape() {
        let spec: DistributionSpec =
            serde_json::from_str(r#"{"kind": "wz_exponential", "p": 1.0}"#).unwrap();
        assert_eq!(spec, DistributionSpec::WzExponential { p: 1.0 });
        assert!(serde_json::from_str::<DistributionSpec>(r#"{"kind": "zipf"}"#).is_err());
    }
}
