//! Hash-based sketch parameters (CountSketch family)
//!
//! Input coordinate `i` is sent to output coordinate `row_idx[i]` scaled by
//! `row_value[i]`; coordinates sharing a target are summed. The arrays are a
//! pure function of the descriptor and the two distributions, so they can be
//! regenerated from a seed, built lazily, or built slice by slice on separate
//! processes.

use crate::config::SerializationPolicy;
use crate::context::RandomContext;
use crate::descriptor::{EmbeddedParams, SketchDescription, SketchDescriptor};
use crate::distribution::{
    CauchyScale, DistributionSpec, IndexDistribution, Rademacher, UniformIndex, ValueDistribution,
    WzExponential,
};
use crate::error::{Result, SketchError};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::ops::Range;
use tracing::debug;

/// Type tags of the hash sketch families
pub const SUPPORTED_HASH_SKETCHES: &[&str] = &["CWT", "MMT", "WZT"];

#[derive(Debug, Clone, PartialEq)]
struct BuiltParams {
    row_idx: Vec<usize>,
    row_value: Vec<f64>,
}

/// Parameters of a hash sketch from N input to S output coordinates
#[derive(Debug, Clone)]
pub struct HashSketchParams<I = UniformIndex, V = Rademacher> {
    descriptor: SketchDescriptor,
    value_dist: V,
    built: OnceCell<BuiltParams>,
    index: PhantomData<fn() -> I>,
}

impl<I, V> HashSketchParams<I, V>
where
    I: IndexDistribution,
    V: ValueDistribution,
{
    pub fn new(n: i64, s: i64, context: RandomContext, value_dist: V) -> Result<Self> {
        let descriptor = SketchDescriptor::new(n, s, context, value_dist.type_tag())?;
        Self::from_descriptor(descriptor, value_dist)
    }

    /// Attach distributions to an existing descriptor of the matching family.
    pub fn from_descriptor(descriptor: SketchDescriptor, value_dist: V) -> Result<Self> {
        if descriptor.sketch_type() != value_dist.type_tag() {
            return Err(SketchError::UnsupportedSketchType(format!(
                "{} cannot be scaled by {}",
                descriptor.sketch_type(),
                value_dist.spec().name()
            )));
        }
        I::with_domain(descriptor.s() as i64)?;
        Ok(Self {
            descriptor,
            value_dist,
            built: OnceCell::new(),
            index: PhantomData,
        })
    }

    pub fn descriptor(&self) -> &SketchDescriptor {
        &self.descriptor
    }

    pub fn n(&self) -> usize {
        self.descriptor.n()
    }

    pub fn s(&self) -> usize {
        self.descriptor.s()
    }

    pub fn sketch_type(&self) -> &str {
        self.descriptor.sketch_type()
    }

    pub fn context(&self) -> &RandomContext {
        self.descriptor.context()
    }

    pub fn value_distribution(&self) -> &V {
        &self.value_dist
    }

    pub fn is_built(&self) -> bool {
        self.built.get().is_some()
    }

    /// Populate the arrays. Later calls return the cached arrays.
    pub fn build(&self) -> Result<()> {
        self.built_params().map(|_| ())
    }

    pub fn row_idx(&self) -> Result<&[usize]> {
        Ok(&self.built_params()?.row_idx)
    }

    pub fn row_value(&self) -> Result<&[f64]> {
        Ok(&self.built_params()?.row_value)
    }

    /// `(input coordinate, target coordinate, scale)` triples.
    pub fn entries(&self) -> Result<impl Iterator<Item = (usize, usize, f64)> + '_> {
        let built = self.built_params()?;
        Ok(built
            .row_idx
            .iter()
            .zip(&built.row_value)
            .enumerate()
            .map(|(i, (&target, &scale))| (i, target, scale)))
    }

    /// Parameters for a contiguous range of input coordinates, identical to
    /// the same positions of a full build. Does not touch the cache.
    pub fn build_range(&self, range: Range<usize>) -> Result<LocalParams> {
        let n = self.n();
        if range.start > range.end || range.end > n {
            return Err(SketchError::InvalidRange {
                start: range.start,
                end: range.end,
                n,
            });
        }
        let context = self.context();
        let index_dist = I::with_domain(self.s() as i64)?;
        let offset = range.start as u64;
        let count = range.len() as i64;
        let row_idx = context.generate(offset, count, &index_dist)?;
        let row_value = context.generate(offset, count, &self.value_dist)?;
        debug!(
            sketch_type = self.sketch_type(),
            start = range.start,
            end = range.end,
            "Built hash sketch slice."
        );
        Ok(LocalParams {
            coordinates: range.collect(),
            row_idx,
            row_value,
        })
    }

    /// Parameters for arbitrary owned coordinates, e.g. a cyclic layout.
    pub fn build_local(&self, coordinates: &[usize]) -> Result<LocalParams> {
        let n = self.n();
        if let Some(&bad) = coordinates.iter().find(|&&c| c >= n) {
            return Err(SketchError::InvalidRange {
                start: bad,
                end: bad.saturating_add(1),
                n,
            });
        }
        let context = self.context();
        let index_dist = I::with_domain(self.s() as i64)?;
        let positions = || coordinates.iter().map(|&c| c as u64);
        let row_idx = context.generate_at(positions(), &index_dist)?;
        let row_value = context.generate_at(positions(), &self.value_dist)?;
        debug!(
            sketch_type = self.sketch_type(),
            count = coordinates.len(),
            "Built hash sketch coordinates."
        );
        Ok(LocalParams {
            coordinates: coordinates.to_vec(),
            row_idx,
            row_value,
        })
    }

    pub fn describe(&self, policy: SerializationPolicy) -> Result<SketchDescription> {
        let mut description = self.descriptor.describe();
        description.value_distribution = Some(self.value_dist.spec());
        if policy == SerializationPolicy::EmbedArrays {
            let built = self.built_params()?;
            description.params = Some(EmbeddedParams {
                row_idx: built.row_idx.clone(),
                row_value: built.row_value.clone(),
            });
        }
        Ok(description)
    }

    /// Reconstruct from a description. Embedded arrays are validated and
    /// loaded as built; otherwise the parameters replay the seed on demand.
    pub fn from_description(description: &SketchDescription, value_dist: V) -> Result<Self> {
        let descriptor = SketchDescriptor::from_description(description, &[value_dist.type_tag()])?;
        if let Some(spec) = &description.value_distribution {
            if *spec != value_dist.spec() {
                return Err(SketchError::Deserialization(format!(
                    "value distribution {:?} does not match {:?}",
                    spec,
                    value_dist.spec()
                )));
            }
        }
        let mut params = Self::from_descriptor(descriptor, value_dist)?;
        if let Some(embedded) = &description.params {
            params.built = OnceCell::with_value(validate_embedded(embedded, params.n(), params.s())?);
        }
        Ok(params)
    }

    fn built_params(&self) -> Result<&BuiltParams> {
        self.built.get_or_try_init(|| {
            let context = self.context();
            let n = self.n() as i64;
            let index_dist = I::with_domain(self.s() as i64)?;
            let row_idx = context.generate(0, n, &index_dist)?;
            let row_value = context.generate(0, n, &self.value_dist)?;
            debug!(
                sketch_type = self.sketch_type(),
                n,
                s = self.s(),
                seed = context.seed(),
                engine = context.engine().name(),
                "Built hash sketch parameters."
            );
            Ok::<_, SketchError>(BuiltParams { row_idx, row_value })
        })
    }
}

fn validate_embedded(embedded: &EmbeddedParams, n: usize, s: usize) -> Result<BuiltParams> {
    if embedded.row_idx.len() != n || embedded.row_value.len() != n {
        return Err(SketchError::Deserialization(format!(
            "embedded arrays have lengths {}/{} (expected {})",
            embedded.row_idx.len(),
            embedded.row_value.len(),
            n
        )));
    }
    if let Some(&bad) = embedded.row_idx.iter().find(|&&t| t >= s) {
        return Err(SketchError::Deserialization(format!(
            "embedded row index {} outside [0, {})",
            bad, s
        )));
    }
    if embedded.row_value.iter().any(|&v| v == 0.0 || !v.is_finite()) {
        return Err(SketchError::Deserialization(
            "embedded row values must be finite and nonzero".to_string(),
        ));
    }
    Ok(BuiltParams {
        row_idx: embedded.row_idx.clone(),
        row_value: embedded.row_value.clone(),
    })
}

/// The slice of parameters owned by one process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalParams {
    /// Global input coordinates, parallel to the two arrays
    pub coordinates: Vec<usize>,
    pub row_idx: Vec<usize>,
    pub row_value: Vec<f64>,
}

impl LocalParams {
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Compact binary form for shipping or persisting a slice
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| SketchError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let local: LocalParams = bincode::deserialize(bytes)
            .map_err(|e| SketchError::Deserialization(e.to_string()))?;
        if local.row_idx.len() != local.len() || local.row_value.len() != local.len() {
            return Err(SketchError::Deserialization(
                "local parameter arrays differ in length".to_string(),
            ));
        }
        Ok(local)
    }

    /// Reassemble global arrays of length `n` from slices that together
    /// cover every coordinate exactly once.
    pub fn assemble<P>(parts: P, n: usize) -> Result<(Vec<usize>, Vec<f64>)>
    where
        P: IntoIterator<Item = LocalParams>,
    {
        let mut row_idx = vec![0usize; n];
        let mut row_value = vec![0.0f64; n];
        let mut seen = vec![false; n];
        for part in parts {
            for ((&c, &target), &scale) in part
                .coordinates
                .iter()
                .zip(&part.row_idx)
                .zip(&part.row_value)
            {
                if c >= n || seen[c] {
                    return Err(SketchError::InvalidRange {
                        start: c,
                        end: c.saturating_add(1),
                        n,
                    });
                }
                seen[c] = true;
                row_idx[c] = target;
                row_value[c] = scale;
            }
        }
        if let Some(missing) = seen.iter().position(|&s| !s) {
            return Err(SketchError::InvalidRange {
                start: missing,
                end: missing + 1,
                n,
            });
        }
        Ok((row_idx, row_value))
    }
}

/// Clarkson-Woodruff transform (CountSketch): uniform targets, ±1 signs
pub type CwtParams = HashSketchParams<UniformIndex, Rademacher>;
/// Meng-Mahoney transform: uniform targets, Cauchy scaling
pub type MmtParams = HashSketchParams<UniformIndex, CauchyScale>;
/// Woodruff-Zhang transform: uniform targets, signed E^(-1/p) scaling
pub type WztParams = HashSketchParams<UniformIndex, WzExponential>;

/// A hash sketch whose family is chosen at runtime by type tag
#[derive(Debug, Clone)]
pub enum HashSketch {
    Cwt(CwtParams),
    Mmt(MmtParams),
    Wzt(WztParams),
}

macro_rules! dispatch {
    ($self:ident, $p:ident => $body:expr) => {
        match $self {
            HashSketch::Cwt($p) => $body,
            HashSketch::Mmt($p) => $body,
            HashSketch::Wzt($p) => $body,
        }
    };
}

impl HashSketch {
    /// `p` is required for WZT and ignored otherwise.
    pub fn new(sketch_type: &str, n: i64, s: i64, context: RandomContext, p: Option<f64>) -> Result<Self> {
        match sketch_type {
            "CWT" => Ok(Self::Cwt(CwtParams::new(n, s, context, Rademacher)?)),
            "MMT" => Ok(Self::Mmt(MmtParams::new(n, s, context, CauchyScale::standard()?)?)),
            "WZT" => {
                let p = p.ok_or_else(|| {
                    SketchError::DistributionDomain("WZT requires a p parameter".to_string())
                })?;
                Ok(Self::Wzt(WztParams::new(n, s, context, WzExponential::new(p)?)?))
            }
            other => Err(SketchError::UnsupportedSketchType(other.to_string())),
        }
    }

    pub fn from_description(description: &SketchDescription) -> Result<Self> {
        let spec = description.value_distribution.as_ref();
        match description.sketch_type.as_str() {
            "CWT" => Ok(Self::Cwt(CwtParams::from_description(description, Rademacher)?)),
            "MMT" => {
                let dist = match spec {
                    None => CauchyScale::standard()?,
                    Some(DistributionSpec::Cauchy { median, scale }) => {
                        CauchyScale::new(*median, *scale)?
                    }
                    Some(other) => return Err(mismatched_spec("MMT", other)),
                };
                Ok(Self::Mmt(MmtParams::from_description(description, dist)?))
            }
            "WZT" => {
                let dist = match spec {
                    Some(DistributionSpec::WzExponential { p }) => WzExponential::new(*p)?,
                    Some(other) => return Err(mismatched_spec("WZT", other)),
                    None => {
                        return Err(SketchError::Deserialization(
                            "WZT description requires value_distribution".to_string(),
                        ));
                    }
                };
                Ok(Self::Wzt(WztParams::from_description(description, dist)?))
            }
            other => Err(SketchError::Deserialization(format!(
                "unrecognized sketch type {:?} (expected one of {:?})",
                other, SUPPORTED_HASH_SKETCHES
            ))),
        }
    }

    pub fn descriptor(&self) -> &SketchDescriptor {
        dispatch!(self, p => p.descriptor())
    }

    pub fn sketch_type(&self) -> &str {
        dispatch!(self, p => p.sketch_type())
    }

    pub fn build(&self) -> Result<()> {
        dispatch!(self, p => p.build())
    }

    pub fn is_built(&self) -> bool {
        dispatch!(self, p => p.is_built())
    }

    pub fn row_idx(&self) -> Result<&[usize]> {
        dispatch!(self, p => p.row_idx())
    }

    pub fn row_value(&self) -> Result<&[f64]> {
        dispatch!(self, p => p.row_value())
    }

    pub fn build_range(&self, range: Range<usize>) -> Result<LocalParams> {
        dispatch!(self, p => p.build_range(range))
    }

    pub fn build_local(&self, coordinates: &[usize]) -> Result<LocalParams> {
        dispatch!(self, p => p.build_local(coordinates))
    }

    pub fn describe(&self, policy: SerializationPolicy) -> Result<SketchDescription> {
        dispatch!(self, p => p.describe(policy))
    }
}

fn mismatched_spec(sketch_type: &str, spec: &DistributionSpec) -> SketchError {
    SketchError::Deserialization(format!(
        "{} cannot use a {} value distribution",
        sketch_type,
        spec.name()
    ))
}
