//! Sketch shape, type tag and context, plus the portable description format.
//!
//! A description is a flat serde schema with named fields. Required fields are
//! never defaulted and unknown fields are rejected:
//!
//! ```json
//! {"version": 1, "N": 6, "S": 3, "type": "CWT",
//!  "context": {"seed": 42, "engine": "chacha20"}}
//! ```

use crate::context::{Engine, RandomContext};
use crate::distribution::DistributionSpec;
use crate::error::{Result, SketchError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Version for description format migrations
pub const DESCRIPTION_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextDescription {
    pub seed: u64,
    /// Absent means the default engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<Engine>,
}

impl ContextDescription {
    pub fn to_context(&self) -> RandomContext {
        RandomContext::with_engine(self.seed, self.engine.unwrap_or_default())
    }
}

impl From<&RandomContext> for ContextDescription {
    fn from(context: &RandomContext) -> Self {
        Self {
            seed: context.seed(),
            engine: Some(context.engine()),
        }
    }
}

/// Built arrays carried inside a description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddedParams {
    pub row_idx: Vec<usize>,
    pub row_value: Vec<f64>,
}

/// Serialized form of a sketch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SketchDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(rename = "N")]
    pub n: i64,
    #[serde(rename = "S")]
    pub s: i64,
    #[serde(rename = "type")]
    pub sketch_type: String,
    pub context: ContextDescription,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_distribution: Option<DistributionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<EmbeddedParams>,
}

impl SketchDescription {
    pub fn from_json(json: &str) -> Result<Self> {
        let description: Self = serde_json::from_str(json)?;
        description.check_version()
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let description: Self = serde_json::from_value(value)?;
        description.check_version()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SketchError::Serialization(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SketchError::Serialization(e.to_string()))
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| SketchError::Serialization(e.to_string()))
    }

    fn check_version(self) -> Result<Self> {
        match self.version {
            Some(found) if found > DESCRIPTION_VERSION => Err(SketchError::Deserialization(
                format!(
                    "unsupported description version {} (max supported: {})",
                    found, DESCRIPTION_VERSION
                ),
            )),
            _ => Ok(self),
        }
    }
}

/// Shape, family tag and randomness of a sketch
#[derive(Debug, Clone, PartialEq)]
pub struct SketchDescriptor {
    n: usize,
    s: usize,
    sketch_type: String,
    context: RandomContext,
}

impl SketchDescriptor {
    pub fn new(n: i64, s: i64, context: RandomContext, sketch_type: impl Into<String>) -> Result<Self> {
        if n <= 0 {
            return Err(SketchError::InvalidDimension { name: "N", value: n });
        }
        if s <= 0 {
            return Err(SketchError::InvalidDimension { name: "S", value: s });
        }
        Ok(Self {
            n: n as usize,
            s: s as usize,
            sketch_type: sketch_type.into(),
            context,
        })
    }

    /// Input dimension
    pub fn n(&self) -> usize {
        self.n
    }

    /// Sketch dimension
    pub fn s(&self) -> usize {
        self.s
    }

    pub fn sketch_type(&self) -> &str {
        &self.sketch_type
    }

    pub fn context(&self) -> &RandomContext {
        &self.context
    }

    /// Shape and seed only.
    pub fn describe(&self) -> SketchDescription {
        SketchDescription {
            version: Some(DESCRIPTION_VERSION),
            n: self.n as i64,
            s: self.s as i64,
            sketch_type: self.sketch_type.clone(),
            context: ContextDescription::from(&self.context),
            value_distribution: None,
            params: None,
        }
    }

    /// Rebuild an unbuilt descriptor, accepting only the given type tags.
    pub fn from_description(description: &SketchDescription, accepted_types: &[&str]) -> Result<Self> {
        if !accepted_types.contains(&description.sketch_type.as_str()) {
            warn!(
                sketch_type = %description.sketch_type,
                "Rejected description with unrecognized sketch type."
            );
            return Err(SketchError::Deserialization(format!(
                "unrecognized sketch type {:?} (expected one of {:?})",
                description.sketch_type, accepted_types
            )));
        }
        Self::new(
            description.n,
            description.s,
            description.context.to_context(),
            description.sketch_type.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invalid_dimensions() {
        let ctx = RandomContext::new(1);
        assert_eq!(
            SketchDescriptor::new(0, 3, ctx, "CWT"),
            Err(SketchError::InvalidDimension { name: "N", value: 0 })
        );
        assert_eq!(
            SketchDescriptor::new(6, -1, ctx, "CWT"),
            Err(SketchError::InvalidDimension { name: "S", value: -1 })
        );
    }

    #[test]
    fn test_describe_round_trip() {
        let ctx = RandomContext::with_engine(42, Engine::Xxh3);
        let descriptor = SketchDescriptor::new(6, 3, ctx, "CWT").unwrap();
        let json = descriptor.describe().to_json().unwrap();
        let description = SketchDescription::from_json(&json).unwrap();
        let restored = SketchDescriptor::from_description(&description, &["CWT"]).unwrap();
        assert_eq!(restored, descriptor);
    }

    #[test]
    fn test_description_field_names() {
        let descriptor = SketchDescriptor::new(6, 3, RandomContext::new(42), "CWT").unwrap();
        let value = descriptor.describe().to_value().unwrap();
        assert_eq!(
            value,
            json!({
                "version": 1,
                "N": 6,
                "S": 3,
                "type": "CWT",
                "context": {"seed": 42, "engine": "chacha20"}
            })
        );
    }

    #[test]
    fn test_missing_engine_uses_default() {
        let description = SketchDescription::from_value(json!({
            "N": 10, "S": 2, "type": "CWT", "context": {"seed": 5}
        }))
        .unwrap();
        assert_eq!(description.context.to_context(), RandomContext::new(5));
    }

    #[test]
    fn test_missing_s_rejected() {
        let err = SketchDescription::from_value(json!({
            "N": 10, "type": "CWT", "context": {"seed": 5}
        }))
        .unwrap_err();
        assert!(matches!(err, SketchError::Deserialization(ref m) if m.contains("S")));
    }

    #[test]
    fn test_missing_seed_rejected() {
        let err = SketchDescription::from_value(json!({
            "N": 10, "S": 2, "type": "CWT", "context": {}
        }));
        assert!(matches!(err, Err(SketchError::Deserialization(_))));
    }

    #[test]
    fn test_unknown_fields_and_versions_rejected() {
        assert!(SketchDescription::from_value(json!({
            "N": 10, "S": 2, "type": "CWT", "context": {"seed": 5}, "extra": true
        }))
        .is_err());
        assert!(SketchDescription::from_value(json!({
            "version": 99, "N": 10, "S": 2, "type": "CWT", "context": {"seed": 5}
        }))
        .is_err());
    }

    #[test]
    fn test_unrecognized_type_rejected() {
        let description = SketchDescriptor::new(4, 2, RandomContext::new(1), "JLT")
            .unwrap()
            .describe();
        assert!(matches!(
            SketchDescriptor::from_description(&description, &["CWT", "MMT"]),
            Err(SketchError::Deserialization(_))
        ));
    }

    #[test]
    fn test_negative_dimension_in_description() {
        let description = SketchDescription::from_value(json!({
            "N": -3, "S": 2, "type": "CWT", "context": {"seed": 5}
        }))
        .unwrap();
        assert!(matches!(
            SketchDescriptor::from_description(&description, &["CWT"]),
            Err(SketchError::InvalidDimension { name: "N", .. })
        ));
    }
}
