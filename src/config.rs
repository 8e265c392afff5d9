//! Generator configuration
//!
//! Chooses the sampling engine for new contexts and whether descriptions
//! replay the seed or embed built arrays.

use crate::context::Engine;
use crate::error::{Result, SketchError};
use serde::{Deserialize, Serialize};

pub const ENGINE_ENV: &str = "SKETCH_ENGINE";
pub const SERIALIZATION_ENV: &str = "SKETCH_SERIALIZATION";

/// How built parameters are captured in a description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationPolicy {
    /// Shape plus seed only; arrays are regenerated on load
    #[default]
    SeedReplay,
    /// Shape, seed and the built arrays
    EmbedArrays,
}

impl SerializationPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "seed_replay" | "seed" => Some(Self::SeedReplay),
            "embed_arrays" | "embed" => Some(Self::EmbedArrays),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SketchConfig {
    /// Engine for contexts created without an explicit one
    pub engine: Engine,
    pub serialization: SerializationPolicy,
}

impl SketchConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SketchError::Deserialization(e.to_string()))
    }

    /// Defaults overridden by `SKETCH_ENGINE` / `SKETCH_SERIALIZATION`.
    /// Unrecognized values are rejected rather than ignored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(ENGINE_ENV) {
            config.engine = Engine::from_name(&value).ok_or_else(|| {
                SketchError::Deserialization(format!("{}: unknown engine {:?}", ENGINE_ENV, value))
            })?;
        }
        if let Some(value) = lookup(SERIALIZATION_ENV) {
            config.serialization = SerializationPolicy::from_name(&value).ok_or_else(|| {
                SketchError::Deserialization(format!(
                    "{}: unknown policy {:?}",
                    SERIALIZATION_ENV, value
                ))
            })?;
        }
        Ok(config)
    }
}
