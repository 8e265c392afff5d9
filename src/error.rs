//! Error taxonomy for sketch parameter generation.
//!
//! All failures are construction-time or build-time failures. Nothing here is
//! retried and no partially built object is ever returned alongside an error.

/// Errors that can occur while creating, building or (de)serializing sketches
#[derive(Debug, Clone, PartialEq)]
pub enum SketchError {
    /// A sketch dimension (N or S) was not strictly positive
    InvalidDimension { name: &'static str, value: i64 },
    /// A negative or unaddressable sample count was requested
    InvalidCount(i64),
    /// The context cannot realize the requested distribution
    UnsupportedDistribution(String),
    /// A structured description was malformed or incomplete
    Deserialization(String),
    /// A distribution was configured with an empty or invalid domain
    DistributionDomain(String),
    /// Requested coordinates fall outside [0, N)
    InvalidRange { start: usize, end: usize, n: usize },
    /// A process layout with no ranks or a rank outside the layout
    InvalidPartition { rank: usize, size: usize },
    /// No hash sketch family is registered under this type tag
    UnsupportedSketchType(String),
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, SketchError>;

impl SketchError {
    /// Stable numeric code used across the C ABI. Zero means success.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidDimension { .. } => 101,
            Self::InvalidCount(_) => 102,
            Self::UnsupportedDistribution(_) => 103,
            Self::Deserialization(_) => 104,
            Self::DistributionDomain(_) => 105,
            Self::InvalidRange { .. } => 106,
            Self::InvalidPartition { .. } => 107,
            Self::Serialization(_) => 108,
            Self::UnsupportedSketchType(_) => 109,
        }
    }
}

impl std::fmt::Display for SketchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDimension { name, value } => {
                write!(f, "Invalid dimension: {} must be positive (got {})", name, value)
            }
            Self::InvalidCount(count) => write!(f, "Invalid sample count: {}", count),
            Self::UnsupportedDistribution(e) => write!(f, "Unsupported distribution: {}", e),
            Self::Deserialization(e) => write!(f, "Deserialization failed: {}", e),
            Self::DistributionDomain(e) => write!(f, "Invalid distribution domain: {}", e),
            Self::InvalidRange { start, end, n } => write!(
                f,
                "Coordinate range {}..{} outside input dimension {}",
                start, end, n
            ),
            Self::InvalidPartition { rank, size } => {
                write!(f, "Invalid partition: rank {} of {} processes", rank, size)
            }
            Self::UnsupportedSketchType(t) => write!(f, "Unsupported sketch type: {}", t),
            Self::Serialization(e) => write!(f, "Serialization failed: {}", e),
        }
    }
}

impl std::error::Error for SketchError {}

impl From<serde_json::Error> for SketchError {
    fn from(e: serde_json::Error) -> Self {
        // Only the reading side of serde_json reports data or syntax errors.
        if e.is_data() || e.is_syntax() || e.is_eof() {
            Self::Deserialization(e.to_string())
        } else {
            Self::Serialization(e.to_string())
        }
    }
}
