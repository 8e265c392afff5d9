//! Ownership of input coordinates across cooperating processes
//!
//! Each process builds parameters only for the coordinates it owns. Since
//! sampling is counter based, the union of all local builds equals one global
//! build regardless of layout.

use crate::error::{Result, SketchError};
use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Contiguous ranges; the first `n % size` ranks own one extra coordinate
    #[default]
    Block,
    /// Rank r owns r, r + size, r + 2 * size, ...
    Cyclic,
}

impl Layout {
    /// Coordinates of `[0, n)` owned by `rank` among `size` processes.
    pub fn owned(&self, n: usize, rank: usize, size: usize) -> Result<Vec<usize>> {
        match self {
            Self::Block => Ok(block_range(n, rank, size)?.collect()),
            Self::Cyclic => {
                check_rank(rank, size)?;
                Ok((rank..n).step_by(size).collect())
            }
        }
    }
}

/// The contiguous block of `[0, n)` owned by `rank`.
pub fn block_range(n: usize, rank: usize, size: usize) -> Result<Range<usize>> {
    check_rank(rank, size)?;
    let base = n / size;
    let extra = n % size;
    let start = rank * base + rank.min(extra);
    let len = base + usize::from(rank < extra);
    Ok(start..start + len)
}

fn check_rank(rank: usize, size: usize) -> Result<()> {
    if size == 0 || rank >= size {
        return Err(SketchError::InvalidPartition { rank, size });
    }
    Ok(())
}
