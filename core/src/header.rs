use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::{compact, error::ChainError};

/// The part of a block header the difficulty retarget reads.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct BlockHeader {
    #[serde(alias = "block_height")]
    pub height: u64,
    /// Block time in seconds since the epoch.
    pub timestamp: i64,
    /// Compact target.
    pub bits: u32,
}

impl BlockHeader {
    pub fn new(height: u64, timestamp: i64, bits: u32) -> Self {
        BlockHeader {
            height,
            timestamp,
            bits,
        }
    }

    pub fn target(&self) -> BigUint {
        compact::nbits_to_target(self.bits)
    }
}

/// Checks that heights step by exactly one from each header to the next.
pub fn validate_chain<'a>(
    headers: impl IntoIterator<Item = &'a BlockHeader>,
) -> Result<(), ChainError> {
    let mut previous: Option<u64> = None;
    for (index, header) in headers.into_iter().enumerate() {
        if let Some(prev) = previous {
            let expected = prev
                .checked_add(1)
                .ok_or(ChainError::HeightOverflow { height: prev })?;
            if header.height != expected {
                return Err(ChainError::NonContiguous {
                    index,
                    expected,
                    found: header.height,
                });
            }
        }
        previous = Some(header.height);
    }
    Ok(())
}

/// Height of the block following `tip`.
pub(crate) fn next_height(tip: &BlockHeader) -> Result<u64, ChainError> {
    tip.height
        .checked_add(1)
        .ok_or(ChainError::HeightOverflow { height: tip.height })
}

/// Elapsed seconds between an older and a newer block, floored at zero.
pub(crate) fn elapsed_seconds(newest: i64, older: i64) -> u64 {
    clamp_elapsed(i128::from(newest) - i128::from(older))
}

/// Floors a signed span of seconds at zero.
pub(crate) fn clamp_elapsed(span: i128) -> u64 {
    u64::try_from(span).unwrap_or(0)
}
