use num_bigint::BigUint;
use num_traits::Zero;
use tracing::debug;

use super::{event_horizon, exits_band, finalize, pace_ratio, schedule, Retarget, Schedule};
use crate::{
    error::ChainError,
    header::{elapsed_seconds, next_height, validate_chain, BlockHeader},
    params::NetworkParams,
};

/// Resolves the difficulty of the block following `chain` by walking backward
/// from the tip, one header at a time, until the event horizon test fires.
///
/// Returns `Ok(None)` when the chain holds fewer than `min_blocks` usable
/// headers; the caller should defer judgment rather than reject a header.
pub fn resolve_one(
    params: &NetworkParams,
    chain: &[BlockHeader],
) -> Result<Option<Retarget>, ChainError> {
    validate_chain(chain)?;

    let Some(last) = chain.last() else {
        return Ok(Some(params.genesis()));
    };
    let next_height = next_height(last)?;

    let (min_blocks, max_blocks, floor_height) = match schedule(params, next_height) {
        Schedule::Fixed(fixed) => return Ok(Some(fixed)),
        Schedule::Window {
            min_blocks,
            max_blocks,
            floor_height,
        } => (min_blocks, max_blocks, floor_height.unwrap_or(0)),
    };

    let mut mass = 0usize;
    let mut target_sum = BigUint::zero();
    let mut actual_seconds = 0u64;

    for reading in chain.iter().rev() {
        if mass == max_blocks || reading.height < floor_height {
            break;
        }

        mass += 1;
        target_sum += reading.target();
        actual_seconds = elapsed_seconds(last.timestamp, reading.timestamp);

        let ratio = pace_ratio(params.target_spacing * mass as u64, actual_seconds);
        if mass >= min_blocks && exits_band(ratio, event_horizon(mass)) {
            debug!(height = next_height, mass, ratio, "event horizon reached");
            break;
        }
    }

    if mass < min_blocks {
        debug!(
            height = next_height,
            mass, min_blocks, "insufficient history"
        );
        return Ok(None);
    }

    Ok(Some(finalize(params, &target_sum, mass, actual_seconds)))
}
