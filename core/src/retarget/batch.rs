use num_bigint::BigUint;
use num_traits::Zero;
use tracing::debug;

use super::{exits_band, finalize, pace_ratio, schedule, HorizonTable, Retarget, Schedule};
use crate::{
    error::ChainError,
    header::{clamp_elapsed, validate_chain, BlockHeader},
    params::NetworkParams,
};

/// Resolves the required difficulty of every header in `chain`.
///
/// Entry `i` is computed for `next_height = chain[i].height` from the history
/// `prev_chain ++ chain[..i]`, and equals
/// `resolve_one_fast(prev_chain ++ chain[..i])`. The target and time arrays are
/// built once over the combined history and sliced per height.
///
/// Every header of `chain` other than the genesis block needs at least one
/// preceding header, either earlier in `chain` or in `prev_chain`.
pub fn resolve_many(
    params: &NetworkParams,
    prev_chain: &[BlockHeader],
    chain: &[BlockHeader],
) -> Result<Vec<Option<Retarget>>, ChainError> {
    validate_chain(prev_chain.iter().chain(chain))?;

    let history = SharedHistory::new(prev_chain, chain);
    debug!(
        headers = chain.len(),
        history = prev_chain.len(),
        "resolving batch"
    );

    chain
        .iter()
        .enumerate()
        .map(|(i, header)| history.resolve_at(params, prev_chain.len() + i, header.height))
        .collect()
}

/// Arrays over the combined history, indexed oldest first.
struct SharedHistory {
    first_height: u64,
    /// `clock[k]` is the time from the first header to header `k`, the running
    /// sum of timestamp gaps.
    clock: Vec<i128>,
    /// `target_prefix[k]` is the sum of the targets of headers `0..k`.
    target_prefix: Vec<BigUint>,
    bands: HorizonTable,
}

impl SharedHistory {
    fn new(prev_chain: &[BlockHeader], chain: &[BlockHeader]) -> Self {
        let combined: Vec<&BlockHeader> = prev_chain.iter().chain(chain).collect();
        let first_height = combined.first().map_or(0, |h| h.height);

        let clock = std::iter::once(0i128)
            .chain(combined.windows(2).scan(0i128, |running, pair| {
                *running += i128::from(pair[1].timestamp) - i128::from(pair[0].timestamp);
                Some(*running)
            }))
            .take(combined.len())
            .collect();

        let target_prefix = std::iter::once(BigUint::zero())
            .chain(combined.iter().scan(BigUint::zero(), |sum, header| {
                *sum += header.target();
                Some(sum.clone())
            }))
            .collect();

        SharedHistory {
            first_height,
            clock,
            target_prefix,
            bands: HorizonTable::new(combined.len()),
        }
    }

    /// Seconds spanned by the `j + 1` headers ending at `newest`, floored at zero.
    fn elapsed(&self, newest: usize, j: usize) -> u64 {
        clamp_elapsed(self.clock[newest] - self.clock[newest - j])
    }

    /// Resolves `next_height`, whose history is headers `0..position`.
    fn resolve_at(
        &self,
        params: &NetworkParams,
        position: usize,
        next_height: u64,
    ) -> Result<Option<Retarget>, ChainError> {
        if next_height == 0 {
            return Ok(Some(params.genesis()));
        }
        if position == 0 {
            return Err(ChainError::MissingHistory {
                height: next_height,
            });
        }

        let (min_blocks, max_blocks, floor_height) = match schedule(params, next_height) {
            Schedule::Fixed(fixed) => return Ok(Some(fixed)),
            Schedule::Window {
                min_blocks,
                max_blocks,
                floor_height,
            } => (min_blocks, max_blocks, floor_height),
        };

        let mut start = position.saturating_sub(max_blocks);
        if let Some(floor) = floor_height {
            if self.first_height < floor {
                let floor_index =
                    usize::try_from(floor - self.first_height).unwrap_or(usize::MAX);
                start = start.max(floor_index.min(position));
            }
        }

        let len = position - start;
        if len < min_blocks {
            debug!(height = next_height, window = len, min_blocks, "insufficient history");
            return Ok(None);
        }

        let newest = position - 1;
        // A zero elapsed span is read as exactly on pace, see `pace_ratio`.
        let breakpoint = (min_blocks - 1..len)
            .find(|&j| {
                let target_seconds = params.target_spacing * (j as u64 + 1);
                let ratio = pace_ratio(target_seconds, self.elapsed(newest, j));
                exits_band(ratio, self.bands.band(j))
            })
            .unwrap_or(len - 1);

        let mass = breakpoint + 1;
        let target_sum = &self.target_prefix[position] - &self.target_prefix[position - mass];
        Ok(Some(finalize(
            params,
            &target_sum,
            mass,
            self.elapsed(newest, breakpoint),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retarget::resolve_one_fast;

    const START_TIME: i64 = 1_390_000_000;

    fn steady_chain(first: u64, len: u64, spacing: i64, bits: u32) -> Vec<BlockHeader> {
        (first..first + len)
            .map(|h| BlockHeader::new(h, START_TIME + spacing * h as i64, bits))
            .collect()
    }

    fn assert_matches_single(
        params: &NetworkParams,
        prev: &[BlockHeader],
        chain: &[BlockHeader],
    ) {
        let batch = resolve_many(params, prev, chain).unwrap();
        assert_eq!(batch.len(), chain.len());
        for (i, result) in batch.iter().enumerate() {
            let mut history = prev.to_vec();
            history.extend_from_slice(&chain[..i]);
            assert_eq!(
                Ok(result.clone()),
                resolve_one_fast(params, &history),
                "height {}",
                chain[i].height
            );
        }
    }

    #[test]
    fn test_from_genesis() {
        let params = NetworkParams::reddcoin();
        let chain = steady_chain(0, 60, 60, params.genesis_nbits);
        let batch = resolve_many(&params, &[], &chain).unwrap();

        assert_eq!(batch[0], Some(params.genesis()));
        // Heights 1..=14 have a tip below min_blocks.
        assert!(batch[1..=14].iter().all(|r| r == &Some(params.max())));
        assert!(batch[15].is_some());
        assert_matches_single(&params, &[], &chain);
    }

    #[test]
    fn test_split_between_prev_and_chain() {
        let params = NetworkParams::reddcoin();
        let mut headers = steady_chain(4000, 400, 45, 0x1d7fffff);
        for (i, header) in headers.iter_mut().enumerate().skip(250) {
            header.timestamp += (i as i64 - 250) * 50;
        }
        let (prev, chain) = headers.split_at(230);
        assert_matches_single(&params, prev, chain);
    }

    #[test]
    fn test_across_posv_transition() {
        let params = NetworkParams::reddcoin();
        let first = params.last_pow_block - 30;
        let headers = steady_chain(first, 420, 60, params.genesis_nbits);
        let (prev, chain) = headers.split_at(20);

        let batch = resolve_many(&params, prev, chain).unwrap();
        let reset = params.last_pow_block..params.last_pow_block + 360;
        for (result, header) in batch.iter().zip(chain) {
            let last_height = header.height - 1;
            if last_height < params.last_pow_block {
                // Fewer than 360 PoW headers are available.
                assert_eq!(result, &None);
            } else if reset.contains(&last_height) {
                assert_eq!(result, &Some(params.posv_reset()));
            } else {
                // Only PoSV headers are averaged, at exactly the designed pace.
                let mass = last_height - params.last_pow_block;
                let expected = &params.genesis_target * (mass - 1) / mass;
                assert_eq!(result.as_ref().unwrap().target, expected);
            }
        }
        assert_matches_single(&params, prev, chain);
    }

    #[test]
    fn test_all_equal_timestamps() {
        let params = NetworkParams::reddcoin();
        let chain = steady_chain(2000, 50, 0, params.genesis_nbits);
        let batch = resolve_many(&params, &chain[..1], &chain[1..]).unwrap();
        let last = batch.last().unwrap().as_ref().unwrap();
        assert_eq!(last.target, params.genesis_target);
        assert_matches_single(&params, &chain[..1], &chain[1..]);
    }

    #[test]
    fn test_short_history_defers() {
        let params = NetworkParams::reddcoin();
        let chain = steady_chain(3000, 20, 60, params.genesis_nbits);
        let batch = resolve_many(&params, &chain[..5], &chain[5..]).unwrap();
        // History grows from 5 to 19 headers; min_blocks is 14.
        assert!(batch[..9].iter().all(Option::is_none));
        assert!(batch[9..].iter().all(Option::is_some));
    }

    #[test]
    fn test_missing_history_is_rejected() {
        let params = NetworkParams::reddcoin();
        let chain = steady_chain(500, 3, 60, params.genesis_nbits);
        assert_eq!(
            resolve_many(&params, &[], &chain),
            Err(ChainError::MissingHistory { height: 500 })
        );
    }

    #[test]
    fn test_broken_seam_is_rejected() {
        let params = NetworkParams::reddcoin();
        let chain = steady_chain(500, 10, 60, params.genesis_nbits);
        assert!(matches!(
            resolve_many(&params, &chain[..4], &chain[5..]),
            Err(ChainError::NonContiguous { index: 4, .. })
        ));
    }

    #[test]
    fn test_highest_height_is_checked_without_overflow() {
        let params = NetworkParams::reddcoin();
        let chain: Vec<BlockHeader> = (u64::MAX - 20..=u64::MAX)
            .map(|h| BlockHeader::new(h, START_TIME, params.genesis_nbits))
            .collect();
        let batch = resolve_many(&params, &chain[..20], &chain[20..]).unwrap();
        assert_eq!(batch, vec![None]);
    }

    #[test]
    fn test_empty_batch() {
        let params = NetworkParams::reddcoin();
        let prev = steady_chain(10, 5, 60, params.genesis_nbits);
        assert_eq!(resolve_many(&params, &prev, &[]), Ok(vec![]));
    }
}
