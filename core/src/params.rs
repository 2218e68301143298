// Reddcoin Network Parameters
// ===========================
//
// This module defines the constants the Kimoto Gravity Well retarget depends on.
// They are held in an immutable value that callers pass into every resolver, so
// a verifier can be pointed at a different parameter set without global state.

use num_bigint::BigUint;
use num_traits::One;
use serde::{Deserialize, Serialize};

use crate::{compact, retarget::Retarget};

/// Stores the difficulty parameters of a KGW network.
///
/// The defaults are the Reddcoin mainnet values. The chain switched from proof of
/// work to proof of stake velocity after `last_pow_block`; the first blocks after
/// the switch are pinned to `posv_reset_target` until enough PoSV history exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    /// Length of a day in seconds, the unit of the averaging window schedule.
    pub time_day_seconds: u64,

    /// Designed spacing between blocks, in seconds.
    pub target_spacing: u64,

    /// Height of the last proof-of-work block.
    pub last_pow_block: u64,

    /// Next heights up to and including this one use the short early window.
    pub early_window_height: u64,

    /// Highest target a retarget may report (lowest difficulty).
    #[serde(with = "compact::target_hex")]
    pub max_target: BigUint,

    /// Compact bits reported together with `max_target`.
    pub max_nbits: u32,

    /// Target required of the block after the genesis block's empty history.
    #[serde(with = "compact::target_hex")]
    pub genesis_target: BigUint,

    /// Compact bits reported together with `genesis_target`.
    pub genesis_nbits: u32,

    /// Target pinned right after the PoW -> PoSV transition.
    #[serde(with = "compact::target_hex")]
    pub posv_reset_target: BigUint,

    /// Compact bits reported together with `posv_reset_target`.
    pub posv_reset_nbits: u32,
}

impl NetworkParams {
    /// Reddcoin mainnet parameters.
    pub fn reddcoin() -> Self {
        NetworkParams {
            time_day_seconds: 24 * 60 * 60,
            target_spacing: 60,
            last_pow_block: 260_799,
            early_window_height: 6000,
            // 0x00000FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF
            max_target: (BigUint::one() << 236) - 1u32,
            max_nbits: 0x1e0fffff,
            // 0x00000FFFF0000000000000000000000000000000000000000000000000000000
            genesis_target: BigUint::from(0xffffu32) << 220,
            genesis_nbits: 0x1e0ffff0,
            posv_reset_target: (BigUint::one() << 224) - 1u32,
            posv_reset_nbits: 0x1d00ffff,
        }
    }

    /// Returns `(min_blocks, max_blocks)`, the bounds on how many past blocks
    /// feed the average for a block at `next_height`.
    ///
    /// Up to `early_window_height` the window spans 0.01 to 0.14 days, later
    /// 0.25 to 7 days. Each bound is truncated to whole seconds and then to
    /// whole blocks.
    pub fn window_bounds(&self, next_height: u64) -> (u64, u64) {
        let (min_seconds, max_seconds) = if next_height <= self.early_window_height {
            (self.time_day_seconds / 100, self.time_day_seconds * 14 / 100)
        } else {
            (self.time_day_seconds / 4, self.time_day_seconds * 7)
        };

        (
            min_seconds / self.target_spacing,
            max_seconds / self.target_spacing,
        )
    }

    /// True once the chain tip at `last_height` is governed by PoSV rules.
    pub fn is_posv(&self, last_height: u64) -> bool {
        last_height >= self.last_pow_block
    }

    pub fn genesis(&self) -> Retarget {
        Retarget::new(self.genesis_nbits, self.genesis_target.clone())
    }

    pub fn max(&self) -> Retarget {
        Retarget::new(self.max_nbits, self.max_target.clone())
    }

    pub fn posv_reset(&self) -> Retarget {
        Retarget::new(self.posv_reset_nbits, self.posv_reset_target.clone())
    }

    /// Difficulty of `max_target`, the easiest difficulty the network accepts.
    pub fn min_difficulty(&self) -> f64 {
        compact::difficulty(&self.max_target)
    }

    /// Difficulty of `posv_reset_target`.
    pub fn posv_reset_difficulty(&self) -> f64 {
        compact::difficulty(&self.posv_reset_target)
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self::reddcoin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compact::{nbits_to_target, target_to_nbits};

    #[test]
    fn test_window_bounds_schedule() {
        let params = NetworkParams::reddcoin();
        assert_eq!(params.window_bounds(1), (14, 201));
        assert_eq!(params.window_bounds(6000), (14, 201));
        assert_eq!(params.window_bounds(6001), (360, 10080));
        assert_eq!(params.window_bounds(1_000_000), (360, 10080));
    }

    #[test]
    fn test_constant_pairs() {
        let params = NetworkParams::default();
        assert_eq!(nbits_to_target(params.genesis_nbits), params.genesis_target);
        assert_eq!(target_to_nbits(&params.max_target), params.max_nbits);
        assert_eq!(
            target_to_nbits(&params.posv_reset_target),
            params.posv_reset_nbits
        );
        assert!(params.genesis_target < params.max_target);
        assert!(params.posv_reset_target < params.genesis_target);
    }

    #[test]
    fn test_posv_switch() {
        let params = NetworkParams::reddcoin();
        assert!(!params.is_posv(260_798));
        assert!(params.is_posv(260_799));
    }

    #[test]
    fn test_difficulties() {
        let params = NetworkParams::reddcoin();
        let expected_min = 0xffff as f64 / (2f64.powi(28) - 1.0 / 2f64.powi(208));
        let expected_reset = 0xffff as f64 / (2f64.powi(16) - 1.0 / 2f64.powi(208));
        assert!((params.min_difficulty() - expected_min).abs() < 1e-12);
        assert!((params.posv_reset_difficulty() - expected_reset).abs() < 1e-9);
    }

    #[test]
    fn test_json_roundtrip_uses_hex_targets() {
        let params = NetworkParams::reddcoin();
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(
            json["genesis_target"],
            "00000ffff0000000000000000000000000000000000000000000000000000000"
        );
        let parsed: NetworkParams = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, params);
    }
}
