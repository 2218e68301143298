// Compact Target Encoding
// =======================
//
// Conversion between the 32-bit "nBits" field carried in block headers and the
// full-width target it stands for. The bit layout follows the Reddcoin reference
// node, including two quirks that differ from the usual compact-float rules:
// a mantissa below 0x8000 is scaled up by one byte on decode, and the encoder
// never clears a sign bit, it only shifts a wide mantissa down by one byte.

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};

/// Number of bytes in a rendered target (64 hex digits).
const TARGET_BYTES: usize = 32;

/// Widest target the compact encoding covers.
const TARGET_BITS: u64 = 256;

/// Mantissa values at or above this would have their top bit read as a sign.
const MANTISSA_SIGN_THRESHOLD: u32 = 0x0080_0000;

/// Mantissa values below this are scaled by 256 when decoding.
const MANTISSA_SCALE_THRESHOLD: u32 = 0x8000;

/// Encodes a target as compact nBits.
///
/// The target is treated as a 32-byte big-endian value. Every leading zero byte
/// lowers the exponent by one starting from 32, and the next three bytes become
/// the mantissa. The encoding keeps only three significant bytes, so it is lossy.
///
/// Targets wider than 256 bits are outside the domain of the encoding and are
/// clamped to `2^256 - 1`; use [`checked_target_to_nbits`] to reject them.
pub fn target_to_nbits(target: &BigUint) -> u32 {
    checked_target_to_nbits(target).unwrap_or_else(|| {
        let widest = (BigUint::one() << TARGET_BITS) - 1u32;
        encode_significant(&widest.to_bytes_be())
    })
}

/// Encodes a target as compact nBits, or returns `None` when it does not fit
/// in 256 bits.
pub fn checked_target_to_nbits(target: &BigUint) -> Option<u32> {
    if target.bits() > TARGET_BITS {
        return None;
    }
    if target.is_zero() {
        return Some(0);
    }
    Some(encode_significant(&target.to_bytes_be()))
}

/// Packs the big-endian significant bytes of a non-zero target of at most 32
/// bytes.
fn encode_significant(significant: &[u8]) -> u32 {
    let mut exponent = significant.len() as u32;
    let mut mantissa = significant
        .iter()
        .take(3)
        .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte));

    if mantissa >= MANTISSA_SIGN_THRESHOLD {
        mantissa >>= 8;
        exponent += 1;
    }

    (exponent << 24) | mantissa
}

/// Decodes compact nBits into the target it represents.
///
/// Exponents below 3 shift the mantissa right, dropping the fractional part.
pub fn nbits_to_target(nbits: u32) -> BigUint {
    let exponent = nbits >> 24;
    let mut mantissa = nbits & 0x00ff_ffff;
    // Short mantissas are read one byte higher.
    if mantissa < MANTISSA_SCALE_THRESHOLD {
        mantissa *= 256;
    }

    let mantissa = BigUint::from(mantissa);
    if exponent >= 3 {
        mantissa << (8 * (exponent - 3) as usize)
    } else {
        mantissa >> (8 * (3 - exponent) as usize)
    }
}

/// The difficulty-1 target `0xFFFF * 2^208`.
pub fn difficulty_one_target() -> BigUint {
    BigUint::from(0xffffu32) << 208
}

/// Expresses a target as a floating point difficulty relative to the
/// difficulty-1 target. A zero target has infinite difficulty.
pub fn difficulty(target: &BigUint) -> f64 {
    if target.is_zero() {
        return f64::INFINITY;
    }
    let numerator = difficulty_one_target().to_f64().unwrap_or(f64::INFINITY);
    let denominator = target.to_f64().unwrap_or(f64::INFINITY);
    numerator / denominator
}

/// Parses a big-endian hex target, with or without a `0x` prefix.
///
/// Leading zeros are accepted, but a value wider than 256 bits is rejected
/// with `InvalidStringLength`.
pub fn target_from_hex(hex_str: &str) -> Result<BigUint, hex::FromHexError> {
    let digits = hex_str
        .strip_prefix("0x")
        .or_else(|| hex_str.strip_prefix("0X"))
        .unwrap_or(hex_str);
    let bytes = if digits.len() % 2 == 1 {
        hex::decode(format!("0{digits}"))?
    } else {
        hex::decode(digits)?
    };
    let target = BigUint::from_bytes_be(&bytes);
    if target.bits() > TARGET_BITS {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    Ok(target)
}

/// Renders a target as 64 hex digits, zero padded.
pub fn target_to_hex(target: &BigUint) -> String {
    let bytes = target.to_bytes_be();
    if bytes.len() >= TARGET_BYTES {
        return hex::encode(bytes);
    }
    let mut padded = vec![0u8; TARGET_BYTES - bytes.len()];
    padded.extend_from_slice(&bytes);
    hex::encode(padded)
}

/// Serde adapter writing targets as 64-digit hex strings.
pub mod target_hex {
    use num_bigint::BigUint;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::{target_from_hex, target_to_hex};

    pub fn serialize<S: Serializer>(target: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&target_to_hex(target))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        target_from_hex(&encoded)
            .map_err(|e| D::Error::custom(format!("invalid target {encoded:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn max_target() -> BigUint {
        (BigUint::one() << 236) - 1u32
    }

    #[test]
    fn test_genesis_bits_decode() {
        let target = nbits_to_target(0x1e0ffff0);
        let expected = BigUint::from_bytes_be(&hex!(
            "00000ffff0000000000000000000000000000000000000000000000000000000"
        ));
        assert_eq!(target, expected);
        assert_eq!(target_to_nbits(&target), 0x1e0ffff0);
    }

    #[test]
    fn test_max_target_encodes_to_max_bits() {
        assert_eq!(target_to_nbits(&max_target()), 0x1e0fffff);
    }

    #[test]
    fn test_posv_reset_target_encodes_to_reset_bits() {
        let reset = (BigUint::one() << 224) - 1u32;
        assert_eq!(target_to_nbits(&reset), 0x1d00ffff);
    }

    #[test]
    fn test_wide_mantissa_shifts_one_byte() {
        // 0x80 in the top significant byte must not be taken as a sign bit.
        let target = BigUint::from(0x80u32) << 200;
        let nbits = target_to_nbits(&target);
        assert_eq!(nbits, 0x1b00_8000);
        assert_eq!(nbits_to_target(nbits), target);
    }

    #[test]
    fn test_small_mantissa_is_scaled() {
        // Mantissa 0x1234 sits below 0x8000 and decodes one byte higher.
        let target = nbits_to_target(0x1d00_1234);
        assert_eq!(target, BigUint::from(0x12_3400u32) << 208);
    }

    #[test]
    fn test_low_exponent_shifts_right() {
        assert_eq!(nbits_to_target(0x0212_3456), BigUint::from(0x1234u32));
        assert_eq!(nbits_to_target(0x0112_3456), BigUint::from(0x12u32));
    }

    #[test]
    fn test_short_targets() {
        let target = BigUint::from(0x1234u32);
        assert_eq!(target_to_nbits(&target), 0x0200_1234);
        assert_eq!(nbits_to_target(0x0200_1234), target);
        assert_eq!(target_to_nbits(&BigUint::zero()), 0);
        assert_eq!(nbits_to_target(0), BigUint::zero());
    }

    #[test]
    fn test_lossy_roundtrip_drops_low_bytes() {
        let target = BigUint::from_bytes_be(&hex!(
            "000000000123456789abcdef0000000000000000000000000000000000000001"
        ));
        let decoded = nbits_to_target(target_to_nbits(&target));
        assert_eq!(
            decoded,
            BigUint::from_bytes_be(&hex!(
                "0000000001234500000000000000000000000000000000000000000000000000"
            ))
        );
        assert!(decoded <= target);
    }

    #[test]
    fn test_difficulty_of_reference_targets() {
        assert_eq!(difficulty(&difficulty_one_target()), 1.0);
        let min_difficulty = difficulty(&max_target());
        assert!((min_difficulty - 0xffff as f64 / 2f64.powi(28)).abs() < 1e-12);
        assert!(difficulty(&BigUint::zero()).is_infinite());
    }

    #[test]
    fn test_hex_helpers() {
        let target =
            target_from_hex("0x00000FFFF0000000000000000000000000000000000000000000000000000000")
                .unwrap();
        assert_eq!(target, nbits_to_target(0x1e0ffff0));
        assert_eq!(
            target_to_hex(&target),
            "00000ffff0000000000000000000000000000000000000000000000000000000"
        );
        assert_eq!(target_from_hex("fff").unwrap(), BigUint::from(0xfffu32));
        assert!(target_from_hex("zz").is_err());
    }

    #[test]
    fn test_wide_targets_are_clamped_or_rejected() {
        let too_wide = BigUint::one() << 256;
        assert_eq!(checked_target_to_nbits(&too_wide), None);
        assert_eq!(target_to_nbits(&too_wide), 0x2100_ffff);
        assert_eq!(
            checked_target_to_nbits(&max_target()),
            Some(target_to_nbits(&max_target()))
        );
        assert_eq!(checked_target_to_nbits(&BigUint::zero()), Some(0));
    }

    #[test]
    fn test_hex_wider_than_256_bits_is_rejected() {
        let widest = "f".repeat(64);
        assert_eq!(
            target_from_hex(&widest).unwrap(),
            (BigUint::one() << 256) - 1u32
        );
        assert_eq!(
            target_from_hex(&format!("1{widest}")),
            Err(hex::FromHexError::InvalidStringLength)
        );
        // Leading zeros do not widen the value.
        assert!(target_from_hex(&format!("0000{widest}")).is_ok());
    }
}
