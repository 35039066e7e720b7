//! Lexicographic byte-key arithmetic.
//!
//! Keys are treated as fixed-point unsigned integers: both bounds are right
//! padded with zero bytes to a common length and read big-endian. An open end
//! bound becomes `1 << (8 * len)`, i.e. one past the largest key of that
//! length. When the numeric width of a range is below double precision, every
//! value is widened by whole bytes so that `fraction * width` does not
//! collapse to zero.

use crate::{ByteKey, Error, Result};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

/// Bits of precision carried by a `f64` mantissa.
const F64_MANTISSA_BITS: u64 = 53;

fn padded_int(key: &[u8], len: usize) -> BigUint {
    let mut bytes = Vec::with_capacity(len);
    bytes.extend_from_slice(key);
    bytes.resize(len, 0);
    BigUint::from_bytes_be(&bytes)
}

struct Operands {
    start: BigUint,
    width: BigUint,
    len: usize,
}

fn operands(start: &ByteKey, end: &ByteKey, min_len: usize) -> Option<Operands> {
    let len = start.len().max(end.len()).max(min_len);
    let start_int = padded_int(start.as_bytes(), len);
    let end_int = if end.is_empty() {
        BigUint::from(1_u8) << (8 * len)
    } else {
        padded_int(end.as_bytes(), len)
    };
    if end_int <= start_int {
        return None;
    }
    Some(Operands {
        width: end_int - &start_int,
        start: start_int,
        len,
    })
}

/// Returns the key at `fraction` of the way from `start` to `end`.
///
/// The result has at least `max(start.len(), end.len())` bytes of precision;
/// trailing zero bytes beyond that are trimmed.
pub(crate) fn interpolate(start: &ByteKey, end: &ByteKey, fraction: f64) -> Result<ByteKey> {
    if !(0.0..1.0).contains(&fraction) {
        return Err(Error::malformed(
            start,
            end,
            format!("fraction {fraction} outside [0, 1)"),
        ));
    }
    let Some(Operands {
        start: mut start_int,
        mut width,
        mut len,
    }) = operands(start, end, 0)
    else {
        return Err(Error::malformed(start, end, "cannot interpolate an empty range"));
    };

    let bits = width.bits();
    if bits < F64_MANTISSA_BITS {
        let extra = ((F64_MANTISSA_BITS - bits).div_ceil(8)) as usize;
        start_int <<= 8 * extra;
        width <<= 8 * extra;
        len += extra;
    }

    let scale = (fraction * (1_u64 << F64_MANTISSA_BITS) as f64) as u64;
    let offset = (width * BigUint::from(scale)) >> F64_MANTISSA_BITS;
    let value = start_int + offset;

    let raw = value.to_bytes_be();
    let mut out = vec![0_u8; len.saturating_sub(raw.len())];
    out.extend_from_slice(&raw[raw.len().saturating_sub(len)..]);

    let keep = start.len().max(end.len());
    while out.len() > keep && out.last() == Some(&0) {
        out.pop();
    }
    Ok(ByteKey::from(out))
}

/// Estimates where `key` sits between `start` and `end`, in `[0, 1]`.
pub(crate) fn fraction_of(start: &ByteKey, end: &ByteKey, key: &ByteKey) -> f64 {
    if key <= start {
        return 0.0;
    }
    if !end.is_empty() && key >= end {
        return 1.0;
    }
    let Some(Operands { start: s, width, len }) = operands(start, end, key.len()) else {
        return 0.0;
    };
    let position = padded_int(key.as_bytes(), len);
    if position <= s || width.is_zero() {
        return 0.0;
    }
    let offset = position - s;

    // Only the top 64 bits of the width matter for a f64 ratio.
    let shift = width.bits().saturating_sub(64);
    let num = (offset >> shift).to_f64().unwrap_or(0.0);
    let den = (width >> shift).to_f64().unwrap_or(f64::INFINITY);
    (num / den).clamp(0.0, 1.0)
}

/// Produces `count + 1` strictly increasing boundaries from `start` to `end`,
/// dividing the range into `count` lexicographically even parts.
pub(crate) fn split_evenly(start: &ByteKey, end: &ByteKey, count: usize) -> Result<Vec<ByteKey>> {
    if count == 0 {
        return Err(Error::malformed(start, end, "split count must be positive"));
    }
    if !end.is_empty() && start >= end {
        return Err(Error::malformed(start, end, "keys not in order"));
    }
    let mut boundaries = Vec::with_capacity(count.saturating_add(1).min(1 << 16));
    boundaries.push(start.clone());
    for i in 1..count {
        let key = interpolate(start, end, i as f64 / count as f64)?;
        if boundaries.last().is_some_and(|prev| key <= *prev) {
            return Err(Error::malformed(
                start,
                end,
                format!("range too narrow for {count} parts"),
            ));
        }
        boundaries.push(key);
    }
    if !end.is_empty() && boundaries.last().is_some_and(|prev| *prev >= *end) {
        return Err(Error::malformed(
            start,
            end,
            format!("range too narrow for {count} parts"),
        ));
    }
    boundaries.push(end.clone());
    Ok(boundaries)
}
