// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Granule-position arithmetic with Ogg's dual-range ordering: all values
//! except -1 are valid, -1 means "invalid/unknown", and the negative range
//! sorts entirely above the non-negative range. Modeled on libopusfile's
//! `op_granpos_add`/`op_granpos_diff`/`op_granpos_cmp`.

use waveframe_core::error::{Error, Result};

const INVALID: i64 = -1;

fn is_valid(g: i64) -> bool {
    g != INVALID
}

/// Adds `delta` to `src`, preserving the dual-range ordering and failing
/// rather than silently wrapping into -1 or out of range.
pub fn granpos_add(src: i64, delta: i64) -> Result<i64> {
    if !is_valid(src) {
        return Err(Error::BadFormat("granpos_add on invalid granule"));
    }
    let (result, overflow) = src.overflowing_add(delta);
    if overflow || result == INVALID {
        return Err(Error::BadFormat("granpos_add overflowed"));
    }
    Ok(result)
}

/// Computes `a - b` respecting the dual-range ordering: the negative range
/// is treated as sorting above the non-negative range, so a difference that
/// crosses ranges is computed as if the number line were rotated.
pub fn granpos_diff(a: i64, b: i64) -> Result<i64> {
    if !is_valid(a) || !is_valid(b) {
        return Err(Error::BadFormat("granpos_diff on invalid granule"));
    }
    if (a >= 0) == (b >= 0) {
        a.checked_sub(b).ok_or(Error::BadFormat("granpos_diff exceeded i64 range"))
    } else if a < 0 {
        // a is in the "greater" negative range, b in the non-negative range:
        // difference is positive, computed via the wrap distance.
        let dist_a = a.wrapping_sub(i64::MIN) as u64; // distance from i64::MIN
        let dist_b = b as u64;
        let total = dist_a.checked_add(dist_b).ok_or(Error::BadFormat("granpos_diff exceeded i64 range"))?;
        i64::try_from(total).map_err(|_| Error::BadFormat("granpos_diff exceeded i64 range"))
    } else {
        granpos_diff(b, a).map(|d| -d)
    }
}

/// Compares two granules under the rule that any negative value (other than
/// -1, which is invalid) sorts greater than any non-negative value.
pub fn granpos_cmp(a: i64, b: i64) -> i32 {
    match (a >= 0, b >= 0) {
        (true, true) | (false, false) => {
            if a < b {
                -1
            } else if a > b {
                1
            } else {
                0
            }
        }
        (true, false) => -1,
        (false, true) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmp_is_antisymmetric_and_reflexive() {
        let samples = [0i64, 1, 1000, i64::MAX, -2, -1000, i64::MIN];
        for &a in &samples {
            for &b in &samples {
                assert_eq!(granpos_cmp(a, a), 0);
                assert_eq!(granpos_cmp(a, b), -granpos_cmp(b, a));
            }
        }
    }

    #[test]
    fn negative_range_sorts_above_non_negative() {
        assert_eq!(granpos_cmp(-1000, i64::MAX), 1);
        assert_eq!(granpos_cmp(i64::MAX, -1000), -1);
    }

    #[test]
    fn diff_within_negative_range() {
        assert_eq!(granpos_diff(-1000, -500).unwrap(), -500);
    }

    #[test]
    fn add_rejects_invalid_source() {
        assert!(granpos_add(-1, 1).is_err());
    }

    #[test]
    fn round_trip_add_then_subtract() {
        for &(src, delta) in &[(100i64, 50i64), (0, 10), (1_000_000, -999_999)] {
            let added = granpos_add(src, delta).unwrap();
            let back = granpos_add(added, -delta).unwrap();
            assert_eq!(back, src);
        }
    }
}
