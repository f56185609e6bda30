// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Opus-in-Ogg header mapping. Opus always runs its internal decode clock
//! at 48 kHz regardless of the container's nominal input rate; granule
//! positions are 48 kHz sample counts minus `pre_skip`.

use std::collections::BTreeMap;

use waveframe_core::error::{Error, Result};

pub const SIGNATURE: &[u8] = b"OpusHead";
pub const COMMENT_SIGNATURE: &[u8] = b"OpusTags";

pub const GRANULE_RATE_HZ: u32 = 48_000;

pub struct OpusIdentification {
    pub channels: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
}

pub fn parse_identification(packet: &[u8]) -> Result<OpusIdentification> {
    if packet.len() < 19 || &packet[0..8] != SIGNATURE {
        return Err(Error::BadFormat("malformed OpusHead packet"));
    }
    let channels = packet[9];
    let pre_skip = u16::from_le_bytes(packet[10..12].try_into().unwrap());
    let input_sample_rate = u32::from_le_bytes(packet[12..16].try_into().unwrap());
    if channels == 0 {
        return Err(Error::BadFormat("OpusHead has zero channels"));
    }
    Ok(OpusIdentification { channels, pre_skip, input_sample_rate })
}

/// Converts an Opus granule position to milliseconds: the granule is a
/// 48 kHz sample count inclusive of the pre-skip priming samples, which
/// must be subtracted before the timestamp becomes meaningful.
pub fn granule_to_ms(granule: i64, pre_skip: u16) -> u64 {
    let adjusted = (granule - pre_skip as i64).max(0) as u64;
    adjusted * 1000 / GRANULE_RATE_HZ as u64
}

pub fn parse_comment(packet: &[u8]) -> Result<BTreeMap<String, String>> {
    if packet.len() < 12 || &packet[0..8] != COMMENT_SIGNATURE {
        return Err(Error::BadFormat("malformed OpusTags packet"));
    }
    let mut cursor = 8usize;
    let vendor_len = read_u32_le(packet, cursor)? as usize;
    cursor += 4 + vendor_len;
    let comment_count = read_u32_le(packet, cursor)? as usize;
    cursor += 4;

    let mut map = BTreeMap::new();
    for _ in 0..comment_count {
        let len = read_u32_le(packet, cursor)? as usize;
        cursor += 4;
        let bytes = packet.get(cursor..cursor + len).ok_or(Error::Truncated("opus comment entry truncated"))?;
        cursor += len;
        let entry = String::from_utf8_lossy(bytes);
        if let Some((key, value)) = entry.split_once('=') {
            map.insert(key.to_ascii_uppercase(), value.to_string());
        }
    }
    Ok(map)
}

fn read_u32_le(bytes: &[u8], at: usize) -> Result<u32> {
    let slice = bytes.get(at..at + 4).ok_or(Error::Truncated("opus comment length field truncated"))?;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granule_to_ms_subtracts_pre_skip() {
        assert_eq!(granule_to_ms(48_312, 312), 1000);
    }

    #[test]
    fn granule_to_ms_clamps_below_pre_skip() {
        assert_eq!(granule_to_ms(100, 312), 0);
    }

    #[test]
    fn parses_identification_header() {
        let mut p = Vec::new();
        p.extend_from_slice(SIGNATURE);
        p.push(1); // version
        p.push(2); // channels
        p.extend_from_slice(&312u16.to_le_bytes()); // pre-skip
        p.extend_from_slice(&48000u32.to_le_bytes()); // input sample rate
        p.extend_from_slice(&0i16.to_le_bytes()); // output gain
        p.push(0); // channel mapping family
        let id = parse_identification(&p).unwrap();
        assert_eq!(id.channels, 2);
        assert_eq!(id.pre_skip, 312);
    }
}
