// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Vorbis header-packet mapping: identification header fields and the
//! comment-header vendor/tag pairs, which feed `StreamInfo` and the
//! metadata map respectively.

use std::collections::BTreeMap;

use waveframe_core::error::{Error, Result};

pub const SIGNATURE: &[u8] = b"\x01vorbis";
pub const COMMENT_SIGNATURE: &[u8] = b"\x03vorbis";

pub struct VorbisIdentification {
    pub sample_rate: u32,
    pub channels: u8,
}

pub fn parse_identification(packet: &[u8]) -> Result<VorbisIdentification> {
    if packet.len() < 30 || &packet[0..7] != SIGNATURE {
        return Err(Error::BadFormat("malformed vorbis identification header"));
    }
    let channels = packet[11];
    let sample_rate = u32::from_le_bytes(packet[12..16].try_into().unwrap());
    if channels == 0 || sample_rate == 0 {
        return Err(Error::BadFormat("vorbis identification header has zero channels or rate"));
    }
    Ok(VorbisIdentification { sample_rate, channels })
}

/// Parses a `\x03vorbis` comment header into a vendor string plus tag map.
pub fn parse_comment(packet: &[u8]) -> Result<BTreeMap<String, String>> {
    if packet.len() < 11 || &packet[0..7] != COMMENT_SIGNATURE {
        return Err(Error::BadFormat("malformed vorbis comment header"));
    }
    let mut cursor = 7usize;
    let vendor_len = read_u32_le(packet, cursor)? as usize;
    cursor += 4 + vendor_len;
    let comment_count = read_u32_le(packet, cursor)? as usize;
    cursor += 4;

    let mut map = BTreeMap::new();
    for _ in 0..comment_count {
        let len = read_u32_le(packet, cursor)? as usize;
        cursor += 4;
        let bytes = packet.get(cursor..cursor + len).ok_or(Error::Truncated("comment entry truncated"))?;
        cursor += len;
        let entry = String::from_utf8_lossy(bytes);
        if let Some((key, value)) = entry.split_once('=') {
            map.insert(key.to_ascii_uppercase(), value.to_string());
        }
    }
    Ok(map)
}

fn read_u32_le(bytes: &[u8], at: usize) -> Result<u32> {
    let slice = bytes.get(at..at + 4).ok_or(Error::Truncated("vorbis comment length field truncated"))?;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_id_header(sample_rate: u32, channels: u8) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(SIGNATURE);
        p.extend_from_slice(&0u32.to_le_bytes()); // vorbis version
        p.push(channels);
        p.extend_from_slice(&sample_rate.to_le_bytes());
        p.extend_from_slice(&0i32.to_le_bytes()); // bitrate max
        p.extend_from_slice(&0i32.to_le_bytes()); // bitrate nominal
        p.extend_from_slice(&0i32.to_le_bytes()); // bitrate min
        p.push(0); // blocksize bits
        p.push(1); // framing
        p
    }

    #[test]
    fn parses_identification_header() {
        let packet = build_id_header(44100, 2);
        let id = parse_identification(&packet).unwrap();
        assert_eq!(id.sample_rate, 44100);
        assert_eq!(id.channels, 2);
    }

    fn build_comment_header(vendor: &str, tags: &[(&str, &str)]) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(COMMENT_SIGNATURE);
        p.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        p.extend_from_slice(vendor.as_bytes());
        p.extend_from_slice(&(tags.len() as u32).to_le_bytes());
        for (k, v) in tags {
            let entry = format!("{k}={v}");
            p.extend_from_slice(&(entry.len() as u32).to_le_bytes());
            p.extend_from_slice(entry.as_bytes());
        }
        p
    }

    #[test]
    fn parses_comment_header_tags() {
        let packet = build_comment_header("waveframe encoder", &[("ARTIST", "test"), ("title", "song")]);
        let map = parse_comment(&packet).unwrap();
        assert_eq!(map.get("ARTIST").unwrap(), "test");
        assert_eq!(map.get("TITLE").unwrap(), "song");
    }
}
