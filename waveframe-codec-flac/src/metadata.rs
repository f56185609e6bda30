// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! FLAC metadata block parsing per RFC 9639 §8: the block header, STREAMINFO,
//! SEEKTABLE, and VORBIS_COMMENT payloads.

use std::collections::BTreeMap;

use waveframe_core::error::{Error, Result};

pub const BLOCK_TYPE_STREAMINFO: u8 = 0;
pub const BLOCK_TYPE_PADDING: u8 = 1;
pub const BLOCK_TYPE_APPLICATION: u8 = 2;
pub const BLOCK_TYPE_SEEKTABLE: u8 = 3;
pub const BLOCK_TYPE_VORBIS_COMMENT: u8 = 4;
pub const BLOCK_TYPE_CUESHEET: u8 = 5;
pub const BLOCK_TYPE_PICTURE: u8 = 6;

pub const SEEKPOINT_PLACEHOLDER: u64 = 0xFFFF_FFFF_FFFF_FFFF;

#[derive(Debug, Clone, Copy)]
pub struct BlockHeader {
    pub is_last: bool,
    pub block_type: u8,
    pub length: u32,
}

/// Parses a 4-byte metadata block header: `last_flag:1 | type:7 | length:24`.
pub fn parse_block_header(bytes: &[u8; 4]) -> BlockHeader {
    let is_last = bytes[0] & 0x80 != 0;
    let block_type = bytes[0] & 0x7F;
    let length = u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]);
    BlockHeader { is_last, block_type, length }
}

#[derive(Debug, Clone, Default)]
pub struct StreamInfoBlock {
    pub min_block_size: u16,
    pub max_block_size: u16,
    pub min_frame_size: u32,
    pub max_frame_size: u32,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    pub total_samples: u64,
    pub md5: [u8; 16],
}

/// Parses the 34-byte STREAMINFO payload.
pub fn parse_streaminfo(bytes: &[u8]) -> Result<StreamInfoBlock> {
    if bytes.len() < 34 {
        return Err(Error::Truncated("STREAMINFO block shorter than 34 bytes"));
    }
    let min_block_size = u16::from_be_bytes([bytes[0], bytes[1]]);
    let max_block_size = u16::from_be_bytes([bytes[2], bytes[3]]);
    let min_frame_size = u32::from_be_bytes([0, bytes[4], bytes[5], bytes[6]]);
    let max_frame_size = u32::from_be_bytes([0, bytes[7], bytes[8], bytes[9]]);

    // Packed 64 bits: sample_rate:20 | channels-1:3 | bits_per_sample-1:5 | total_samples:36
    let packed = u64::from_be_bytes(bytes[10..18].try_into().unwrap());
    let sample_rate = ((packed >> 44) & 0xFFFFF) as u32;
    let channels = (((packed >> 41) & 0x7) + 1) as u8;
    let bits_per_sample = (((packed >> 36) & 0x1F) + 1) as u8;
    let total_samples = packed & 0xF_FFFF_FFFF;

    if sample_rate == 0 {
        return Err(Error::BadFormat("STREAMINFO sample rate is zero"));
    }

    let mut md5 = [0u8; 16];
    md5.copy_from_slice(&bytes[18..34]);

    Ok(StreamInfoBlock {
        min_block_size,
        max_block_size,
        min_frame_size,
        max_frame_size,
        sample_rate,
        channels,
        bits_per_sample,
        total_samples,
        md5,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPoint {
    pub sample_number: u64,
    pub byte_offset: u64,
    pub frame_samples: u16,
}

/// Parses the SEEKTABLE block, skipping placeholder entries.
pub fn parse_seektable(bytes: &[u8]) -> Result<Vec<SeekPoint>> {
    if bytes.len() % 18 != 0 {
        return Err(Error::BadFormat("SEEKTABLE length is not a multiple of 18"));
    }
    let mut points = Vec::with_capacity(bytes.len() / 18);
    for chunk in bytes.chunks_exact(18) {
        let sample_number = u64::from_be_bytes(chunk[0..8].try_into().unwrap());
        if sample_number == SEEKPOINT_PLACEHOLDER {
            continue;
        }
        let byte_offset = u64::from_be_bytes(chunk[8..16].try_into().unwrap());
        let frame_samples = u16::from_be_bytes([chunk[16], chunk[17]]);
        points.push(SeekPoint { sample_number, byte_offset, frame_samples });
    }
    points.sort_by_key(|p| p.sample_number);
    Ok(points)
}

/// Parses the VORBIS_COMMENT block (the same tag format used in Ogg Vorbis
/// and Ogg Opus comment headers): a vendor string followed by `KEY=value`
/// pairs. Keys are upper-cased so lookups are case-insensitive, matching the
/// Vorbis comment format's own case-insensitive key convention.
pub fn parse_vorbis_comment(bytes: &[u8]) -> Result<BTreeMap<String, String>> {
    if bytes.len() < 4 {
        return Err(Error::Truncated("VORBIS_COMMENT block truncated before vendor length"));
    }
    let vendor_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let mut pos = 4 + vendor_len;
    if bytes.len() < pos + 4 {
        return Err(Error::Truncated("VORBIS_COMMENT block truncated before comment count"));
    }
    let comment_count = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
    pos += 4;

    let mut map = BTreeMap::new();
    for _ in 0..comment_count {
        if bytes.len() < pos + 4 {
            return Err(Error::Truncated("VORBIS_COMMENT entry length truncated"));
        }
        let entry_len = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        if bytes.len() < pos + entry_len {
            return Err(Error::Truncated("VORBIS_COMMENT entry truncated"));
        }
        let entry = std::str::from_utf8(&bytes[pos..pos + entry_len])
            .map_err(|_| Error::BadFormat("VORBIS_COMMENT entry is not valid UTF-8"))?;
        pos += entry_len;
        if let Some((key, value)) = entry.split_once('=') {
            map.insert(key.to_ascii_uppercase(), value.to_string());
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_streaminfo(sample_rate: u32, channels: u8, bits: u8, total_samples: u64) -> Vec<u8> {
        let mut bytes = vec![0u8; 34];
        bytes[0..2].copy_from_slice(&4096u16.to_be_bytes());
        bytes[2..4].copy_from_slice(&4096u16.to_be_bytes());
        let packed: u64 = ((sample_rate as u64 & 0xFFFFF) << 44)
            | (((channels - 1) as u64 & 0x7) << 41)
            | (((bits - 1) as u64 & 0x1F) << 36)
            | (total_samples & 0xF_FFFF_FFFF);
        bytes[10..18].copy_from_slice(&packed.to_be_bytes());
        bytes
    }

    #[test]
    fn parses_block_header_fields() {
        let header = parse_block_header(&[0x84, 0x00, 0x00, 0x22]);
        assert!(header.is_last);
        assert_eq!(header.block_type, BLOCK_TYPE_VORBIS_COMMENT);
        assert_eq!(header.length, 0x22);
    }

    #[test]
    fn parses_streaminfo_fields() {
        let bytes = build_streaminfo(44_100, 2, 16, 1_234_567);
        let info = parse_streaminfo(&bytes).unwrap();
        assert_eq!(info.sample_rate, 44_100);
        assert_eq!(info.channels, 2);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(info.total_samples, 1_234_567);
    }

    #[test]
    fn seektable_skips_placeholder_entries() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&100u64.to_be_bytes());
        bytes.extend_from_slice(&500u64.to_be_bytes());
        bytes.extend_from_slice(&4096u16.to_be_bytes());
        bytes.extend_from_slice(&SEEKPOINT_PLACEHOLDER.to_be_bytes());
        bytes.extend_from_slice(&0u64.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        let points = parse_seektable(&bytes).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].sample_number, 100);
    }

    #[test]
    fn parses_vorbis_comment_tags() {
        let mut bytes = Vec::new();
        let vendor = b"waveframe";
        bytes.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        bytes.extend_from_slice(vendor);
        bytes.extend_from_slice(&1u32.to_le_bytes());
        let tag = b"ARTIST=Test Artist";
        bytes.extend_from_slice(&(tag.len() as u32).to_le_bytes());
        bytes.extend_from_slice(tag);
        let map = parse_vorbis_comment(&bytes).unwrap();
        assert_eq!(map.get("ARTIST"), Some(&"Test Artist".to_string()));
    }
}
