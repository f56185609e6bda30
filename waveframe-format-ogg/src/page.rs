// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ogg page structure per RFC 3533: capture pattern, header fields, segment
//! table, and CRC-32 validation.

use waveframe_core::checksum::Crc32NoReflect;
use waveframe_core::error::{Error, Result};

pub const CAPTURE_PATTERN: &[u8; 4] = b"OggS";

pub const HEADER_CONTINUED: u8 = 0x01;
pub const HEADER_BOS: u8 = 0x02;
pub const HEADER_EOS: u8 = 0x04;

#[derive(Debug, Clone)]
pub struct OggPage {
    pub header_type: u8,
    pub granule_position: i64,
    pub serial: u32,
    pub sequence: u32,
    pub segments: Vec<Vec<u8>>,
    /// True when the last entry in the segment table was a full 255-byte
    /// lacing value, meaning `segments.last()` is not yet a complete packet
    /// and continues on the next page.
    pub last_segment_continues: bool,
    /// File offset the page started at.
    pub start_offset: u64,
    /// File offset one past the page's last byte.
    pub end_offset: u64,
}

impl OggPage {
    pub fn is_continued(&self) -> bool {
        self.header_type & HEADER_CONTINUED != 0
    }

    pub fn is_bos(&self) -> bool {
        self.header_type & HEADER_BOS != 0
    }

    pub fn is_eos(&self) -> bool {
        self.header_type & HEADER_EOS != 0
    }

    /// Concatenates all lacing segments into one payload buffer (a page may
    /// carry multiple packets, or a packet may span pages; this only
    /// flattens this page's bytes — packet reassembly is the demuxer's job).
    pub fn payload(&self) -> Vec<u8> {
        self.segments.concat()
    }
}

/// Parses one Ogg page starting at the current position of `reader`, which
/// must already be positioned at a `"OggS"` capture pattern. `start_offset`
/// is the file offset the capture pattern begins at.
pub fn parse_page(bytes: &[u8], start_offset: u64) -> Result<OggPage> {
    if bytes.len() < 27 {
        return Err(Error::Truncated("ogg page header truncated"));
    }
    if &bytes[0..4] != CAPTURE_PATTERN {
        return Err(Error::BadFormat("ogg page missing capture pattern"));
    }
    let version = bytes[4];
    if version != 0 {
        return Err(Error::Unsupported("ogg page version other than 0"));
    }
    let header_type = bytes[5];
    let granule_position = i64::from_le_bytes(bytes[6..14].try_into().unwrap());
    let serial = u32::from_le_bytes(bytes[14..18].try_into().unwrap());
    let sequence = u32::from_le_bytes(bytes[18..22].try_into().unwrap());
    let stored_crc = u32::from_le_bytes(bytes[22..26].try_into().unwrap());
    let segment_count = bytes[26] as usize;

    if bytes.len() < 27 + segment_count {
        return Err(Error::Truncated("ogg segment table truncated"));
    }
    let segment_table = &bytes[27..27 + segment_count];
    let payload_len: usize = segment_table.iter().map(|&b| b as usize).sum();
    let payload_start = 27 + segment_count;
    if bytes.len() < payload_start + payload_len {
        return Err(Error::Truncated("ogg page payload truncated"));
    }
    let payload = &bytes[payload_start..payload_start + payload_len];

    let mut crc = Crc32NoReflect::new();
    crc.update_buf(&bytes[0..22]);
    crc.update_buf(&[0, 0, 0, 0]); // CRC field itself is zeroed during computation
    crc.update_buf(&bytes[26..payload_start + payload_len]);
    if crc.get() != stored_crc {
        return Err(Error::Corrupted("ogg page CRC mismatch"));
    }

    let mut segments = Vec::new();
    let mut cursor = 0usize;
    let mut current = Vec::new();
    let mut last_segment_continues = false;
    for &seg_len in segment_table {
        current.extend_from_slice(&payload[cursor..cursor + seg_len as usize]);
        cursor += seg_len as usize;
        last_segment_continues = seg_len == 255;
        if seg_len < 255 {
            segments.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }

    Ok(OggPage {
        header_type,
        granule_position,
        serial,
        sequence,
        segments,
        last_segment_continues,
        start_offset,
        end_offset: start_offset + (payload_start + payload_len) as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_page(granule: i64, serial: u32, sequence: u32, payload: &[u8], header_type: u8) -> Vec<u8> {
        let mut segment_table = Vec::new();
        let mut remaining = payload.len();
        if remaining == 0 {
            segment_table.push(0);
        }
        while remaining > 0 {
            let take = remaining.min(255);
            segment_table.push(take as u8);
            remaining -= take;
            if take < 255 {
                break;
            }
        }

        let mut header = Vec::new();
        header.extend_from_slice(CAPTURE_PATTERN);
        header.push(0); // version
        header.push(header_type);
        header.extend_from_slice(&granule.to_le_bytes());
        header.extend_from_slice(&serial.to_le_bytes());
        header.extend_from_slice(&sequence.to_le_bytes());
        header.extend_from_slice(&[0, 0, 0, 0]); // crc placeholder
        header.push(segment_table.len() as u8);
        header.extend_from_slice(&segment_table);
        header.extend_from_slice(payload);

        let mut crc = Crc32NoReflect::new();
        crc.update_buf(&header[0..22]);
        crc.update_buf(&[0, 0, 0, 0]);
        crc.update_buf(&header[26..]);
        header[22..26].copy_from_slice(&crc.get().to_le_bytes());
        header
    }

    #[test]
    fn parses_single_segment_page() {
        let bytes = build_page(12345, 1, 0, b"hello ogg", HEADER_BOS);
        let page = parse_page(&bytes, 0).unwrap();
        assert_eq!(page.granule_position, 12345);
        assert_eq!(page.serial, 1);
        assert!(page.is_bos());
        assert_eq!(page.payload(), b"hello ogg".to_vec());
    }

    #[test]
    fn rejects_corrupted_crc() {
        let mut bytes = build_page(1, 1, 0, b"payload data", 0);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(parse_page(&bytes, 0), Err(Error::Corrupted(_))));
    }

    #[test]
    fn splits_segments_on_sub_255_lacing_value() {
        let payload = vec![0xABu8; 255 + 10];
        let bytes = build_page(1, 1, 0, &payload, 0);
        let page = parse_page(&bytes, 0).unwrap();
        assert_eq!(page.segments.len(), 1);
        assert_eq!(page.payload().len(), 265);
    }
}
