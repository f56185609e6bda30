// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sample description (`stsd`): the audio sample entry's codec fourcc plus
//! whichever codec-specific setup box follows it — `esds` for AAC, `dfLa`
//! for FLAC-in-MP4, `dOps` for Opus-in-MP4.

use waveframe_core::error::{Error, Result};
use waveframe_core::io::byte_source::{ByteSource, Whence};

use crate::boxes::{read_box_header, read_full_box_header};

#[derive(Debug, Clone)]
pub struct AudioSampleEntry {
    pub codec_fourcc: [u8; 4],
    pub codec_name: &'static str,
    pub channels: u8,
    pub sample_rate: u32,
    pub bits_per_sample: u8,
    /// Raw decoder-specific setup, meaning is codec-dependent: AAC's
    /// `AudioSpecificConfig`, FLAC's STREAMINFO MD5, or the Opus header.
    pub codec_setup: Option<Vec<u8>>,
}

fn codec_name_for_fourcc(fourcc: &[u8; 4]) -> &'static str {
    match fourcc {
        b"mp4a" => "aac",
        b"fLaC" => "flac",
        b"Opus" => "opus",
        b"twos" | b"sowt" | b"in24" | b"in32" | b"raw " | b"NONE" => "pcm",
        _ => "unknown",
    }
}

/// Parses the `stsd` box, keeping only the first audio sample entry (an
/// audio track never has more than one codec in this pipeline's scope).
pub fn parse_stsd(source: &mut dyn ByteSource, end: u64) -> Result<AudioSampleEntry> {
    read_full_box_header(source)?;
    let entry_count = read_u32(source)?;
    if entry_count == 0 {
        return Err(Error::BadFormat("isomp4 stsd: no sample entries"));
    }

    let (entry_header, entry_header_len) = read_box_header(source)?;
    let entry_end = match entry_header.total_len {
        Some(len) => entry_header.start + len,
        None => end,
    };
    let _ = entry_header_len;

    // SampleEntry: reserved[6], data_reference_index:u16.
    let mut reserved = [0u8; 8];
    source.read_exact(&mut reserved)?;

    // AudioSampleEntry body: reserved[8], channelcount:u16, samplesize:u16,
    // pre_defined:u16, reserved:u16, samplerate:u32 (16.16 fixed point).
    let mut body = [0u8; 20];
    source.read_exact(&mut body)?;
    let channels = u16::from_be_bytes([body[8], body[9]]).min(u8::MAX as u16) as u8;
    let bits_per_sample = u16::from_be_bytes([body[10], body[11]]).min(u8::MAX as u16) as u8;
    let sample_rate = u32::from_be_bytes([body[16], body[17], body[18], body[19]]) >> 16;

    let mut entry = AudioSampleEntry {
        codec_fourcc: entry_header.box_type,
        codec_name: codec_name_for_fourcc(&entry_header.box_type),
        channels,
        sample_rate,
        bits_per_sample,
        codec_setup: None,
    };

    while source.tell() + 8 <= entry_end {
        let (child, child_header_len) = read_box_header(source)?;
        let child_len = match child.total_len {
            Some(len) => len.saturating_sub(child_header_len),
            None => entry_end.saturating_sub(source.tell()),
        };
        let child_next = source.tell() + child_len;

        match &child.box_type {
            b"esds" => {
                let esds_end = source.tell() + child_len;
                entry.codec_setup = parse_esds(source, esds_end)?;
            }
            b"dfLa" => {
                if let Some(setup) = parse_dfla(source, child_len)? {
                    entry.sample_rate = setup.sample_rate;
                    entry.channels = setup.channels;
                    entry.bits_per_sample = setup.bits_per_sample;
                    entry.codec_setup = Some(setup.md5.to_vec());
                }
            }
            b"dOps" => {
                let mut setup = vec![0u8; child_len as usize];
                source.read_exact(&mut setup)?;
                entry.codec_setup = Some(setup);
            }
            _ => {}
        }

        let actual = source.tell();
        if actual < child_next {
            source.seek((child_next - actual) as i64, Whence::Current)?;
        }
    }

    if source.tell() < entry_end {
        source.seek((entry_end - source.tell()) as i64, Whence::Current)?;
    }

    Ok(entry)
}

struct DflaSetup {
    sample_rate: u32,
    channels: u8,
    bits_per_sample: u8,
    md5: [u8; 16],
}

/// `dfLa`'s payload, after its full-box header, is one native FLAC metadata
/// block (almost always just STREAMINFO): the same
/// `last_flag:1 | type:7 | length:24` header used in a standalone `.flac`
/// stream, without the leading `fLaC` marker.
fn parse_dfla(source: &mut dyn ByteSource, remaining: u64) -> Result<Option<DflaSetup>> {
    read_full_box_header(source)?;
    if remaining < 4 + 34 {
        return Ok(None);
    }
    let mut header = [0u8; 4];
    source.read_exact(&mut header)?;
    let block_type = header[0] & 0x7F;
    let length = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
    if block_type != 0 || length < 34 {
        return Err(Error::BadFormat("isomp4 dfLa: expected a leading STREAMINFO block"));
    }
    let mut body = vec![0u8; length];
    source.read_exact(&mut body)?;

    let packed = u64::from_be_bytes(body[10..18].try_into().unwrap());
    let sample_rate = ((packed >> 44) & 0xFFFFF) as u32;
    let channels = (((packed >> 41) & 0x7) + 1) as u8;
    let bits_per_sample = (((packed >> 36) & 0x1F) + 1) as u8;
    let mut md5 = [0u8; 16];
    md5.copy_from_slice(&body[18..34]);

    Ok(Some(DflaSetup { sample_rate, channels, bits_per_sample, md5 }))
}

/// Reads an MPEG-4 descriptor's `(tag, length)` header: one tag byte
/// followed by a length encoded as up to four bytes, each carrying 7 bits
/// with the top bit as a continuation flag.
fn read_descriptor_header(source: &mut dyn ByteSource) -> Result<(u8, u32)> {
    let mut tag = [0u8; 1];
    source.read_exact(&mut tag)?;
    let mut len: u32 = 0;
    for _ in 0..4 {
        let mut b = [0u8; 1];
        source.read_exact(&mut b)?;
        len = (len << 7) | (b[0] & 0x7F) as u32;
        if b[0] & 0x80 == 0 {
            break;
        }
    }
    Ok((tag[0], len))
}

const ES_DESCRIPTOR_TAG: u8 = 0x03;
const DECODER_CONFIG_DESCRIPTOR_TAG: u8 = 0x04;
const DECODER_SPECIFIC_INFO_TAG: u8 = 0x05;

/// Walks `esds`'s MPEG-4 descriptor tree far enough to extract
/// `DecoderSpecificInfo` (the `AudioSpecificConfig` for AAC), ignoring
/// everything else.
fn parse_esds(source: &mut dyn ByteSource, end: u64) -> Result<Option<Vec<u8>>> {
    read_full_box_header(source)?;
    let (tag, desc_len) = read_descriptor_header(source)?;
    if tag != ES_DESCRIPTOR_TAG {
        skip_to(source, end)?;
        return Ok(None);
    }
    let desc_end = source.tell() + desc_len as u64;

    let mut es_hdr = [0u8; 3];
    source.read_exact(&mut es_hdr)?;
    let flags = es_hdr[2];
    if flags & 0x80 != 0 {
        source.seek(2, Whence::Current)?;
    }
    if flags & 0x40 != 0 {
        let mut len = [0u8; 1];
        source.read_exact(&mut len)?;
        source.seek(len[0] as i64, Whence::Current)?;
    }
    if flags & 0x20 != 0 {
        source.seek(2, Whence::Current)?;
    }

    let mut result = None;
    while source.tell() + 2 <= desc_end {
        let (child_tag, child_len) = read_descriptor_header(source)?;
        let child_end = source.tell() + child_len as u64;
        if child_tag == DECODER_CONFIG_DESCRIPTOR_TAG {
            // objectTypeIndication:u8, flags:u8, bufferSizeDB:3, maxBitrate:u32, avgBitrate:u32
            source.seek(1 + 1 + 3 + 4 + 4, Whence::Current)?;
            while source.tell() + 2 <= child_end {
                let (grandchild_tag, grandchild_len) = read_descriptor_header(source)?;
                if grandchild_tag == DECODER_SPECIFIC_INFO_TAG {
                    let mut info = vec![0u8; grandchild_len as usize];
                    source.read_exact(&mut info)?;
                    result = Some(info);
                } else {
                    source.seek(grandchild_len as i64, Whence::Current)?;
                }
            }
        }
        let actual = source.tell();
        if actual < child_end {
            source.seek((child_end - actual) as i64, Whence::Current)?;
        }
    }
    skip_to(source, end)?;
    Ok(result)
}

fn skip_to(source: &mut dyn ByteSource, end: u64) -> Result<()> {
    let here = source.tell();
    if here < end {
        source.seek((end - here) as i64, Whence::Current)?;
    }
    Ok(())
}

fn read_u32(source: &mut dyn ByteSource) -> Result<u32> {
    let mut buf = [0u8; 4];
    source.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_fourccs_to_codec_names() {
        assert_eq!(codec_name_for_fourcc(b"mp4a"), "aac");
        assert_eq!(codec_name_for_fourcc(b"fLaC"), "flac");
        assert_eq!(codec_name_for_fourcc(b"Opus"), "opus");
        assert_eq!(codec_name_for_fourcc(b"xxxx"), "unknown");
    }

    #[test]
    fn descriptor_header_decodes_single_byte_length() {
        use std::io::Cursor;
        let mut bytes = vec![0x05u8, 0x02, 0xAA, 0xBB];
        bytes.truncate(4);
        struct Mem(Cursor<Vec<u8>>);
        impl ByteSource for Mem {
            fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
                use std::io::Read;
                Ok(self.0.read(buf).unwrap_or(0))
            }
            fn seek(&mut self, offset: i64, whence: waveframe_core::io::byte_source::Whence) -> Result<u64> {
                use std::io::{Seek, SeekFrom};
                use waveframe_core::io::byte_source::Whence;
                let sf = match whence {
                    Whence::Start => SeekFrom::Start(offset as u64),
                    Whence::Current => SeekFrom::Current(offset),
                    Whence::End => SeekFrom::End(offset),
                };
                Ok(self.0.seek(sf).unwrap())
            }
            fn tell(&self) -> u64 {
                self.0.position()
            }
            fn size(&self) -> Option<u64> {
                Some(self.0.get_ref().len() as u64)
            }
            fn eof(&self) -> bool {
                self.0.position() >= self.0.get_ref().len() as u64
            }
        }
        let mut src = Mem(Cursor::new(bytes));
        let (tag, len) = read_descriptor_header(&mut src).unwrap();
        assert_eq!(tag, 0x05);
        assert_eq!(len, 2);
    }
}
