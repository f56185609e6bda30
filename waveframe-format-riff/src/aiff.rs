// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! AIFF chunk demuxer (§4.8): `"FORM"` + BE size + `"AIFF"` + chunks, with
//! `"COMM"` and `"SSND"` the only chunks this core reads.

use std::collections::BTreeMap;
use std::sync::Arc;

use waveframe_core::error::{Error, Result};
use waveframe_core::formats::{Demuxer, StreamInfo};
use waveframe_core::io::buffer_pool::BufferPool;
use waveframe_core::io::byte_source::{ByteSource, Whence};
use waveframe_core::log_channel::{log_msg, Channel, Level};
use waveframe_core::packet::MediaChunk;

use waveframe_codec_pcm::{PcmSetup, SampleEncoding};

const FRAMES_PER_CHUNK: u64 = 4096;

/// Decodes an 80-bit IEEE-754 extended-precision float (big-endian: 1 sign
/// bit, 15 exponent bits, 64 explicit mantissa bits) as used by AIFF's
/// `COMM` chunk for sample rate.
pub fn decode_extended_80(bytes: &[u8; 10]) -> f64 {
    let sign = if bytes[0] & 0x80 != 0 { -1.0 } else { 1.0 };
    let exponent = (((bytes[0] & 0x7F) as u16) << 8 | bytes[1] as u16) as i32 - 16383;
    let mut mantissa: u64 = 0;
    for &b in &bytes[2..10] {
        mantissa = (mantissa << 8) | b as u64;
    }
    if exponent == -16383 && mantissa == 0 {
        return 0.0;
    }
    let normalized = mantissa as f64 / (1u64 << 63) as f64;
    sign * normalized * 2f64.powi(exponent)
}

pub struct AiffDemuxer {
    source: Box<dyn ByteSource>,
    pool: Arc<BufferPool>,
    stream_info: StreamInfo,
    bytes_per_frame: u32,
    data_start: u64,
    data_len: u64,
    pos_in_data: u64,
}

fn read_u32_be(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn read_u16_be(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

impl AiffDemuxer {
    pub fn open(mut source: Box<dyn ByteSource>, pool: Arc<BufferPool>) -> Result<Self> {
        let mut header = [0u8; 12];
        source.read_exact(&mut header)?;
        if &header[0..4] != b"FORM" || &header[8..12] != b"AIFF" {
            return Err(Error::InvalidMedia("not a FORM/AIFF stream"));
        }

        let mut channels = 0u16;
        let mut sample_frames = 0u32;
        let mut bits_per_sample = 0u16;
        let mut sample_rate = 0u32;
        let mut data_start = None;
        let mut data_len = 0u64;
        let mut ssnd_offset = 0u32;

        loop {
            let mut chunk_header = [0u8; 8];
            match source.read(&mut chunk_header)? {
                0 => break,
                n if n < 8 => return Err(Error::Truncated("aiff chunk header truncated")),
                _ => {}
            }
            let chunk_id = &chunk_header[0..4];
            let chunk_size = read_u32_be(&chunk_header[4..8]) as u64;

            if chunk_id == b"COMM" {
                let mut body = vec![0u8; chunk_size as usize];
                source.read_exact(&mut body)?;
                if body.len() < 18 {
                    return Err(Error::BadFormat("COMM chunk too short"));
                }
                channels = read_u16_be(&body[0..2]);
                sample_frames = read_u32_be(&body[2..6]);
                bits_per_sample = read_u16_be(&body[6..8]);
                let mut ext = [0u8; 10];
                ext.copy_from_slice(&body[8..18]);
                sample_rate = decode_extended_80(&ext).round() as u32;
                if chunk_size % 2 == 1 {
                    source.seek(1, Whence::Current)?;
                }
            } else if chunk_id == b"SSND" {
                let mut prefix = [0u8; 8];
                source.read_exact(&mut prefix)?;
                ssnd_offset = read_u32_be(&prefix[0..4]);
                data_start = Some(source.tell() + ssnd_offset as u64);
                data_len = chunk_size - 8 - ssnd_offset as u64;
                source.seek((chunk_size - 8) as i64, Whence::Current)?;
                if chunk_size % 2 == 1 {
                    source.seek(1, Whence::Current)?;
                }
            } else {
                log_msg(Channel::Demuxer, Level::Trace, &format!("skipping aiff chunk {chunk_id:?}"));
                let pad = chunk_size % 2;
                source.seek((chunk_size + pad) as i64, Whence::Current)?;
            }

            if sample_rate != 0 && data_start.is_some() {
                break;
            }
        }

        let data_start = data_start.ok_or(Error::BadFormat("aiff stream missing SSND chunk"))?;
        if sample_rate == 0 {
            return Err(Error::BadFormat("aiff stream missing COMM chunk"));
        }

        let pcm_setup =
            PcmSetup { encoding: SampleEncoding::IntBigEndian, bits_per_sample: bits_per_sample as u8 };
        let bytes_per_frame = channels as u32 * ((bits_per_sample as u32 + 7) / 8).max(1);

        let mut stream_info = StreamInfo {
            stream_id: 0,
            codec_name: "pcm",
            sample_rate,
            channels: channels as u8,
            bits_per_sample: bits_per_sample as u8,
            duration_samples: sample_frames as u64,
            duration_ms: 0,
            bitrate_bps: 0,
            codec_setup: Some(pcm_setup.encode()),
        };
        stream_info.recompute_duration_ms();

        Ok(AiffDemuxer {
            source,
            pool,
            stream_info,
            bytes_per_frame,
            data_start,
            data_len,
            pos_in_data: 0,
        })
    }
}

impl Demuxer for AiffDemuxer {
    fn format_id(&self) -> &'static str {
        "aiff"
    }

    fn streams(&self) -> &[StreamInfo] {
        std::slice::from_ref(&self.stream_info)
    }

    fn metadata(&self) -> &BTreeMap<String, String> {
        static EMPTY: std::sync::OnceLock<BTreeMap<String, String>> = std::sync::OnceLock::new();
        EMPTY.get_or_init(BTreeMap::new)
    }

    fn next_chunk(&mut self, stream_id: u32) -> Result<MediaChunk> {
        if self.pos_in_data >= self.data_len {
            return Ok(MediaChunk {
                stream_id,
                data: self.pool.clone().acquire(0, "aiff"),
                timestamp: self.pos_in_data / self.bytes_per_frame.max(1) as u64,
                file_offset: self.source.tell(),
                keyframe: true,
            });
        }
        let want_bytes = (FRAMES_PER_CHUNK * self.bytes_per_frame as u64)
            .min(self.data_len - self.pos_in_data) as usize;
        let mut buf = self.pool.clone().acquire(want_bytes, "aiff");
        buf.as_mut_vec().resize(want_bytes, 0);
        let file_offset = self.source.tell();
        self.source.read_exact(buf.as_mut_vec())?;
        let timestamp = self.pos_in_data / self.bytes_per_frame.max(1) as u64;
        self.pos_in_data += want_bytes as u64;
        Ok(MediaChunk { stream_id, data: buf, timestamp, file_offset, keyframe: true })
    }

    fn seek(&mut self, _stream_id: u32, timestamp_ms: u64) -> Result<u64> {
        let sample = timestamp_ms * self.stream_info.sample_rate as u64 / 1000;
        let byte_offset = (sample * self.bytes_per_frame as u64).min(self.data_len);
        self.source.seek((self.data_start + byte_offset) as i64, Whence::Start)?;
        self.pos_in_data = byte_offset;
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_extended_80_for_44100() {
        // Canonical 80-bit extended encoding of 44100.0.
        let bytes: [u8; 10] = [0x40, 0x0E, 0xAC, 0x44, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let value = decode_extended_80(&bytes);
        assert!((value - 44100.0).abs() < 0.001);
    }

    #[test]
    fn decodes_extended_80_zero() {
        let bytes = [0u8; 10];
        assert_eq!(decode_extended_80(&bytes), 0.0);
    }
}
