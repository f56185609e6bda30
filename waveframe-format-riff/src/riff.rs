// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RIFF/WAVE chunk demuxer (§4.8): `"RIFF"` + LE size + `"WAVE"` + chunks,
//! with `"fmt "` (WAVEFORMATEX) and `"data"` the only chunks this core reads.

use std::collections::BTreeMap;
use std::sync::Arc;

use waveframe_core::error::{Error, Result};
use waveframe_core::formats::{Demuxer, StreamInfo};
use waveframe_core::io::buffer_pool::BufferPool;
use waveframe_core::io::byte_source::{ByteSource, Whence};
use waveframe_core::log_channel::{log_msg, Channel, Level};
use waveframe_core::packet::MediaChunk;

use waveframe_codec_pcm::{PcmSetup, SampleEncoding};

/// Samples read per `next_chunk` call; an arbitrary but reasonable slice
/// size that keeps chunk latency low without issuing a syscall per sample.
const FRAMES_PER_CHUNK: u64 = 4096;

pub struct RiffDemuxer {
    source: Box<dyn ByteSource>,
    pool: Arc<BufferPool>,
    stream_info: StreamInfo,
    bytes_per_frame: u32,
    data_start: u64,
    data_len: u64,
    pos_in_data: u64,
    pcm_setup: PcmSetup,
}

struct WaveFormat {
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

fn read_u16_le(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn read_u32_le(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

impl RiffDemuxer {
    pub fn open(mut source: Box<dyn ByteSource>, pool: Arc<BufferPool>) -> Result<Self> {
        let mut header = [0u8; 12];
        source.read_exact(&mut header)?;
        if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
            return Err(Error::InvalidMedia("not a RIFF/WAVE stream"));
        }

        let mut fmt: Option<WaveFormat> = None;
        let mut data_start = None;
        let mut data_len = 0u64;

        loop {
            let mut chunk_header = [0u8; 8];
            match source.read(&mut chunk_header)? {
                0 => break,
                n if n < 8 => return Err(Error::Truncated("riff chunk header truncated")),
                _ => {}
            }
            let chunk_id = &chunk_header[0..4];
            let chunk_size = read_u32_le(&chunk_header[4..8]) as u64;

            if chunk_id == b"fmt " {
                let mut body = vec![0u8; chunk_size as usize];
                source.read_exact(&mut body)?;
                if body.len() < 16 {
                    return Err(Error::BadFormat("fmt chunk too short"));
                }
                fmt = Some(WaveFormat {
                    format_tag: read_u16_le(&body[0..2]),
                    channels: read_u16_le(&body[2..4]),
                    sample_rate: read_u32_le(&body[4..8]),
                    bits_per_sample: read_u16_le(&body[14..16]),
                });
                if chunk_size % 2 == 1 {
                    source.seek(1, Whence::Current)?;
                }
            } else if chunk_id == b"data" {
                data_start = Some(source.tell());
                data_len = chunk_size;
                source.seek(chunk_size as i64, Whence::Current)?;
                if chunk_size % 2 == 1 {
                    source.seek(1, Whence::Current)?;
                }
            } else {
                log_msg(Channel::Demuxer, Level::Trace, &format!("skipping riff chunk {chunk_id:?}"));
                let pad = chunk_size % 2;
                source.seek((chunk_size + pad) as i64, Whence::Current)?;
            }

            if fmt.is_some() && data_start.is_some() {
                break;
            }
        }

        let fmt = fmt.ok_or(Error::BadFormat("riff stream missing fmt chunk"))?;
        let data_start = data_start.ok_or(Error::BadFormat("riff stream missing data chunk"))?;

        let (encoding, codec_name) = match fmt.format_tag {
            1 => (SampleEncoding::IntLittleEndian, "pcm"),
            3 => (SampleEncoding::FloatLittleEndian, "pcm"),
            6 => (SampleEncoding::ALaw, "alaw"),
            7 => (SampleEncoding::MuLaw, "mulaw"),
            0xFFFE => (SampleEncoding::IntLittleEndian, "pcm"), // WAVE_FORMAT_EXTENSIBLE, PCM subset only
            other => return Err(Error::Unsupported(format_tag_name(other))),
        };
        let pcm_setup = PcmSetup { encoding, bits_per_sample: fmt.bits_per_sample as u8 };
        let bytes_per_frame =
            fmt.channels as u32 * ((fmt.bits_per_sample as u32 + 7) / 8).max(1);
        let total_frames = if bytes_per_frame > 0 { data_len / bytes_per_frame as u64 } else { 0 };

        let mut stream_info = StreamInfo {
            stream_id: 0,
            codec_name,
            sample_rate: fmt.sample_rate,
            channels: fmt.channels as u8,
            bits_per_sample: fmt.bits_per_sample as u8,
            duration_samples: total_frames,
            duration_ms: 0,
            bitrate_bps: 0,
            codec_setup: Some(pcm_setup.encode()),
        };
        stream_info.recompute_duration_ms();

        Ok(RiffDemuxer {
            source,
            pool,
            stream_info,
            bytes_per_frame,
            data_start,
            data_len,
            pos_in_data: 0,
            pcm_setup,
        })
    }
}

fn format_tag_name(tag: u16) -> &'static str {
    match tag {
        85 => "mp3-in-wav",
        _ => "unrecognized WAVEFORMATEX format tag",
    }
}

impl Demuxer for RiffDemuxer {
    fn format_id(&self) -> &'static str {
        "riff"
    }

    fn streams(&self) -> &[StreamInfo] {
        std::slice::from_ref(&self.stream_info)
    }

    fn metadata(&self) -> &BTreeMap<String, String> {
        static EMPTY: std::sync::OnceLock<BTreeMap<String, String>> = std::sync::OnceLock::new();
        EMPTY.get_or_init(BTreeMap::new)
    }

    fn next_chunk(&mut self, stream_id: u32) -> Result<MediaChunk> {
        let _ = self.pcm_setup;
        if self.pos_in_data >= self.data_len {
            return Ok(MediaChunk {
                stream_id,
                data: self.pool.clone().acquire(0, "riff"),
                timestamp: self.pos_in_data / self.bytes_per_frame.max(1) as u64,
                file_offset: self.source.tell(),
                keyframe: true,
            });
        }
        let want_bytes = (FRAMES_PER_CHUNK * self.bytes_per_frame as u64)
            .min(self.data_len - self.pos_in_data) as usize;
        let mut buf = self.pool.clone().acquire(want_bytes, "riff");
        buf.as_mut_vec().resize(want_bytes, 0);
        let file_offset = self.source.tell();
        self.source.read_exact(buf.as_mut_vec())?;
        let timestamp = self.pos_in_data / self.bytes_per_frame.max(1) as u64;
        self.pos_in_data += want_bytes as u64;
        Ok(MediaChunk { stream_id, data: buf, timestamp, file_offset, keyframe: true })
    }

    fn seek(&mut self, _stream_id: u32, timestamp_ms: u64) -> Result<u64> {
        let sample = timestamp_ms * self.stream_info.sample_rate as u64 / 1000;
        let byte_offset = sample * self.bytes_per_frame as u64;
        let byte_offset = byte_offset.min(self.data_len);
        self.source.seek((self.data_start + byte_offset) as i64, Whence::Start)?;
        self.pos_in_data = byte_offset;
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct MemSource(Cursor<Vec<u8>>);

    impl ByteSource for MemSource {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            use std::io::Read;
            Ok(self.0.read(buf).unwrap_or(0))
        }

        fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
            use std::io::{Seek, SeekFrom};
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

    fn build_wave(samples: &[i16]) -> Vec<u8> {
        let mut data = Vec::new();
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&1u16.to_le_bytes()); // PCM
        fmt.extend_from_slice(&1u16.to_le_bytes()); // mono
        fmt.extend_from_slice(&44100u32.to_le_bytes());
        fmt.extend_from_slice(&88200u32.to_le_bytes()); // byte rate
        fmt.extend_from_slice(&2u16.to_le_bytes()); // block align
        fmt.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

        let mut body = Vec::new();
        body.extend_from_slice(b"WAVE");
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
        body.extend_from_slice(&fmt);
        body.extend_from_slice(b"data");
        body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        body.extend_from_slice(&data);

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn parses_fmt_and_data_and_decodes_chunk() {
        let wave = build_wave(&[1, 2, 3, 4]);
        let pool = BufferPool::new(1024 * 1024);
        let source = Box::new(MemSource(Cursor::new(wave)));
        let mut demux = RiffDemuxer::open(source, pool).unwrap();
        assert_eq!(demux.streams()[0].sample_rate, 44100);
        assert_eq!(demux.streams()[0].channels, 1);
        let chunk = demux.next_chunk(0).unwrap();
        assert_eq!(chunk.data.len(), 8);
        let eof = demux.next_chunk(0).unwrap();
        assert!(eof.is_eof());
    }

    #[test]
    fn seek_computes_byte_exact_offset() {
        let wave = build_wave(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let pool = BufferPool::new(1024 * 1024);
        let source = Box::new(MemSource(Cursor::new(wave)));
        let mut demux = RiffDemuxer::open(source, pool).unwrap();
        // 2 samples at 44100 Hz is ~0.0453ms; use a timestamp that lands on sample 4.
        let target_ms = 4 * 1000 / 44100;
        let landed = demux.seek(0, target_ms).unwrap();
        assert_eq!(landed, target_ms * 44100 / 1000);
    }
}
