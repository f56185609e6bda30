// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Native FLAC container demuxer: stream marker, metadata block walk, and a
//! frame index built lazily by scanning for the next frame sync and
//! confirming it with the footer CRC-16 (RFC 9639 §8-§9).

use std::collections::BTreeMap;
use std::sync::Arc;

use waveframe_core::checksum::Crc16Ansi;
use waveframe_core::error::{Error, Result};
use waveframe_core::formats::{Demuxer, StreamInfo};
use waveframe_core::io::buffer_pool::BufferPool;
use waveframe_core::io::byte_source::{ByteSource, Whence};
use waveframe_core::io::bitstream::BitstreamReader;
use waveframe_core::log_channel::{log_msg, Channel, Level};
use waveframe_core::packet::MediaChunk;

use crate::frame::{parse_frame_header, StreamConstraints};
use crate::metadata::{
    parse_block_header, parse_seektable, parse_streaminfo, parse_vorbis_comment, SeekPoint, StreamInfoBlock,
    BLOCK_TYPE_SEEKTABLE, BLOCK_TYPE_STREAMINFO, BLOCK_TYPE_VORBIS_COMMENT,
};

const STREAM_MARKER: &[u8; 4] = b"fLaC";

/// A conservative lower bound on a realistic frame's byte length, so the
/// sync scanner never treats bytes inside a just-started frame's own header
/// as a candidate boundary.
const MIN_FRAME_LEN: usize = 11;

#[derive(Debug, Clone, Copy)]
struct FrameIndexEntry {
    sample_number: u64,
    byte_offset: u64,
}

pub struct FlacDemuxer {
    source: Box<dyn ByteSource>,
    pool: Arc<BufferPool>,
    stream_info: StreamInfo,
    metadata: BTreeMap<String, String>,
    audio_start: u64,
    seek_points: Vec<SeekPoint>,
    frame_index: Vec<FrameIndexEntry>,
    current_sample: u64,
    constraints: StreamConstraints,
}

impl FlacDemuxer {
    pub fn open(mut source: Box<dyn ByteSource>, pool: Arc<BufferPool>) -> Result<Self> {
        let mut marker = [0u8; 4];
        source.read_exact(&mut marker)?;
        if &marker != STREAM_MARKER {
            return Err(Error::InvalidMedia("missing fLaC stream marker"));
        }

        let mut streaminfo: Option<StreamInfoBlock> = None;
        let mut seek_points = Vec::new();
        let mut metadata = BTreeMap::new();

        loop {
            let mut header_bytes = [0u8; 4];
            source.read_exact(&mut header_bytes)?;
            let header = parse_block_header(&header_bytes);
            let mut body = vec![0u8; header.length as usize];
            source.read_exact(&mut body)?;

            match header.block_type {
                BLOCK_TYPE_STREAMINFO => streaminfo = Some(parse_streaminfo(&body)?),
                BLOCK_TYPE_SEEKTABLE => seek_points = parse_seektable(&body)?,
                BLOCK_TYPE_VORBIS_COMMENT => metadata = parse_vorbis_comment(&body)?,
                _ => log_msg(Channel::Demuxer, Level::Trace, &format!("skipping flac metadata block type {}", header.block_type)),
            }

            if header.is_last {
                break;
            }
        }

        let streaminfo = streaminfo.ok_or(Error::BadFormat("flac stream missing STREAMINFO block"))?;
        let audio_start = source.tell();

        let constraints = StreamConstraints {
            sample_rate: streaminfo.sample_rate,
            bits_per_sample: streaminfo.bits_per_sample,
            channels: streaminfo.channels,
        };

        let mut stream_info = StreamInfo {
            stream_id: 0,
            codec_name: "flac",
            sample_rate: streaminfo.sample_rate,
            channels: streaminfo.channels,
            bits_per_sample: streaminfo.bits_per_sample,
            duration_samples: streaminfo.total_samples,
            duration_ms: 0,
            bitrate_bps: 0,
            codec_setup: Some(streaminfo.md5.to_vec()),
        };
        stream_info.recompute_duration_ms();

        Ok(FlacDemuxer {
            source,
            pool,
            stream_info,
            metadata,
            audio_start,
            seek_points,
            frame_index: vec![FrameIndexEntry { sample_number: 0, byte_offset: audio_start }],
            current_sample: 0,
            constraints,
        })
    }

    /// Scans forward from the source's current position for one complete
    /// frame, confirmed by its footer CRC-16. Returns `None` at end of
    /// stream. Leaves the source positioned at the start of the next frame.
    fn next_frame_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        let mut probe = [0u8; 1];
        loop {
            let n = self.source.read(&mut probe)?;
            if n == 0 {
                if buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(buf));
            }
            buf.push(probe[0]);

            if buf.len() > MIN_FRAME_LEN && buf[buf.len() - 2] == 0xFF && (buf[buf.len() - 1] & 0xFC) == 0xF8 {
                let candidate_len = buf.len() - 2;
                let (body, footer) = buf[..candidate_len].split_at(candidate_len - 2);
                let mut crc = Crc16Ansi::new();
                crc.update_buf(body);
                let stored = u16::from_be_bytes([footer[0], footer[1]]);
                if crc.get() == stored {
                    // Un-read the two sync bytes that belong to the next frame.
                    self.source.seek(-2, Whence::Current)?;
                    return Ok(Some(buf[..candidate_len].to_vec()));
                }
            }
        }
    }

    /// Parses just enough of a frame's header to learn its block size,
    /// without decoding subframes; used while linear-scanning toward a seek
    /// target.
    fn peek_block_size(&self, frame_bytes: &[u8]) -> Result<u32> {
        let mut reader = BitstreamReader::new();
        reader.feed(frame_bytes);
        let (header, _) = parse_frame_header(&mut reader, &self.constraints)?;
        Ok(header.block_size)
    }
}

impl Demuxer for FlacDemuxer {
    fn format_id(&self) -> &'static str {
        "flac"
    }

    fn streams(&self) -> &[StreamInfo] {
        std::slice::from_ref(&self.stream_info)
    }

    fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    fn next_chunk(&mut self, stream_id: u32) -> Result<MediaChunk> {
        let file_offset = self.source.tell();
        match self.next_frame_bytes()? {
            None => Ok(MediaChunk {
                stream_id,
                data: self.pool.clone().acquire(0, "flac"),
                timestamp: self.current_sample,
                file_offset,
                keyframe: true,
            }),
            Some(bytes) => {
                let block_size = self.peek_block_size(&bytes).unwrap_or(0) as u64;
                let timestamp = self.current_sample;
                self.frame_index.push(FrameIndexEntry {
                    sample_number: self.current_sample + block_size,
                    byte_offset: self.source.tell(),
                });
                self.current_sample += block_size;

                let mut buf = self.pool.clone().acquire(bytes.len(), "flac");
                buf.as_mut_vec().extend_from_slice(&bytes);
                Ok(MediaChunk { stream_id, data: buf, timestamp, file_offset, keyframe: true })
            }
        }
    }

    fn seek(&mut self, _stream_id: u32, timestamp_ms: u64) -> Result<u64> {
        let target_sample = timestamp_ms * self.stream_info.sample_rate as u64 / 1000;

        let mut start_offset = self.audio_start;
        let mut start_sample = 0u64;
        for point in &self.seek_points {
            if point.sample_number <= target_sample {
                start_offset = self.audio_start + point.byte_offset;
                start_sample = point.sample_number;
            } else {
                break;
            }
        }
        // Frames already visited this session narrow the start further than
        // the (often sparse) SEEKTABLE can, without rescanning from scratch.
        for entry in &self.frame_index {
            if entry.sample_number <= target_sample && entry.byte_offset > start_offset {
                start_offset = entry.byte_offset;
                start_sample = entry.sample_number;
            }
        }

        self.source.seek(start_offset as i64, Whence::Start)?;
        self.current_sample = start_sample;
        self.frame_index.retain(|e| e.byte_offset <= start_offset);

        loop {
            let before = self.source.tell();
            match self.next_frame_bytes()? {
                None => break,
                Some(bytes) => {
                    let block_size = self.peek_block_size(&bytes).unwrap_or(0) as u64;
                    if self.current_sample + block_size > target_sample || block_size == 0 {
                        self.source.seek(before as i64, Whence::Start)?;
                        break;
                    }
                    self.current_sample += block_size;
                }
            }
        }
        Ok(self.current_sample)
    }
}

pub fn open(source: Box<dyn ByteSource>, pool: Arc<BufferPool>) -> Result<FlacDemuxer> {
    FlacDemuxer::open(source, pool)
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

    fn build_streaminfo_block(sample_rate: u32, channels: u8, bits: u8, total_samples: u64, is_last: bool) -> Vec<u8> {
        let mut body = vec![0u8; 34];
        body[0..2].copy_from_slice(&4096u16.to_be_bytes());
        body[2..4].copy_from_slice(&4096u16.to_be_bytes());
        let packed: u64 = ((sample_rate as u64 & 0xFFFFF) << 44)
            | (((channels - 1) as u64 & 0x7) << 41)
            | (((bits - 1) as u64 & 0x1F) << 36)
            | (total_samples & 0xF_FFFF_FFFF);
        body[10..18].copy_from_slice(&packed.to_be_bytes());

        let mut out = Vec::new();
        out.push(if is_last { 0x80 } else { 0x00 }); // type 0 = STREAMINFO
        let len = body.len() as u32;
        out.push((len >> 16) as u8);
        out.push((len >> 8) as u8);
        out.push(len as u8);
        out.extend_from_slice(&body);
        out
    }

    fn build_minimal_stream() -> Vec<u8> {
        let mut out = b"fLaC".to_vec();
        out.extend(build_streaminfo_block(44_100, 1, 16, 0, true));
        out
    }

    #[test]
    fn opens_stream_marker_and_streaminfo() {
        let bytes = build_minimal_stream();
        let pool = BufferPool::new(1024 * 1024);
        let source = Box::new(MemSource(Cursor::new(bytes)));
        let demux = FlacDemuxer::open(source, pool).unwrap();
        assert_eq!(demux.streams()[0].sample_rate, 44_100);
        assert_eq!(demux.streams()[0].channels, 1);
        assert_eq!(demux.streams()[0].bits_per_sample, 16);
    }

    #[test]
    fn next_chunk_reports_eof_on_empty_audio_region() {
        let bytes = build_minimal_stream();
        let pool = BufferPool::new(1024 * 1024);
        let source = Box::new(MemSource(Cursor::new(bytes)));
        let mut demux = FlacDemuxer::open(source, pool).unwrap();
        let chunk = demux.next_chunk(0).unwrap();
        assert!(chunk.is_eof());
    }

    #[test]
    fn rejects_stream_without_marker() {
        let pool = BufferPool::new(1024 * 1024);
        let source = Box::new(MemSource(Cursor::new(vec![0u8; 8])));
        assert!(FlacDemuxer::open(source, pool).is_err());
    }
}
