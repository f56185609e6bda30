// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Ogg demuxer: page sync, logical-bitstream demultiplexing, and
//! page-bisection seek (§4.6).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use waveframe_core::error::{Error, Result};
use waveframe_core::formats::{Demuxer, FormatOptions, StreamInfo};
use waveframe_core::io::buffer_pool::BufferPool;
use waveframe_core::io::byte_source::{ByteSource, Whence};
use waveframe_core::log_channel::{log_msg, Channel, Level};
use waveframe_core::packet::MediaChunk;

use crate::granule::granpos_cmp;
use crate::logical::LogicalStream;
use crate::mappings::{flac, identify, opus, vorbis, OggCodec};
use crate::page::{parse_page, OggPage, CAPTURE_PATTERN};

/// How far page-bisection narrows the search interval before falling back
/// to a linear scan, per §4.6 step 3.
const BISECTION_CHUNKSIZE: u64 = 64 * 1024;
/// Safety bound on how many pages `open` will read looking for the end of
/// the header sequence before giving up.
const MAX_HEADER_PAGES: usize = 64;

pub struct OggDemuxer {
    source: Box<dyn ByteSource>,
    pool: Arc<BufferPool>,
    streams: HashMap<u32, LogicalStream>,
    primary_serial: u32,
    stream_infos: Vec<StreamInfo>,
    metadata: BTreeMap<String, String>,
    corruption_count: u32,
    consecutive_corruption: u32,
    max_consecutive_corruption: u32,
}

fn read_raw_page(source: &mut dyn ByteSource, pos: u64) -> Result<OggPage> {
    let mut head = [0u8; 27];
    source.seek(pos as i64, Whence::Start)?;
    source.read_exact(&mut head)?;
    let segment_count = head[26] as usize;
    let mut segment_table = vec![0u8; segment_count];
    source.read_exact(&mut segment_table)?;
    let payload_len: usize = segment_table.iter().map(|&b| b as usize).sum();
    let mut payload = vec![0u8; payload_len];
    source.read_exact(&mut payload)?;

    let mut full = Vec::with_capacity(27 + segment_count + payload_len);
    full.extend_from_slice(&head);
    full.extend_from_slice(&segment_table);
    full.extend_from_slice(&payload);
    parse_page(&full, pos)
}

/// Scans forward from `from` for the next `"OggS"` capture pattern,
/// returning its file offset. Used both for initial sync and for recovery
/// after a corrupted page (§4.6 recovery paragraph).
fn find_next_capture(source: &mut dyn ByteSource, from: u64) -> Result<u64> {
    source.seek(from as i64, Whence::Start)?;
    let mut window = [0u8; 4];
    let mut filled = 0usize;
    let mut pos = from;
    loop {
        let mut byte = [0u8; 1];
        if source.read(&mut byte)? == 0 {
            return Err(Error::Truncated("no further ogg page sync found"));
        }
        if filled < 4 {
            window[filled] = byte[0];
            filled += 1;
        } else {
            window.copy_within(1.., 0);
            window[3] = byte[0];
        }
        pos += 1;
        if filled == 4 && &window == CAPTURE_PATTERN {
            return Ok(pos - 4);
        }
    }
}

impl OggDemuxer {
    pub fn open(source: Box<dyn ByteSource>, pool: Arc<BufferPool>) -> Result<Self> {
        Self::open_with_options(source, pool, FormatOptions::default())
    }

    /// Same as [`OggDemuxer::open`], but honors `format.max_consecutive_corruption`
    /// instead of the default (§4.6 recovery paragraph).
    pub fn open_with_options(
        mut source: Box<dyn ByteSource>,
        pool: Arc<BufferPool>,
        format: FormatOptions,
    ) -> Result<Self> {
        let start = find_next_capture(source.as_mut(), 0)?;
        if start != 0 {
            return Err(Error::InvalidMedia("not an Ogg stream (no leading capture pattern)"));
        }

        let mut demux = OggDemuxer {
            source,
            pool,
            streams: HashMap::new(),
            primary_serial: 0,
            stream_infos: Vec::new(),
            metadata: BTreeMap::new(),
            corruption_count: 0,
            consecutive_corruption: 0,
            max_consecutive_corruption: format.max_consecutive_corruption,
        };

        let mut pos = 0u64;
        let mut header_pages = 0usize;
        loop {
            let page = match read_raw_page(demux.source.as_mut(), pos) {
                Ok(p) => p,
                Err(Error::Corrupted(_)) | Err(Error::BadFormat(_)) => {
                    demux.corruption_count += 1;
                    demux.consecutive_corruption += 1;
                    if demux.consecutive_corruption > demux.max_consecutive_corruption {
                        return Err(Error::BadFormat("too many consecutive corrupted ogg pages"));
                    }
                    let next = find_next_capture(demux.source.as_mut(), pos + 1)?;
                    pos = next;
                    continue;
                }
                Err(e) => return Err(e),
            };
            demux.consecutive_corruption = 0;
            pos = page.end_offset;
            demux.ingest_page(&page)?;
            header_pages += 1;

            if demux.streams.values().all(|s| s.headers_complete) && !demux.streams.is_empty() {
                break;
            }
            if header_pages > MAX_HEADER_PAGES {
                return Err(Error::BadFormat("ogg header sequence did not terminate"));
            }
        }

        let primary = demux
            .streams
            .values()
            .find(|s| s.codec.is_some())
            .map(|s| s.serial)
            .ok_or(Error::InvalidMedia("no recognized Ogg logical stream"))?;
        demux.primary_serial = primary;

        let stream = &demux.streams[&primary];
        let codec_name = stream.codec.unwrap().codec_name();
        let mut info = StreamInfo {
            stream_id: primary,
            codec_name,
            sample_rate: stream.sample_rate,
            channels: stream.channels,
            bits_per_sample: stream.bits_per_sample,
            duration_samples: stream.total_samples,
            duration_ms: 0,
            bitrate_bps: 0,
            codec_setup: None,
        };
        info.recompute_duration_ms();
        demux.stream_infos.push(info);

        Ok(demux)
    }

    fn ingest_page(&mut self, page: &OggPage) -> Result<()> {
        let stream = self
            .streams
            .entry(page.serial)
            .or_insert_with(|| LogicalStream::new(page.serial));

        let segment_count = page.segments.len();
        for (i, segment) in page.segments.iter().enumerate() {
            let is_last_segment = i + 1 == segment_count;
            let packet: Vec<u8> = if !stream.partial_packet.is_empty() {
                let mut full = std::mem::take(&mut stream.partial_packet);
                full.extend_from_slice(segment);
                full
            } else {
                segment.clone()
            };

            let packet_continues = is_last_segment && page.last_segment_continues;
            if packet_continues {
                stream.partial_packet = packet;
                continue;
            }

            if stream.codec.is_none() {
                stream.codec = identify(&packet);
                stream.headers_needed = stream.codec.map(|c| c.header_packet_count()).unwrap_or(1);
                if let Some(codec) = stream.codec {
                    apply_identification(stream, codec, &packet)?;
                }
                stream.headers_seen = 1;
                if stream.headers_seen >= stream.headers_needed {
                    stream.headers_complete = true;
                }
                continue;
            }

            if !stream.headers_complete {
                if stream.codec == Some(OggCodec::Vorbis) && stream.headers_seen == 1 {
                    if let Ok(map) = vorbis::parse_comment(&packet) {
                        self.metadata.extend(map);
                    }
                } else if stream.codec == Some(OggCodec::Opus) && stream.headers_seen == 1 {
                    if let Ok(map) = opus::parse_comment(&packet) {
                        self.metadata.extend(map);
                    }
                }
                stream.headers_seen += 1;
                if stream.headers_seen >= stream.headers_needed {
                    stream.headers_complete = true;
                }
                continue;
            }

            stream.pending_packets.push_back((packet, page.granule_position));
        }

        if page.is_eos() {
            stream.eos = true;
        }
        Ok(())
    }

    fn timestamp_for(&self, stream: &LogicalStream, granule: i64) -> u64 {
        match stream.codec {
            Some(OggCodec::Opus) => opus::granule_to_ms(granule, stream.pre_skip) * stream.sample_rate as u64 / 1000,
            _ => granule.max(0) as u64,
        }
    }
}

fn apply_identification(stream: &mut LogicalStream, codec: OggCodec, packet: &[u8]) -> Result<()> {
    match codec {
        OggCodec::Vorbis => {
            let id = vorbis::parse_identification(packet)?;
            stream.sample_rate = id.sample_rate;
            stream.channels = id.channels;
            stream.bits_per_sample = 16;
        }
        OggCodec::Opus => {
            let id = opus::parse_identification(packet)?;
            stream.sample_rate = opus::GRANULE_RATE_HZ;
            stream.channels = id.channels;
            stream.bits_per_sample = 16;
            stream.pre_skip = id.pre_skip;
        }
        OggCodec::Flac => {
            let id = flac::parse_identification(packet)?;
            stream.sample_rate = id.sample_rate;
            stream.channels = id.channels;
            stream.bits_per_sample = id.bits_per_sample;
            stream.total_samples = id.total_samples;
            // FLAC-in-Ogg's header packet count is carried in the packet
            // itself (bytes 7..9); this crate only needs "more than one"
            // to keep scanning until the VORBIS_COMMENT header arrives.
            stream.headers_needed = 2;
        }
        OggCodec::Speex => {
            stream.sample_rate = 0;
            stream.channels = 0;
        }
    }
    Ok(())
}

impl Demuxer for OggDemuxer {
    fn format_id(&self) -> &'static str {
        "ogg"
    }

    fn streams(&self) -> &[StreamInfo] {
        &self.stream_infos
    }

    fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    fn next_chunk(&mut self, stream_id: u32) -> Result<MediaChunk> {
        loop {
            let popped = self
                .streams
                .get_mut(&stream_id)
                .map(|stream| (stream.pending_packets.pop_front(), stream.eos));
            if let Some((pending, eos)) = popped {
                if let Some((packet, granule)) = pending {
                    let timestamp = self.timestamp_for(&self.streams[&stream_id], granule);
                    let mut buf = self.pool.clone().acquire(packet.len(), "ogg");
                    buf.as_mut_vec().extend_from_slice(&packet);
                    return Ok(MediaChunk {
                        stream_id,
                        data: buf,
                        timestamp,
                        file_offset: self.source.tell(),
                        keyframe: true,
                    });
                }
                if eos {
                    return Ok(MediaChunk {
                        stream_id,
                        data: self.pool.clone().acquire(0, "ogg"),
                        timestamp: 0,
                        file_offset: self.source.tell(),
                        keyframe: true,
                    });
                }
            }

            let pos = self.source.tell();
            let page = match read_raw_page(self.source.as_mut(), pos) {
                Ok(p) => p,
                Err(Error::Corrupted(_)) | Err(Error::BadFormat(_)) => {
                    self.corruption_count += 1;
                    self.consecutive_corruption += 1;
                    if self.consecutive_corruption > self.max_consecutive_corruption {
                        return Err(Error::BadFormat("too many consecutive corrupted ogg pages"));
                    }
                    log_msg(Channel::Demuxer, Level::Warn, "ogg page corrupted, resyncing");
                    let next = find_next_capture(self.source.as_mut(), pos + 1)?;
                    self.source.seek(next as i64, Whence::Start)?;
                    continue;
                }
                Err(Error::Truncated(_)) => {
                    if let Some(stream) = self.streams.get_mut(&stream_id) {
                        stream.eos = true;
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.consecutive_corruption = 0;
            self.ingest_page(&page)?;
        }
    }

    fn seek(&mut self, stream_id: u32, timestamp_ms: u64) -> Result<u64> {
        let stream = self.streams.get(&stream_id).ok_or(Error::InvalidMedia("unknown stream id"))?;
        let target_granule = match stream.codec {
            Some(OggCodec::Opus) => {
                timestamp_ms as i64 * opus::GRANULE_RATE_HZ as i64 / 1000 + stream.pre_skip as i64
            }
            _ => timestamp_ms as i64 * stream.sample_rate as i64 / 1000,
        };

        let file_size = self.source.size().ok_or(Error::Unsupported("page-bisection seek needs a known size"))?;
        let mut lo = 0u64;
        let mut hi = file_size;

        while hi.saturating_sub(lo) >= BISECTION_CHUNKSIZE {
            let mid = lo + (hi - lo) / 2;
            let sync = find_next_capture(self.source.as_mut(), mid)?;
            let page = read_raw_page(self.source.as_mut(), sync)?;
            if page.serial == stream_id {
                if granpos_cmp(page.granule_position, target_granule) < 0 {
                    lo = page.end_offset;
                } else {
                    hi = page.start_offset;
                }
            } else {
                lo = page.end_offset;
            }
        }

        // Linear scan for the last page with granule <= target.
        let mut pos = lo;
        let mut landed_granule = 0i64;
        loop {
            let sync = match find_next_capture(self.source.as_mut(), pos) {
                Ok(p) if p < hi + BISECTION_CHUNKSIZE => p,
                _ => break,
            };
            let page = match read_raw_page(self.source.as_mut(), sync) {
                Ok(p) => p,
                Err(_) => break,
            };
            if page.serial == stream_id {
                if granpos_cmp(page.granule_position, target_granule) <= 0 {
                    landed_granule = page.granule_position;
                    pos = page.end_offset;
                } else {
                    self.source.seek(page.start_offset as i64, Whence::Start)?;
                    break;
                }
            } else {
                pos = page.end_offset;
            }
        }

        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.pending_packets.clear();
            stream.partial_packet.clear();
            stream.eos = false;
        }

        Ok(self.timestamp_for(&self.streams[&stream_id], landed_granule))
    }
}
