// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Top-level ISO-BMFF demuxer: `ftyp`/`moov` discovery (with late-moov
//! support), progressive sample-table playback, and fragmented-MP4 playback
//! driven by `moof`/`mdat` pairs discovered lazily as they're read.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use waveframe_core::error::{Error, Result};
use waveframe_core::formats::{Demuxer, StreamInfo};
use waveframe_core::io::buffer_pool::BufferPool;
use waveframe_core::io::byte_source::{ByteSource, Whence};
use waveframe_core::log_channel::{log_msg, Channel, Level};
use waveframe_core::packet::MediaChunk;

use crate::boxes::{read_box_header, walk_boxes, BoxHeader};
use crate::fragmented::{parse_moof, parse_mvex, parse_sidx, SegmentIndex, TrackExtends};
use crate::trak::{parse_trak, Track};

const FTYP: &[u8; 4] = b"ftyp";
const MOOV: &[u8; 4] = b"moov";
const MDAT: &[u8; 4] = b"mdat";
const MOOF: &[u8; 4] = b"moof";
const MVEX: &[u8; 4] = b"mvex";
const TRAK: &[u8; 4] = b"trak";
const SIDX: &[u8; 4] = b"sidx";

/// How far before the end of a seekable file to start scanning for a late
/// `moov`, before falling back to a full scan from just after `ftyp`.
const LATE_MOOV_TAIL_SCAN: u64 = 16 * 1024 * 1024;

struct PendingSample {
    offset: u64,
    size: u32,
    timestamp: u64,
}

pub struct Mp4Demuxer {
    source: Box<dyn ByteSource>,
    pool: Arc<BufferPool>,
    stream_info: StreamInfo,
    metadata: BTreeMap<String, String>,
    track: Track,
    trex: Option<TrackExtends>,
    fragmented: bool,
    sidx: Option<SegmentIndex>,

    // Progressive (non-fragmented) playback cursor.
    next_sample_index: u32,

    // Fragmented playback state.
    pending: VecDeque<PendingSample>,
    fragment_scan_pos: u64,
    first_fragment_pos: u64,
}

struct MoovResult {
    tracks: Vec<Track>,
    trexs: Vec<TrackExtends>,
}

impl Mp4Demuxer {
    pub fn open(mut source: Box<dyn ByteSource>, pool: Arc<BufferPool>) -> Result<Self> {
        let (first, first_header_len) = read_box_header(&mut *source)?;
        if !first.is_type(FTYP) {
            return Err(Error::InvalidMedia("isomp4 stream does not start with ftyp"));
        }
        skip_box(&mut *source, &first, first_header_len)?;

        let file_size = source.size();
        let after_ftyp = source.tell();

        let moov = Self::locate_and_parse_moov(&mut *source, after_ftyp, file_size)?;

        let track = moov.tracks.into_iter().next().ok_or(Error::InvalidMedia("isomp4 stream has no audio track"))?;
        let trex = moov.trexs.into_iter().find(|t| t.track_id == track.track_id);

        let fragmented = track.sample_table.sample_count() == 0 && trex.is_some();
        let duration_samples = if fragmented { 0 } else { track.sample_table.sample_count() as u64 };

        let mut stream_info = StreamInfo {
            stream_id: 0,
            codec_name: track.audio.codec_name,
            sample_rate: if track.audio.sample_rate != 0 { track.audio.sample_rate } else { track.media_timescale },
            channels: track.audio.channels,
            bits_per_sample: if track.audio.bits_per_sample != 0 { track.audio.bits_per_sample } else { 16 },
            duration_samples,
            duration_ms: 0,
            bitrate_bps: 0,
            codec_setup: track.audio.codec_setup.clone(),
        };
        stream_info.recompute_duration_ms();

        let first_fragment_pos = source.tell();

        Ok(Mp4Demuxer {
            source,
            pool,
            stream_info,
            metadata: BTreeMap::new(),
            track,
            trex,
            fragmented,
            sidx: None,
            next_sample_index: 0,
            pending: VecDeque::new(),
            fragment_scan_pos: first_fragment_pos,
            first_fragment_pos,
        })
    }

    /// Finds and fully parses `moov`. If the first box after `ftyp` is
    /// `mdat` rather than `moov`, this is a "late moov" stream: a seekable
    /// source is tail-scanned (falling back to a full scan) per spec; a
    /// non-seekable source fails outright.
    fn locate_and_parse_moov(source: &mut dyn ByteSource, after_ftyp: u64, file_size: Option<u64>) -> Result<MoovResult> {
        let peek_pos = source.tell();
        let (peek, _) = read_box_header(source)?;
        source.seek(peek_pos as i64, Whence::Start)?;

        if !peek.is_type(MDAT) {
            return Self::scan_from(source, file_size);
        }

        log_msg(Channel::IsoMp4, Level::Debug, "mdat precedes moov, scanning for a late moov");
        let size = file_size.ok_or(Error::Unsupported("isomp4 late-moov scan requires a random-access source"))?;

        let tail_start = size.saturating_sub(LATE_MOOV_TAIL_SCAN).max(after_ftyp);
        source.seek(tail_start as i64, Whence::Start)?;
        if let Ok(result) = Self::scan_from(source, Some(size)) {
            return Ok(result);
        }

        source.seek(after_ftyp as i64, Whence::Start)?;
        Self::scan_from(source, Some(size))
    }

    /// Walks top-level boxes from the source's current position, returning
    /// the first fully parsed `moov`.
    fn scan_from(source: &mut dyn ByteSource, file_size: Option<u64>) -> Result<MoovResult> {
        loop {
            let pos = source.tell();
            if let Some(size) = file_size {
                if pos + 8 > size {
                    break;
                }
            }
            let (header, header_len) = match read_box_header(source) {
                Ok(h) => h,
                Err(_) => break,
            };

            if header.is_type(MOOV) {
                let moov_end = match header.total_len {
                    Some(len) => header.start + len,
                    None => file_size.ok_or(Error::Unsupported("isomp4 moov extends to unknown end"))?,
                };
                return Self::parse_moov(source, moov_end);
            }

            if header.total_len.is_none() {
                // A size-0 "extends to end" box other than moov means moov
                // will never follow in this scan.
                break;
            }
            skip_box(source, &header, header_len)?;
        }
        Err(Error::BadFormat("isomp4 stream has no moov box"))
    }

    fn parse_moov(source: &mut dyn ByteSource, moov_end: u64) -> Result<MoovResult> {
        let mut tracks = Vec::new();
        let mut trexs = Vec::new();

        walk_boxes(source, moov_end, |source, header, len| {
            if header.is_type(TRAK) {
                let trak_end = source.tell() + len;
                if let Some(track) = parse_trak(source, trak_end)? {
                    tracks.push(track);
                }
            } else if header.is_type(MVEX) {
                let mvex_end = source.tell() + len;
                trexs = parse_mvex(source, mvex_end)?;
            }
            Ok(())
        })?;

        Ok(MoovResult { tracks, trexs })
    }

    /// Scans forward from `fragment_scan_pos` for the next `moof` whose
    /// `traf` matches our track, queuing its samples. Returns `false` at end
    /// of stream.
    fn fill_next_fragment(&mut self) -> Result<bool> {
        let file_size = self.source.size();
        loop {
            if let Some(size) = file_size {
                if self.fragment_scan_pos + 8 > size {
                    return Ok(false);
                }
            }
            self.source.seek(self.fragment_scan_pos as i64, Whence::Start)?;
            let (header, header_len) = match read_box_header(&mut *self.source) {
                Ok(h) => h,
                Err(_) => return Ok(false),
            };

            if header.is_type(SIDX) {
                let box_end = match header.total_len {
                    Some(len) => header.start + len,
                    None => return Ok(false),
                };
                self.sidx = Some(parse_sidx(&mut *self.source, box_end)?);
                self.fragment_scan_pos = box_end;
                continue;
            }

            if !header.is_type(MOOF) {
                match header.total_len {
                    Some(len) => self.fragment_scan_pos = header.start + len,
                    None => return Ok(false),
                }
                skip_box(&mut *self.source, &header, header_len)?;
                continue;
            }

            let moof_end = match header.total_len {
                Some(len) => header.start + len,
                None => return Ok(false),
            };
            let moof = parse_moof(&mut *self.source, header.start, moof_end)?;
            self.fragment_scan_pos = moof_end;

            let track_id = self.track.track_id;
            let mut queued_any = false;
            for traf in &moof.trafs {
                if traf.tfhd.track_id != track_id {
                    continue;
                }
                let default_duration = traf
                    .tfhd
                    .default_sample_duration
                    .or(self.trex.as_ref().map(|t| t.default_sample_duration))
                    .unwrap_or(0);
                let default_size = traf
                    .tfhd
                    .default_sample_size
                    .or(self.trex.as_ref().map(|t| t.default_sample_size))
                    .unwrap_or(0);
                let base = traf.tfhd.base_data_offset.unwrap_or(moof.moof_start);

                let mut timestamp = traf.base_media_decode_time.unwrap_or(0);
                let mut byte_pos = base;
                for trun in &traf.truns {
                    if let Some(data_offset) = trun.data_offset {
                        byte_pos = (base as i64 + data_offset as i64) as u64;
                    }
                    for i in 0..trun.sample_count as usize {
                        let size = trun.sample_size.get(i).copied().unwrap_or(default_size);
                        let duration = trun.sample_duration.get(i).copied().unwrap_or(default_duration);
                        self.pending.push_back(PendingSample { offset: byte_pos, size, timestamp });
                        byte_pos += size as u64;
                        timestamp += duration as u64;
                        queued_any = true;
                    }
                }
            }

            if queued_any {
                return Ok(true);
            }
            // This moof only carried other tracks' fragments; keep scanning.
        }
    }

    fn read_at(&mut self, offset: u64, len: u32) -> Result<Vec<u8>> {
        self.source.seek(offset as i64, Whence::Start)?;
        let mut buf = vec![0u8; len as usize];
        self.source.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Finds the byte offset of the fragment whose time range covers
    /// `target_ts`, per the `sidx` reference list. Falls back to the first
    /// fragment when there's no usable `sidx`.
    fn fragment_start_for_timestamp(&self, target_ts: u64) -> u64 {
        let Some(sidx) = &self.sidx else {
            return self.first_fragment_pos;
        };
        let mut ts = sidx.earliest_presentation_time;
        let mut offset = sidx.first_segment_offset;
        for (i, reference) in sidx.references.iter().enumerate() {
            let is_last = i + 1 == sidx.references.len();
            if is_last || ts + reference.subsegment_duration as u64 > target_ts {
                return offset;
            }
            ts += reference.subsegment_duration as u64;
            offset += reference.referenced_size as u64;
        }
        sidx.first_segment_offset
    }
}

fn skip_box(source: &mut dyn ByteSource, header: &BoxHeader, _header_len: u64) -> Result<()> {
    if let Some(total) = header.total_len {
        let target = header.start + total;
        let here = source.tell();
        if here < target {
            source.seek((target - here) as i64, Whence::Current)?;
        }
    }
    Ok(())
}

impl Demuxer for Mp4Demuxer {
    fn format_id(&self) -> &'static str {
        "isomp4"
    }

    fn streams(&self) -> &[StreamInfo] {
        std::slice::from_ref(&self.stream_info)
    }

    fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    fn next_chunk(&mut self, stream_id: u32) -> Result<MediaChunk> {
        if self.fragmented {
            if self.pending.is_empty() && !self.fill_next_fragment()? {
                return Ok(MediaChunk { stream_id, data: self.pool.clone().acquire(0, "isomp4"), timestamp: 0, file_offset: 0, keyframe: true });
            }
            let sample = self.pending.pop_front().unwrap();
            let bytes = self.read_at(sample.offset, sample.size)?;
            let mut buf = self.pool.clone().acquire(bytes.len(), "isomp4");
            buf.as_mut_vec().extend_from_slice(&bytes);
            return Ok(MediaChunk { stream_id, data: buf, timestamp: sample.timestamp, file_offset: sample.offset, keyframe: true });
        }

        let idx = self.next_sample_index;
        if idx >= self.track.sample_table.sample_count() {
            return Ok(MediaChunk { stream_id, data: self.pool.clone().acquire(0, "isomp4"), timestamp: 0, file_offset: 0, keyframe: true });
        }
        let offset = self.track.sample_table.offset_for_sample(idx)?;
        let size = self.track.sample_table.sample_size(idx);
        let timestamp = self.track.sample_table.timestamp_for_sample(idx);
        let bytes = self.read_at(offset, size)?;
        self.next_sample_index += 1;

        let mut buf = self.pool.clone().acquire(bytes.len(), "isomp4");
        buf.as_mut_vec().extend_from_slice(&bytes);
        Ok(MediaChunk { stream_id, data: buf, timestamp, file_offset: offset, keyframe: true })
    }

    fn seek(&mut self, _stream_id: u32, timestamp_ms: u64) -> Result<u64> {
        let timescale = self.track.media_timescale as u64;
        let target_ts = (timestamp_ms * timescale + 500) / 1000;

        if !self.fragmented {
            let idx = self.track.sample_table.sample_for_timestamp(target_ts);
            self.next_sample_index = idx;
            return Ok(self.track.sample_table.timestamp_for_sample(idx));
        }

        // Fragmented: jump near the target fragment via sidx (or the first
        // fragment without one), then linear-scan within that fragment only.
        self.pending.clear();
        self.fragment_scan_pos = self.fragment_start_for_timestamp(target_ts);

        if !self.fill_next_fragment()? {
            return Ok(0);
        }
        while self.pending.len() > 1 {
            let reached_target = self.pending.front().map(|s| s.timestamp >= target_ts).unwrap_or(true);
            if reached_target {
                break;
            }
            self.pending.pop_front();
        }
        Ok(self.pending.front().map(|s| s.timestamp).unwrap_or(0))
    }
}

pub fn open(source: Box<dyn ByteSource>, pool: Arc<BufferPool>) -> Result<Mp4Demuxer> {
    Mp4Demuxer::open(source, pool)
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

    fn box_bytes(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = ((8 + payload.len()) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(box_type);
        out.extend_from_slice(payload);
        out
    }

    fn build_minimal_progressive_stream() -> Vec<u8> {
        let ftyp = box_bytes(b"ftyp", &[0u8; 8]);

        let mut tkhd = vec![0u8; 4]; // version/flags
        tkhd.extend_from_slice(&[0u8; 8]); // creation/modification time
        tkhd.extend_from_slice(&1u32.to_be_bytes()); // track_id
        let tkhd = box_bytes(b"tkhd", &tkhd);

        let mut mdhd = vec![0u8; 4];
        mdhd.extend_from_slice(&[0u8; 8]);
        mdhd.extend_from_slice(&44_100u32.to_be_bytes()); // timescale
        mdhd.extend_from_slice(&2u32.to_be_bytes()); // duration
        let mdhd = box_bytes(b"mdhd", &mdhd);

        let mut hdlr = vec![0u8; 4];
        hdlr.extend_from_slice(&[0u8; 4]);
        hdlr.extend_from_slice(b"soun");
        let hdlr = box_bytes(b"hdlr", &hdlr);

        let mut stsd_entry = vec![0u8; 6]; // reserved
        stsd_entry.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
        let mut body = vec![0u8; 8];
        body.extend_from_slice(&1u16.to_be_bytes()); // channelcount
        body.extend_from_slice(&16u16.to_be_bytes()); // samplesize
        body.extend_from_slice(&[0u8; 4]);
        body.extend_from_slice(&((44_100u32) << 16).to_be_bytes());
        stsd_entry.extend_from_slice(&body);
        let mp4a = box_bytes(b"mp4a", &stsd_entry);
        let mut stsd = vec![0u8; 4];
        stsd.extend_from_slice(&1u32.to_be_bytes());
        stsd.extend_from_slice(&mp4a);
        let stsd = box_bytes(b"stsd", &stsd);

        let mut stts = vec![0u8; 4];
        stts.extend_from_slice(&1u32.to_be_bytes());
        stts.extend_from_slice(&2u32.to_be_bytes());
        stts.extend_from_slice(&1024u32.to_be_bytes());
        let stts = box_bytes(b"stts", &stts);

        let mut stsc = vec![0u8; 4];
        stsc.extend_from_slice(&1u32.to_be_bytes());
        stsc.extend_from_slice(&1u32.to_be_bytes());
        stsc.extend_from_slice(&2u32.to_be_bytes());
        stsc.extend_from_slice(&1u32.to_be_bytes());
        let stsc = box_bytes(b"stsc", &stsc);

        let mut stsz = vec![0u8; 4];
        stsz.extend_from_slice(&0u32.to_be_bytes());
        stsz.extend_from_slice(&2u32.to_be_bytes());
        stsz.extend_from_slice(&10u32.to_be_bytes());
        stsz.extend_from_slice(&20u32.to_be_bytes());
        let stsz = box_bytes(b"stsz", &stsz);

        let mdat_offset_placeholder = 0u32; // patched below
        let mut stco = vec![0u8; 4];
        stco.extend_from_slice(&1u32.to_be_bytes());
        stco.extend_from_slice(&mdat_offset_placeholder.to_be_bytes());
        let stco = box_bytes(b"stco", &stco);

        let mut stbl = Vec::new();
        stbl.extend_from_slice(&stsd);
        stbl.extend_from_slice(&stts);
        stbl.extend_from_slice(&stsc);
        stbl.extend_from_slice(&stsz);
        stbl.extend_from_slice(&stco);
        let stbl = box_bytes(b"stbl", &stbl);

        let minf = box_bytes(b"minf", &stbl);

        let mut mdia = Vec::new();
        mdia.extend_from_slice(&mdhd);
        mdia.extend_from_slice(&hdlr);
        mdia.extend_from_slice(&minf);
        let mdia = box_bytes(b"mdia", &mdia);

        let mut trak = Vec::new();
        trak.extend_from_slice(&tkhd);
        trak.extend_from_slice(&mdia);
        let trak = box_bytes(b"trak", &trak);

        let mvhd = box_bytes(b"mvhd", &[0u8; 12]);
        let mut moov = Vec::new();
        moov.extend_from_slice(&mvhd);
        moov.extend_from_slice(&trak);
        let moov = box_bytes(b"moov", &moov);

        let mdat_payload = vec![0xAAu8; 30];
        let mdat = box_bytes(b"mdat", &mdat_payload);

        let mut out = Vec::new();
        out.extend_from_slice(&ftyp);
        out.extend_from_slice(&moov);
        let mdat_start = out.len() as u32 + 8;
        out.extend_from_slice(&mdat);

        // Patch the stco offset now that the mdat position is known.
        let needle = mdat_offset_placeholder.to_be_bytes();
        let pos = out.windows(4).position(|w| w == needle).expect("stco offset placeholder");
        out[pos..pos + 4].copy_from_slice(&mdat_start.to_be_bytes());
        out
    }

    #[test]
    fn opens_progressive_stream_and_reads_two_samples() {
        let bytes = build_minimal_progressive_stream();
        let pool = BufferPool::new(1024 * 1024);
        let source = Box::new(MemSource(Cursor::new(bytes)));
        let mut demux = Mp4Demuxer::open(source, pool).unwrap();
        assert_eq!(demux.streams()[0].sample_rate, 44_100);
        assert_eq!(demux.streams()[0].channels, 1);

        let c0 = demux.next_chunk(0).unwrap();
        assert_eq!(c0.data.len(), 10);
        assert_eq!(c0.timestamp, 0);
        let c1 = demux.next_chunk(0).unwrap();
        assert_eq!(c1.data.len(), 20);
        assert_eq!(c1.timestamp, 1024);
        let eof = demux.next_chunk(0).unwrap();
        assert!(eof.is_eof());
    }

    #[test]
    fn seek_lands_on_the_nearest_sample_boundary() {
        let bytes = build_minimal_progressive_stream();
        let pool = BufferPool::new(1024 * 1024);
        let source = Box::new(MemSource(Cursor::new(bytes)));
        let mut demux = Mp4Demuxer::open(source, pool).unwrap();
        let landed = demux.seek(0, 25).unwrap(); // 25ms * 44100/1000 ~= 1102 -> sample 1
        assert_eq!(landed, 1024);
        let chunk = demux.next_chunk(0).unwrap();
        assert_eq!(chunk.data.len(), 20);
    }

    #[test]
    fn rejects_stream_without_ftyp() {
        let pool = BufferPool::new(1024 * 1024);
        let source = Box::new(MemSource(Cursor::new(vec![0u8; 16])));
        assert!(Mp4Demuxer::open(source, pool).is_err());
    }
}
