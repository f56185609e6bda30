// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One track: `tkhd` (track id), `mdia` → `mdhd` (media timescale) and
//! `hdlr` (audio/video discrimination), `minf` → `stbl` (sample description
//! and sample table).

use waveframe_core::error::{Error, Result};
use waveframe_core::io::byte_source::ByteSource;

use crate::boxes::{read_full_box_header, walk_boxes};
use crate::sample_table::{
    parse_co64, parse_stco, parse_stsc, parse_stss, parse_stsz, parse_stts, SampleTable, StscEntry,
};
use crate::stsd::{parse_stsd, AudioSampleEntry};

pub struct Track {
    pub track_id: u32,
    pub media_timescale: u32,
    pub media_duration: u64,
    pub audio: AudioSampleEntry,
    pub sample_table: SampleTable,
}

/// Parses one `trak` box. Returns `Ok(None)` for a non-audio track (its
/// `hdlr` handler type is not `soun`) rather than erroring — a video track
/// alongside the audio track in the same file is routine, not malformed.
pub fn parse_trak(source: &mut dyn ByteSource, end: u64) -> Result<Option<Track>> {
    let mut track_id = None;
    let mut is_audio = false;
    let mut media_timescale = None;
    let mut media_duration = 0u64;
    let mut stts = None;
    let mut stsc = None;
    let mut stsz = None;
    let mut offsets = None;
    let mut audio = None;

    walk_boxes(source, end, |source, header, len| {
        match &header.box_type {
            b"tkhd" => {
                let (version, _flags) = read_full_box_header(source)?;
                // Version 1 uses 64-bit time fields; version 0 uses 32-bit.
                let skip_before_id = if version == 1 { 8 + 8 } else { 4 + 4 };
                source_seek_forward(source, skip_before_id)?;
                track_id = Some(read_u32(source)?);
                skip_remaining(source, header.start, len)?;
                Ok(())
            }
            b"mdia" => {
                let mdia_end = source.tell() + len;
                walk_boxes(source, mdia_end, |source, header, len| match &header.box_type {
                    b"mdhd" => {
                        let (version, _) = read_full_box_header(source)?;
                        if version == 1 {
                            source_seek_forward(source, 8 + 8)?;
                            media_timescale = Some(read_u32(source)?);
                            media_duration = read_u64(source)?;
                        } else {
                            source_seek_forward(source, 4 + 4)?;
                            media_timescale = Some(read_u32(source)?);
                            media_duration = match read_u32(source)? {
                                u32::MAX => u64::MAX,
                                d => d as u64,
                            };
                        }
                        skip_remaining(source, header.start, len)
                    }
                    b"hdlr" => {
                        read_full_box_header(source)?;
                        source_seek_forward(source, 4)?;
                        let mut handler_type = [0u8; 4];
                        source.read_exact(&mut handler_type)?;
                        is_audio = &handler_type == b"soun";
                        skip_remaining(source, header.start, len)
                    }
                    b"minf" => {
                        let minf_end = source.tell() + len;
                        walk_boxes(source, minf_end, |source, header, len| {
                            if &header.box_type == b"stbl" {
                                let stbl_end = source.tell() + len;
                                walk_boxes(source, stbl_end, |source, header, len| {
                                    match &header.box_type {
                                        b"stsd" => {
                                            let entry_end = source.tell() + len;
                                            audio = Some(parse_stsd(source, entry_end)?);
                                            skip_remaining(source, header.start, len)
                                        }
                                        b"stts" => {
                                            stts = Some(parse_stts(source)?);
                                            Ok(())
                                        }
                                        b"stsc" => {
                                            stsc = Some(parse_stsc(source)?);
                                            Ok(())
                                        }
                                        b"stsz" => {
                                            stsz = Some(parse_stsz(source)?);
                                            Ok(())
                                        }
                                        b"stco" => {
                                            offsets = Some(parse_stco(source)?);
                                            Ok(())
                                        }
                                        b"co64" => {
                                            offsets = Some(parse_co64(source)?);
                                            Ok(())
                                        }
                                        b"stss" => {
                                            let _ = parse_stss(source)?;
                                            Ok(())
                                        }
                                        _ => Ok(()),
                                    }
                                })
                            } else {
                                Ok(())
                            }
                        })
                    }
                    _ => Ok(()),
                })
            }
            _ => Ok(()),
        }
    })?;

    if !is_audio {
        return Ok(None);
    }

    let track_id = track_id.ok_or(Error::BadFormat("isomp4 trak: missing tkhd"))?;
    let media_timescale = media_timescale.ok_or(Error::BadFormat("isomp4 trak: missing mdhd"))?;
    let audio = audio.ok_or(Error::BadFormat("isomp4 trak: audio track missing stsd"))?;

    let (stts, stsc, stsz, offsets) = match (stts, stsc, stsz, offsets) {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        // A fragmented-MP4 audio track legitimately has an empty sample
        // table in `moov`; samples arrive later via `moof`/`trun`.
        _ => (
            Vec::new(),
            Vec::<StscEntry>::new(),
            crate::sample_table::StszResult { sample_count: 0, sizes: crate::sample_table::SampleSizes::Constant(0) },
            crate::sample_table::ChunkOffsets::Narrow(Vec::new()),
        ),
    };
    let sample_table = SampleTable::new(stts, stsc, stsz, offsets)?;

    Ok(Some(Track { track_id, media_timescale, media_duration, audio, sample_table }))
}

fn source_seek_forward(source: &mut dyn ByteSource, bytes: i64) -> Result<()> {
    source.seek(bytes, waveframe_core::io::byte_source::Whence::Current)?;
    Ok(())
}

fn skip_remaining(source: &mut dyn ByteSource, box_start: u64, data_len_hint: u64) -> Result<()> {
    let end = box_start + 8 + data_len_hint;
    let here = source.tell();
    if here < end {
        source_seek_forward(source, (end - here) as i64)?;
    }
    Ok(())
}

fn read_u32(source: &mut dyn ByteSource) -> Result<u32> {
    let mut buf = [0u8; 4];
    source.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64(source: &mut dyn ByteSource) -> Result<u64> {
    let mut buf = [0u8; 8];
    source.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

