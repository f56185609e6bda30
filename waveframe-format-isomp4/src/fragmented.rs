// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fragmented MP4 support: `mvex`/`trex` per-track defaults, `moof`/`traf`/
//! `tfhd`/`trun`/`tfdt`, and `sidx` segment indices.

use waveframe_core::error::Result;
use waveframe_core::io::byte_source::{ByteSource, Whence};

use crate::boxes::{read_full_box_header, walk_boxes};

#[derive(Debug, Clone, Copy, Default)]
pub struct TrackExtends {
    pub track_id: u32,
    pub default_sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
}

pub fn parse_trex(source: &mut dyn ByteSource) -> Result<TrackExtends> {
    read_full_box_header(source)?;
    Ok(TrackExtends {
        track_id: read_u32(source)?,
        default_sample_description_index: read_u32(source)?,
        default_sample_duration: read_u32(source)?,
        default_sample_size: read_u32(source)?,
        default_sample_flags: read_u32(source)?,
    })
}

/// `mvex`: walks its children, keeping one `trex` per track.
pub fn parse_mvex(source: &mut dyn ByteSource, end: u64) -> Result<Vec<TrackExtends>> {
    let mut trexs = Vec::new();
    walk_boxes(source, end, |source, header, _len| {
        if &header.box_type == b"trex" {
            trexs.push(parse_trex(source)?);
        }
        Ok(())
    })?;
    Ok(trexs)
}

const TFHD_BASE_DATA_OFFSET_PRESENT: u32 = 0x1;
const TFHD_SAMPLE_DESCRIPTION_INDEX_PRESENT: u32 = 0x2;
const TFHD_DEFAULT_SAMPLE_DURATION_PRESENT: u32 = 0x8;
const TFHD_DEFAULT_SAMPLE_SIZE_PRESENT: u32 = 0x10;
const TFHD_DEFAULT_SAMPLE_FLAGS_PRESENT: u32 = 0x20;
const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x2_0000;

#[derive(Debug, Clone, Copy, Default)]
pub struct TrackFragmentHeader {
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
    pub default_base_is_moof: bool,
}

pub fn parse_tfhd(source: &mut dyn ByteSource) -> Result<TrackFragmentHeader> {
    let (_, flags) = read_full_box_header(source)?;
    let track_id = read_u32(source)?;
    let base_data_offset = if flags & TFHD_BASE_DATA_OFFSET_PRESENT != 0 { Some(read_u64(source)?) } else { None };
    let sample_description_index =
        if flags & TFHD_SAMPLE_DESCRIPTION_INDEX_PRESENT != 0 { Some(read_u32(source)?) } else { None };
    let default_sample_duration =
        if flags & TFHD_DEFAULT_SAMPLE_DURATION_PRESENT != 0 { Some(read_u32(source)?) } else { None };
    let default_sample_size =
        if flags & TFHD_DEFAULT_SAMPLE_SIZE_PRESENT != 0 { Some(read_u32(source)?) } else { None };
    let default_sample_flags =
        if flags & TFHD_DEFAULT_SAMPLE_FLAGS_PRESENT != 0 { Some(read_u32(source)?) } else { None };
    // default-base-is-moof is ignored when base-data-offset is explicit.
    let default_base_is_moof = flags & TFHD_BASE_DATA_OFFSET_PRESENT == 0 && flags & TFHD_DEFAULT_BASE_IS_MOOF != 0;

    Ok(TrackFragmentHeader {
        track_id,
        base_data_offset,
        sample_description_index,
        default_sample_duration,
        default_sample_size,
        default_sample_flags,
        default_base_is_moof,
    })
}

pub fn parse_tfdt(source: &mut dyn ByteSource) -> Result<u64> {
    let (version, _) = read_full_box_header(source)?;
    if version == 1 { read_u64(source) } else { Ok(read_u32(source)? as u64) }
}

const TRUN_DATA_OFFSET_PRESENT: u32 = 0x1;
const TRUN_FIRST_SAMPLE_FLAGS_PRESENT: u32 = 0x4;
const TRUN_SAMPLE_DURATION_PRESENT: u32 = 0x100;
const TRUN_SAMPLE_SIZE_PRESENT: u32 = 0x200;
const TRUN_SAMPLE_FLAGS_PRESENT: u32 = 0x400;
const TRUN_SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT: u32 = 0x800;

#[derive(Debug, Clone, Default)]
pub struct TrackFragmentRun {
    pub data_offset: Option<i32>,
    pub sample_count: u32,
    pub sample_duration: Vec<u32>,
    pub sample_size: Vec<u32>,
}

pub fn parse_trun(source: &mut dyn ByteSource) -> Result<TrackFragmentRun> {
    let (_, flags) = read_full_box_header(source)?;
    let sample_count = read_u32(source)?;
    let data_offset = if flags & TRUN_DATA_OFFSET_PRESENT != 0 { Some(read_i32(source)?) } else { None };
    if flags & TRUN_FIRST_SAMPLE_FLAGS_PRESENT != 0 {
        read_u32(source)?;
    }

    let mut sample_duration = Vec::with_capacity(sample_count as usize);
    let mut sample_size = Vec::with_capacity(sample_count as usize);
    for _ in 0..sample_count {
        if flags & TRUN_SAMPLE_DURATION_PRESENT != 0 {
            sample_duration.push(read_u32(source)?);
        }
        if flags & TRUN_SAMPLE_SIZE_PRESENT != 0 {
            sample_size.push(read_u32(source)?);
        }
        if flags & TRUN_SAMPLE_FLAGS_PRESENT != 0 {
            read_u32(source)?;
        }
        if flags & TRUN_SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT != 0 {
            read_u32(source)?;
        }
    }

    Ok(TrackFragmentRun { data_offset, sample_count, sample_duration, sample_size })
}

/// One track fragment: its header plus every sample run within it.
pub struct TrackFragment {
    pub tfhd: TrackFragmentHeader,
    pub base_media_decode_time: Option<u64>,
    pub truns: Vec<TrackFragmentRun>,
}

pub fn parse_traf(source: &mut dyn ByteSource, end: u64) -> Result<TrackFragment> {
    let mut tfhd = None;
    let mut base_media_decode_time = None;
    let mut truns = Vec::new();

    walk_boxes(source, end, |source, header, _len| {
        match &header.box_type {
            b"tfhd" => tfhd = Some(parse_tfhd(source)?),
            b"tfdt" => base_media_decode_time = Some(parse_tfdt(source)?),
            b"trun" => truns.push(parse_trun(source)?),
            _ => {}
        }
        Ok(())
    })?;

    let tfhd = tfhd.ok_or(waveframe_core::error::Error::BadFormat("isomp4 traf: missing tfhd"))?;
    Ok(TrackFragment { tfhd, base_media_decode_time, truns })
}

/// One movie fragment: its base file offset (the anchor for
/// `default-base-is-moof` and `trun` data offsets) plus its track
/// fragments.
pub struct MovieFragment {
    pub moof_start: u64,
    pub trafs: Vec<TrackFragment>,
}

pub fn parse_moof(source: &mut dyn ByteSource, moof_start: u64, end: u64) -> Result<MovieFragment> {
    let mut trafs = Vec::new();
    walk_boxes(source, end, |source, header, len| {
        if &header.box_type == b"traf" {
            let traf_end = source.tell() + len;
            trafs.push(parse_traf(source, traf_end)?);
        }
        Ok(())
    })?;
    Ok(MovieFragment { moof_start, trafs })
}

#[derive(Debug, Clone, Copy)]
pub struct SidxReference {
    pub subsegment_duration: u32,
    pub referenced_size: u32,
}

/// Segment index: maps presentation-time ranges to byte ranges within the
/// fragment stream, letting a seek jump straight to the right fragment
/// before falling back to a linear scan within it.
pub struct SegmentIndex {
    pub timescale: u32,
    pub earliest_presentation_time: u64,
    /// Absolute byte offset of the first referenced segment.
    pub first_segment_offset: u64,
    pub references: Vec<SidxReference>,
}

/// Parses `sidx`. `anchor` is the absolute byte offset of the first byte
/// after this box — the reference point `first_offset` is added to, per the
/// spec's definition of the segment-index anchor.
pub fn parse_sidx(source: &mut dyn ByteSource, anchor: u64) -> Result<SegmentIndex> {
    let (version, _) = read_full_box_header(source)?;
    let _reference_id = read_u32(source)?;
    let timescale = read_u32(source)?;

    let (earliest_presentation_time, first_offset) = if version == 0 {
        (read_u32(source)? as u64, read_u32(source)? as u64)
    } else {
        (read_u64(source)?, read_u64(source)?)
    };

    read_u16(source)?; // reserved
    let reference_count = read_u16(source)?;
    let mut references = Vec::with_capacity(reference_count as usize);
    for _ in 0..reference_count {
        let reference = read_u32(source)?;
        let subsegment_duration = read_u32(source)?;
        read_u32(source)?; // SAP info, unused
        references.push(SidxReference { subsegment_duration, referenced_size: reference & 0x7FFF_FFFF });
    }

    Ok(SegmentIndex {
        timescale,
        earliest_presentation_time,
        first_segment_offset: anchor + first_offset,
        references,
    })
}

fn read_u16(source: &mut dyn ByteSource) -> Result<u16> {
    let mut buf = [0u8; 2];
    source.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32(source: &mut dyn ByteSource) -> Result<u32> {
    let mut buf = [0u8; 4];
    source.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_i32(source: &mut dyn ByteSource) -> Result<i32> {
    Ok(read_u32(source)? as i32)
}

fn read_u64(source: &mut dyn ByteSource) -> Result<u64> {
    let mut buf = [0u8; 8];
    source.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
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

    #[test]
    fn tfhd_reads_only_flagged_optional_fields() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&[0, 0, 0, 0x1 | 0x8]); // version 0, base_data_offset + default_duration
        bytes.extend_from_slice(&7u32.to_be_bytes()); // track_id
        bytes.extend_from_slice(&1000u64.to_be_bytes()); // base_data_offset
        bytes.extend_from_slice(&1024u32.to_be_bytes()); // default_sample_duration
        let mut src = MemSource(Cursor::new(bytes));
        let tfhd = parse_tfhd(&mut src).unwrap();
        assert_eq!(tfhd.track_id, 7);
        assert_eq!(tfhd.base_data_offset, Some(1000));
        assert_eq!(tfhd.default_sample_duration, Some(1024));
        assert_eq!(tfhd.default_sample_size, None);
    }

    #[test]
    fn trun_reads_per_sample_duration_and_size() {
        // flags = SAMPLE_DURATION_PRESENT (0x100) | SAMPLE_SIZE_PRESENT (0x200) = 0x300
        let mut bytes = vec![0u8, 0x00, 0x03, 0x00];
        bytes.extend_from_slice(&2u32.to_be_bytes()); // sample_count
        bytes.extend_from_slice(&1024u32.to_be_bytes());
        bytes.extend_from_slice(&500u32.to_be_bytes());
        bytes.extend_from_slice(&1024u32.to_be_bytes());
        bytes.extend_from_slice(&600u32.to_be_bytes());
        let mut src = MemSource(Cursor::new(bytes));
        let trun = parse_trun(&mut src).unwrap();
        assert_eq!(trun.sample_count, 2);
        assert_eq!(trun.sample_duration, vec![1024, 1024]);
        assert_eq!(trun.sample_size, vec![500, 600]);
    }
}
