// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The sample table: `stts` (sample→time), `stsc` (sample→chunk), `stsz`
//! (sample sizes), `stco`/`co64` (chunk offsets), and `stss` (sync samples).
//! Parsing keeps the on-disk shape; [`SampleTable::new`] cross-validates the
//! tables and precomputes the `stsc` running `first_sample` column up front
//! so lookups are O(log n) rather than re-deriving it on every query.

use waveframe_core::error::{Error, Result};
use waveframe_core::io::byte_source::ByteSource;

use crate::boxes::read_full_box_header;

#[derive(Debug, Clone, Copy)]
pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

pub fn parse_stts(source: &mut dyn ByteSource) -> Result<Vec<SttsEntry>> {
    read_full_box_header(source)?;
    let entry_count = read_u32(source)?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let sample_count = read_u32(source)?;
        let sample_delta = read_u32(source)?;
        entries.push(SttsEntry { sample_count, sample_delta });
    }
    Ok(entries)
}

#[derive(Debug, Clone, Copy)]
pub struct StscEntry {
    /// Zero-indexed (the on-disk value is 1-indexed).
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    /// Zero-indexed running sample number of this entry's first sample,
    /// filled in by [`post_process_stsc`].
    pub first_sample: u32,
}

pub fn parse_stsc(source: &mut dyn ByteSource) -> Result<Vec<StscEntry>> {
    read_full_box_header(source)?;
    let entry_count = read_u32(source)?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let first_chunk = read_u32(source)?;
        if first_chunk == 0 {
            return Err(Error::BadFormat("isomp4 stsc: first_chunk is indexed from 1"));
        }
        let samples_per_chunk = read_u32(source)?;
        let _sample_desc_index = read_u32(source)?;
        entries.push(StscEntry { first_chunk: first_chunk - 1, samples_per_chunk, first_sample: 0 });
    }
    Ok(entries)
}

/// Fills in each entry's running `first_sample`, and validates `first_chunk`
/// is monotonic and within the chunk-offset table's bounds.
fn post_process_stsc(entries: &mut [StscEntry], total_chunks: u32) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    for entry in entries.iter() {
        if entry.first_chunk >= total_chunks {
            return Err(Error::BadFormat("isomp4 stsc: first_chunk exceeds chunk offset table"));
        }
    }
    for i in 0..entries.len() - 1 {
        if entries[i + 1].first_chunk <= entries[i].first_chunk {
            return Err(Error::BadFormat("isomp4 stsc: first_chunk is not monotonic"));
        }
        let n = entries[i + 1].first_chunk - entries[i].first_chunk;
        entries[i + 1].first_sample = entries[i].first_sample + n * entries[i].samples_per_chunk;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub enum SampleSizes {
    Constant(u32),
    Variable(Vec<u32>),
}

impl SampleSizes {
    fn count(&self) -> u32 {
        match self {
            SampleSizes::Constant(_) => 0,
            SampleSizes::Variable(v) => v.len() as u32,
        }
    }

    pub fn size_of(&self, sample_index: u32) -> u32 {
        match self {
            SampleSizes::Constant(size) => *size,
            SampleSizes::Variable(sizes) => sizes.get(sample_index as usize).copied().unwrap_or(0),
        }
    }
}

pub struct StszResult {
    pub sample_count: u32,
    pub sizes: SampleSizes,
}

pub fn parse_stsz(source: &mut dyn ByteSource) -> Result<StszResult> {
    read_full_box_header(source)?;
    let sample_size = read_u32(source)?;
    let sample_count = read_u32(source)?;
    let sizes = if sample_size == 0 {
        let mut entries = Vec::with_capacity(sample_count as usize);
        for _ in 0..sample_count {
            entries.push(read_u32(source)?);
        }
        SampleSizes::Variable(entries)
    } else {
        SampleSizes::Constant(sample_size)
    };
    Ok(StszResult { sample_count, sizes })
}

#[derive(Debug, Clone)]
pub enum ChunkOffsets {
    Narrow(Vec<u32>),
    Wide(Vec<u64>),
}

impl ChunkOffsets {
    fn len(&self) -> u32 {
        match self {
            ChunkOffsets::Narrow(v) => v.len() as u32,
            ChunkOffsets::Wide(v) => v.len() as u32,
        }
    }

    fn offset_of(&self, chunk_index: u32) -> Option<u64> {
        match self {
            ChunkOffsets::Narrow(v) => v.get(chunk_index as usize).map(|&o| o as u64),
            ChunkOffsets::Wide(v) => v.get(chunk_index as usize).copied(),
        }
    }
}

pub fn parse_stco(source: &mut dyn ByteSource) -> Result<ChunkOffsets> {
    read_full_box_header(source)?;
    let entry_count = read_u32(source)?;
    let mut offsets = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        offsets.push(read_u32(source)?);
    }
    Ok(ChunkOffsets::Narrow(offsets))
}

pub fn parse_co64(source: &mut dyn ByteSource) -> Result<ChunkOffsets> {
    read_full_box_header(source)?;
    let entry_count = read_u32(source)?;
    let mut offsets = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        offsets.push(read_u64(source)?);
    }
    Ok(ChunkOffsets::Wide(offsets))
}

/// Sync-sample table. Every audio sample is a sync sample per spec, so this
/// is parsed only to be available to callers and validated, never consulted
/// for seek decisions.
pub fn parse_stss(source: &mut dyn ByteSource) -> Result<Vec<u32>> {
    read_full_box_header(source)?;
    let entry_count = read_u32(source)?;
    let mut samples = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        samples.push(read_u32(source)?);
    }
    Ok(samples)
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

/// The assembled, cross-validated sample table for one track.
pub struct SampleTable {
    stts: Vec<SttsEntry>,
    stsc: Vec<StscEntry>,
    sizes: SampleSizes,
    offsets: ChunkOffsets,
    total_samples: u32,
}

impl SampleTable {
    pub fn new(
        stts: Vec<SttsEntry>,
        mut stsc: Vec<StscEntry>,
        stsz: StszResult,
        offsets: ChunkOffsets,
    ) -> Result<Self> {
        post_process_stsc(&mut stsc, offsets.len())?;

        let stts_total: u64 = stts.iter().map(|e| e.sample_count as u64).sum();
        if stsz.sizes.count() != 0 && u64::from(stsz.sizes.count()) != stts_total {
            return Err(Error::BadFormat("isomp4: stts and stsz sample counts disagree"));
        }
        if u64::from(stsz.sample_count) != stts_total {
            return Err(Error::BadFormat("isomp4: stts and stsz sample counts disagree"));
        }

        Ok(SampleTable { stts, stsc, sizes: stsz.sizes, offsets, total_samples: stsz.sample_count })
    }

    pub fn sample_count(&self) -> u32 {
        self.total_samples
    }

    pub fn sample_size(&self, sample_index: u32) -> u32 {
        self.sizes.size_of(sample_index)
    }

    /// Cumulative timestamp, in the media's own timescale, of `sample_index`.
    pub fn timestamp_for_sample(&self, sample_index: u32) -> u64 {
        let mut remaining = sample_index as u64;
        let mut ts = 0u64;
        for entry in &self.stts {
            let run = entry.sample_count as u64;
            if remaining < run {
                return ts + remaining * entry.sample_delta as u64;
            }
            ts += run * entry.sample_delta as u64;
            remaining -= run;
        }
        ts
    }

    /// Finds the first sample whose timestamp is `>= target_ts`. O(N) in the
    /// number of `stts` runs.
    pub fn sample_for_timestamp(&self, target_ts: u64) -> u32 {
        let mut sample_index = 0u32;
        let mut ts = 0u64;
        for entry in &self.stts {
            let run_duration = entry.sample_count as u64 * entry.sample_delta as u64;
            if entry.sample_delta != 0 && ts + run_duration > target_ts {
                let into_run = (target_ts - ts) / entry.sample_delta as u64;
                return sample_index + into_run as u32;
            }
            ts += run_duration;
            sample_index += entry.sample_count;
        }
        sample_index.saturating_sub(1)
    }

    /// Finds the `stsc` entry for `sample_index` via binary search, mirroring
    /// `StscAtom::find_entry_for_sample`.
    fn stsc_entry_for_sample(&self, sample_index: u32) -> Option<&StscEntry> {
        if self.stsc.is_empty() {
            return None;
        }
        let mut left = 1usize;
        let mut right = self.stsc.len();
        while left < right {
            let mid = left + (right - left) / 2;
            if self.stsc[mid].first_sample < sample_index {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        self.stsc.get(left - 1)
    }

    /// Byte offset of `sample_index`'s first byte, found by locating its
    /// chunk via `stsc`/`stco`/`co64`, then summing the sizes of every
    /// sample preceding it within that chunk.
    pub fn offset_for_sample(&self, sample_index: u32) -> Result<u64> {
        let entry = self
            .stsc_entry_for_sample(sample_index)
            .ok_or(Error::BadFormat("isomp4: sample index has no stsc entry"))?;

        let sample_in_entry = sample_index - entry.first_sample;
        let chunk_index = entry.first_chunk + sample_in_entry / entry.samples_per_chunk;
        let first_sample_of_chunk = entry.first_sample + (sample_in_entry / entry.samples_per_chunk) * entry.samples_per_chunk;

        let chunk_offset = self
            .offsets
            .offset_of(chunk_index)
            .ok_or(Error::BadFormat("isomp4: chunk index exceeds chunk offset table"))?;

        let mut offset = chunk_offset;
        for s in first_sample_of_chunk..sample_index {
            offset += self.sizes.size_of(s) as u64;
        }
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(stts: Vec<SttsEntry>, stsc: Vec<StscEntry>, sizes: Vec<u32>, offsets: Vec<u64>) -> SampleTable {
        let count = sizes.len() as u32;
        SampleTable::new(
            stts,
            stsc,
            StszResult { sample_count: count, sizes: SampleSizes::Variable(sizes) },
            ChunkOffsets::Wide(offsets),
        )
        .unwrap()
    }

    #[test]
    fn timestamp_for_sample_walks_stts_runs() {
        let stts = vec![SttsEntry { sample_count: 2, sample_delta: 1024 }];
        let stsc = vec![StscEntry { first_chunk: 0, samples_per_chunk: 2, first_sample: 0 }];
        let t = table(stts, stsc, vec![10, 10], vec![100]);
        assert_eq!(t.timestamp_for_sample(0), 0);
        assert_eq!(t.timestamp_for_sample(1), 1024);
    }

    #[test]
    fn sample_for_timestamp_inverts_timestamp_for_sample() {
        let stts = vec![SttsEntry { sample_count: 4, sample_delta: 1024 }];
        let stsc = vec![StscEntry { first_chunk: 0, samples_per_chunk: 4, first_sample: 0 }];
        let t = table(stts, stsc, vec![1, 1, 1, 1], vec![100]);
        assert_eq!(t.sample_for_timestamp(2049), 2);
    }

    #[test]
    fn offset_for_sample_sums_preceding_sizes_in_chunk() {
        let stts = vec![SttsEntry { sample_count: 3, sample_delta: 1024 }];
        let stsc = vec![StscEntry { first_chunk: 0, samples_per_chunk: 3, first_sample: 0 }];
        let t = table(stts, stsc, vec![10, 20, 30], vec![1000]);
        assert_eq!(t.offset_for_sample(0).unwrap(), 1000);
        assert_eq!(t.offset_for_sample(1).unwrap(), 1010);
        assert_eq!(t.offset_for_sample(2).unwrap(), 1030);
    }

    #[test]
    fn mismatched_stts_stsz_counts_are_rejected() {
        let stts = vec![SttsEntry { sample_count: 5, sample_delta: 1024 }];
        let stsc = vec![StscEntry { first_chunk: 0, samples_per_chunk: 1, first_sample: 0 }];
        let result = SampleTable::new(
            stts,
            stsc,
            StszResult { sample_count: 3, sizes: SampleSizes::Variable(vec![1, 2, 3]) },
            ChunkOffsets::Wide(vec![0, 1, 2]),
        );
        assert!(result.is_err());
    }
}
