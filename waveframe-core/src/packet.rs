// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Encoded and decoded payload types that flow between demuxer, streaming
//! manager, and decoder.

use crate::io::buffer_pool::PooledBuffer;

/// An encoded payload for one logical stream at one timestamp. An empty
/// chunk (`data` has length zero) signals end-of-stream for that stream.
pub struct MediaChunk {
    pub stream_id: u32,
    pub data: PooledBuffer,
    /// Timestamp in samples (the container's granule/sample-number concept).
    pub timestamp: u64,
    /// Byte offset in the source this chunk was read from; debug-only.
    pub file_offset: u64,
    /// True for every audio frame in this core (no B-frame reordering).
    pub keyframe: bool,
}

impl MediaChunk {
    pub fn is_eof(&self) -> bool {
        self.data.is_empty()
    }
}

/// Decoded PCM output: interleaved i16 samples for one block.
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u8,
    /// Timestamp of the first sample in this frame, in samples.
    pub timestamp: u64,
}

impl AudioFrame {
    pub fn frame_sample_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}
