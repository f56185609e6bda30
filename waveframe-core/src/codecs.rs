// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `AudioDecoder` trait and a name-keyed registry, dispatched only at
//! the registry boundary — never on the hot per-sample decode path.

use crate::error::Result;
use crate::packet::{AudioFrame, MediaChunk};

/// Tunables shared across decoder implementations.
#[derive(Debug, Clone)]
pub struct DecoderOptions {
    /// Reject frames whose footer CRC fails rather than counting and
    /// continuing. Disabling is itself reported through decoder statistics.
    pub verify_crc: bool,
    /// When `true`, non-zero padding bits encountered at `align_to_byte`
    /// fail the frame instead of only being logged.
    pub strict_padding: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions { verify_crc: true, strict_padding: false }
    }
}

/// A codec's decode side: consumes encoded `MediaChunk`s for one stream and
/// produces decoded `AudioFrame`s.
pub trait AudioDecoder: Send {
    fn codec_name(&self) -> &'static str;

    fn decode(&mut self, chunk: &MediaChunk) -> Result<AudioFrame>;

    /// Discards any internal lookahead state; called after a seek.
    fn reset(&mut self);
}

type DecoderFactory = fn(&DecoderOptions, &crate::formats::StreamInfo) -> Box<dyn AudioDecoder>;

/// Maps a codec name (as surfaced by a demuxer's `StreamInfo`) to a decoder
/// factory function.
pub struct CodecRegistry {
    factories: Vec<(&'static str, DecoderFactory)>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        CodecRegistry { factories: Vec::new() }
    }

    pub fn register(&mut self, codec_name: &'static str, factory: DecoderFactory) {
        self.factories.push((codec_name, factory));
    }

    pub fn make_decoder(
        &self,
        codec_name: &str,
        options: &DecoderOptions,
        stream_info: &crate::formats::StreamInfo,
    ) -> Option<Box<dyn AudioDecoder>> {
        self.factories
            .iter()
            .find(|(name, _)| *name == codec_name)
            .map(|(_, factory)| factory(options, stream_info))
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}
