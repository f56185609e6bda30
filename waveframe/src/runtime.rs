// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The owned root of the pipeline: a buffer pool plus the demuxer and codec
//! registries, wired together once and passed explicitly to every `open()`
//! rather than reached through a hidden global singleton (see the
//! "Singletons and process-wide state" design note).

use std::sync::Arc;

use waveframe_core::codecs::{CodecRegistry, DecoderOptions};
use waveframe_core::formats::{DemuxerRegistry, FormatOptions};
use waveframe_core::io::buffer_pool::{BufferPool, PoolOptions};
use waveframe_core::streaming::StreamingOptions;

use crate::stream::{open_with_runtime, DecodedStream};

/// Construction-time tuning for a [`Runtime`], grouping the ambient
/// `*Options` structs the same way `DecoderOptions`/`FormatOptions` group
/// their own fields.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    pub pool: PoolOptions,
    pub format: FormatOptions,
    pub decoder: DecoderOptions,
    pub streaming: StreamingOptions,
}

/// Holds the buffer pool and the demuxer/codec registries for one process.
/// Cheap to construct; expensive state (the pool's bins) lives behind an
/// `Arc` so a `Runtime` can be cloned-by-reference into worker threads.
pub struct Runtime {
    pub(crate) pool: Arc<BufferPool>,
    pub(crate) demuxers: DemuxerRegistry,
    pub(crate) codecs: CodecRegistry,
    pub(crate) format_options: FormatOptions,
    pub(crate) decoder_options: DecoderOptions,
    pub(crate) streaming_options: StreamingOptions,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    pub fn with_options(options: RuntimeOptions) -> Self {
        let mut codecs = CodecRegistry::new();
        waveframe_codec_flac::register(&mut codecs);
        waveframe_codec_pcm::register(&mut codecs);

        Runtime {
            pool: BufferPool::with_options(options.pool),
            demuxers: DemuxerRegistry::with_builtins(),
            codecs,
            format_options: options.format,
            decoder_options: options.decoder,
            streaming_options: options.streaming,
        }
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Probes `uri`, constructs the matching demuxer and decoder, and starts
    /// a streaming manager feeding a [`DecodedStream`]. URI schemes:
    /// `file://` (also the default for a plain path with no scheme),
    /// `http://`, `https://` (behind the `http` feature).
    pub fn open(&self, uri: &str) -> waveframe_core::Result<DecodedStream> {
        open_with_runtime(self, uri)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
