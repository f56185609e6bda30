// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Native FLAC demuxer and RFC 9639 decoder.

mod decoder;
mod demuxer;
mod frame;
mod metadata;
mod subframe;

pub use decoder::{DecoderStats, FlacDecoder};
pub use demuxer::FlacDemuxer;
pub use frame::{ChannelAssignment, FrameHeader, StreamConstraints};
pub use metadata::{SeekPoint, StreamInfoBlock};

use waveframe_core::codecs::CodecRegistry;

/// Registers the FLAC decoder under its codec name.
pub fn register(registry: &mut CodecRegistry) {
    registry.register("flac", decoder::make_decoder);
}
