// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integer PCM, IEEE float, A-law, and mu-law decoders.

mod decoder;
mod setup;
mod tables;

pub use decoder::PcmDecoder;
pub use setup::{PcmSetup, SampleEncoding};

use waveframe_core::codecs::{AudioDecoder, CodecRegistry, DecoderOptions};
use waveframe_core::formats::StreamInfo;

/// Registers this crate's decoder under every codec name it can produce.
/// All three names resolve to the same factory; which encoding it decodes
/// is read back out of `StreamInfo::codec_setup` at construction time.
pub fn register(registry: &mut CodecRegistry) {
    fn make(options: &DecoderOptions, stream_info: &StreamInfo) -> Box<dyn AudioDecoder> {
        Box::new(PcmDecoder::new(options, stream_info))
    }
    registry.register("pcm", make);
    registry.register("alaw", make);
    registry.register("mulaw", make);
}
