// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-codec Ogg header-packet mappings: recognizing a logical bitstream's
//! codec from its first packet and extracting `StreamInfo` fields from the
//! identification and comment headers.

pub mod flac;
pub mod opus;
pub mod vorbis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OggCodec {
    Vorbis,
    Opus,
    Flac,
    Speex,
}

impl OggCodec {
    /// Number of header packets (including the identification packet
    /// itself) that precede the first data packet for this codec.
    pub fn header_packet_count(self) -> usize {
        match self {
            OggCodec::Vorbis => 3,
            OggCodec::Opus => 2,
            OggCodec::Flac => 1, // packet count is read from the FLAC-in-Ogg header itself
            OggCodec::Speex => 2,
        }
    }

    pub fn codec_name(self) -> &'static str {
        match self {
            OggCodec::Vorbis => "vorbis",
            OggCodec::Opus => "opus",
            OggCodec::Flac => "flac",
            OggCodec::Speex => "speex",
        }
    }
}

/// Identifies a logical bitstream's codec from its first (BOS) packet.
pub fn identify(first_packet: &[u8]) -> Option<OggCodec> {
    if first_packet.starts_with(vorbis::SIGNATURE) {
        Some(OggCodec::Vorbis)
    } else if first_packet.starts_with(opus::SIGNATURE) {
        Some(OggCodec::Opus)
    } else if first_packet.starts_with(flac::SIGNATURE_PREFIX) || first_packet.starts_with(b"fLaC") {
        Some(OggCodec::Flac)
    } else if first_packet.starts_with(b"Speex   ") {
        Some(OggCodec::Speex)
    } else {
        None
    }
}
