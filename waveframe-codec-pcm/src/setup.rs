// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The wire contract a container demuxer uses to tell this crate's decoders
//! which PCM variant a stream carries, via `StreamInfo::codec_setup`.
//!
//! RIFF/AIFF are the only demuxers in this workspace that produce PCM or
//! companded streams; this is the private contract between them and here.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    IntLittleEndian,
    IntBigEndian,
    FloatLittleEndian,
    FloatBigEndian,
    ALaw,
    MuLaw,
}

#[derive(Debug, Clone, Copy)]
pub struct PcmSetup {
    pub encoding: SampleEncoding,
    pub bits_per_sample: u8,
}

impl PcmSetup {
    pub fn encode(self) -> Vec<u8> {
        let tag = match self.encoding {
            SampleEncoding::IntLittleEndian => 0u8,
            SampleEncoding::IntBigEndian => 1,
            SampleEncoding::FloatLittleEndian => 2,
            SampleEncoding::FloatBigEndian => 3,
            SampleEncoding::ALaw => 4,
            SampleEncoding::MuLaw => 5,
        };
        vec![tag, self.bits_per_sample]
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let &[tag, bits] = bytes else { return None };
        let encoding = match tag {
            0 => SampleEncoding::IntLittleEndian,
            1 => SampleEncoding::IntBigEndian,
            2 => SampleEncoding::FloatLittleEndian,
            3 => SampleEncoding::FloatBigEndian,
            4 => SampleEncoding::ALaw,
            5 => SampleEncoding::MuLaw,
            _ => return None,
        };
        Some(PcmSetup { encoding, bits_per_sample: bits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let setup = PcmSetup { encoding: SampleEncoding::IntBigEndian, bits_per_sample: 24 };
        let bytes = setup.encode();
        let back = PcmSetup::decode(&bytes).unwrap();
        assert_eq!(back.encoding, SampleEncoding::IntBigEndian);
        assert_eq!(back.bits_per_sample, 24);
    }
}
