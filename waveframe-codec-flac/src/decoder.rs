// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `AudioDecoder` implementation: frame parsing, subframe decode,
//! channel decorrelation, bit-depth conversion, and CRC bookkeeping.

use waveframe_core::checksum::{Crc16Ansi, Md5};
use waveframe_core::codecs::{AudioDecoder, DecoderOptions};
use waveframe_core::error::{Error, Result};
use waveframe_core::formats::StreamInfo;
use waveframe_core::io::bitstream::BitstreamReader;
use waveframe_core::log_channel::{log_msg, Channel, Level};
use waveframe_core::packet::{AudioFrame, MediaChunk};

use crate::frame::{parse_frame_header, verify_header_crc8, ChannelAssignment, StreamConstraints};
use crate::subframe::decode_subframe;

/// Running counters surfaced to callers that want to judge stream health
/// without the decoder hard-failing on every recoverable error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub crc_failures: u64,
    pub resyncs: u64,
    pub crc_checking_disabled: bool,
}

pub struct FlacDecoder {
    options: DecoderOptions,
    constraints: StreamConstraints,
    stats: DecoderStats,
    /// STREAMINFO's stored signature, present whenever the encoder computed
    /// one (an all-zero signature means "not computed", per RFC 9639 §8.2).
    expected_md5: Option<[u8; 16]>,
    running_md5: Option<Md5>,
}

impl FlacDecoder {
    pub fn new(options: &DecoderOptions, stream_info: &StreamInfo) -> Self {
        let constraints = StreamConstraints {
            sample_rate: stream_info.sample_rate,
            bits_per_sample: stream_info.bits_per_sample,
            channels: stream_info.channels,
        };
        let expected_md5 = stream_info
            .codec_setup
            .as_deref()
            .and_then(|bytes| <[u8; 16]>::try_from(bytes).ok())
            .filter(|md5| *md5 != [0u8; 16]);
        FlacDecoder {
            options: options.clone(),
            constraints,
            stats: DecoderStats { crc_checking_disabled: !options.verify_crc, ..Default::default() },
            running_md5: expected_md5.map(|_| Md5::new()),
            expected_md5,
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Compares the running MD5 of decoded PCM against STREAMINFO's stored
    /// signature. Returns `None` when no signature was present (verification
    /// skipped rather than failed); callers call this once after the last
    /// chunk has been decoded.
    pub fn finalize_md5_verification(&mut self) -> Option<bool> {
        let expected = self.expected_md5?;
        let running = self.running_md5.take()?;
        Some(running.finalize() == expected)
    }

    /// Feeds this frame's decoded samples, at their native bit depth and
    /// interleaved in channel order, into the running MD5 accumulator.
    fn accumulate_md5(&mut self, channels: &[Vec<i64>], bits_per_sample: u8) {
        let Some(md5) = self.running_md5.as_mut() else { return };
        let bytes_per_sample = ((bits_per_sample as usize) + 7) / 8;
        if channels.is_empty() {
            return;
        }
        let frames = channels[0].len();
        let mut buf = Vec::with_capacity(frames * channels.len() * bytes_per_sample);
        for i in 0..frames {
            for ch in channels {
                let sample = ch[i];
                let le = sample.to_le_bytes();
                buf.extend_from_slice(&le[..bytes_per_sample]);
            }
        }
        md5.update(&buf);
    }

    fn decode_frame(&mut self, bytes: &[u8]) -> Result<(Vec<i16>, u32, u8)> {
        if bytes.len() < 3 {
            return Err(Error::Truncated("FLAC frame shorter than header + CRC16"));
        }
        let (body, footer_crc_bytes) = bytes.split_at(bytes.len() - 2);
        let stored_footer_crc = u16::from_be_bytes([footer_crc_bytes[0], footer_crc_bytes[1]]);

        let mut reader = BitstreamReader::new();
        reader.feed(body);
        let (header, _crc8_tail) = parse_frame_header(&mut reader, &self.constraints)?;

        let header_len = header.header_len;
        if self.options.verify_crc && !verify_header_crc8(&body[..header_len]) {
            self.stats.crc_failures += 1;
            return Err(Error::Corrupted("FLAC frame header CRC-8 mismatch"));
        }

        let depth = header.bits_per_sample as u32;
        let (ch0_depth, ch1_depth) = match header.channel_assignment {
            ChannelAssignment::LeftSide => (depth, depth + 1),
            ChannelAssignment::RightSide => (depth + 1, depth),
            ChannelAssignment::MidSide => (depth, depth + 1),
            ChannelAssignment::Independent(_) => (depth, depth),
        };

        let channel_count = header.channel_assignment.channel_count() as usize;
        let mut channels: Vec<Vec<i64>> = Vec::with_capacity(channel_count.max(2));
        match header.channel_assignment {
            ChannelAssignment::Independent(n) => {
                for _ in 0..n {
                    let decoded = decode_subframe(&mut reader, header.block_size, depth, header.sample_rate)?;
                    channels.push(decoded.samples);
                }
            }
            ChannelAssignment::LeftSide | ChannelAssignment::RightSide | ChannelAssignment::MidSide => {
                let sub0 = decode_subframe(&mut reader, header.block_size, ch0_depth, header.sample_rate)?;
                let sub1 = decode_subframe(&mut reader, header.block_size, ch1_depth, header.sample_rate)?;
                let (left, right) = reconstruct_stereo(header.channel_assignment, sub0.samples, sub1.samples);
                channels.push(left);
                channels.push(right);
            }
        }

        let padding_nonzero = reader.align_to_byte()?;
        if padding_nonzero > 0 && self.options.strict_padding {
            return Err(Error::BadFormat("non-zero frame padding bits with strict_padding enabled"));
        }

        if self.options.verify_crc {
            let mut crc = Crc16Ansi::new();
            crc.update_buf(body);
            if crc.get() != stored_footer_crc {
                self.stats.crc_failures += 1;
                return Err(Error::Corrupted("FLAC frame footer CRC-16 mismatch"));
            }
        }

        let bits_per_sample = header.bits_per_sample;
        self.accumulate_md5(&channels, bits_per_sample);
        let samples = interleave_and_convert(&channels, bits_per_sample);
        Ok((samples, header.sample_rate, channel_count as u8))
    }
}

fn reconstruct_stereo(assignment: ChannelAssignment, sub0: Vec<i64>, sub1: Vec<i64>) -> (Vec<i64>, Vec<i64>) {
    let n = sub0.len().max(sub1.len());
    let mut left = Vec::with_capacity(n);
    let mut right = Vec::with_capacity(n);
    match assignment {
        ChannelAssignment::LeftSide => {
            for i in 0..n {
                let l = sub0[i];
                let side = sub1[i];
                left.push(l);
                right.push(l - side);
            }
        }
        ChannelAssignment::RightSide => {
            for i in 0..n {
                let side = sub0[i];
                let r = sub1[i];
                left.push(r + side);
                right.push(r);
            }
        }
        ChannelAssignment::MidSide => {
            for i in 0..n {
                let mid = sub0[i];
                let side = sub1[i];
                let mid_doubled = (mid << 1) | (side & 1);
                left.push((mid_doubled + side) >> 1);
                right.push((mid_doubled - side) >> 1);
            }
        }
        ChannelAssignment::Independent(_) => unreachable!("stereo reconstruction called on independent channels"),
    }
    (left, right)
}

/// Converts decoded samples at `bits` depth to i16 per the conversion rule:
/// narrower samples are left-shifted up, 16-bit samples pass through, and
/// wider samples are shifted down and clamped.
fn narrow_to_i16(sample: i64, bits: u8) -> i16 {
    match bits.cmp(&16) {
        std::cmp::Ordering::Less => (sample << (16 - bits)) as i16,
        std::cmp::Ordering::Equal => sample as i16,
        std::cmp::Ordering::Greater => (sample >> (bits - 16)).clamp(i16::MIN as i64, i16::MAX as i64) as i16,
    }
}

fn interleave_and_convert(channels: &[Vec<i64>], bits_per_sample: u8) -> Vec<i16> {
    if channels.is_empty() {
        return Vec::new();
    }
    let frames = channels[0].len();
    let mut out = Vec::with_capacity(frames * channels.len());
    for i in 0..frames {
        for ch in channels {
            out.push(narrow_to_i16(ch[i], bits_per_sample));
        }
    }
    out
}

impl AudioDecoder for FlacDecoder {
    fn codec_name(&self) -> &'static str {
        "flac"
    }

    fn decode(&mut self, chunk: &MediaChunk) -> Result<AudioFrame> {
        if chunk.is_eof() {
            return Ok(AudioFrame { samples: Vec::new(), sample_rate: self.constraints.sample_rate, channels: 0, timestamp: chunk.timestamp });
        }
        match self.decode_frame(chunk.data.as_slice()) {
            Ok((samples, sample_rate, channels)) => {
                self.stats.frames_decoded += 1;
                Ok(AudioFrame { samples, sample_rate, channels, timestamp: chunk.timestamp })
            }
            Err(err) => {
                log_msg(Channel::FlacCodec, Level::Warn, &format!("frame at sample {} failed: {err}", chunk.timestamp));
                Err(err)
            }
        }
    }

    fn reset(&mut self) {
        self.stats.resyncs += 1;
    }
}

pub fn make_decoder(options: &DecoderOptions, stream_info: &StreamInfo) -> Box<dyn AudioDecoder> {
    Box::new(FlacDecoder::new(options, stream_info))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_to_i16_passthrough_at_16_bits() {
        assert_eq!(narrow_to_i16(1234, 16), 1234);
        assert_eq!(narrow_to_i16(-1234, 16), -1234);
    }

    #[test]
    fn narrow_to_i16_widens_8_bit() {
        assert_eq!(narrow_to_i16(0x7F, 8), (0x7F_i64 << 8) as i16);
    }

    #[test]
    fn narrow_to_i16_clamps_24_bit_overflow() {
        let big = (1i64 << 23) - 1;
        assert_eq!(narrow_to_i16(big, 24), i16::MAX);
    }

    #[test]
    fn reconstruct_mid_side_matches_left_right() {
        // L=10, R=4 => mid = (10+4)>>1 = 7, side = 10-4 = 6
        let (left, right) = reconstruct_stereo(ChannelAssignment::MidSide, vec![7], vec![6]);
        assert_eq!(left[0], 10);
        assert_eq!(right[0], 4);
    }

    #[test]
    fn reconstruct_left_side() {
        let (left, right) = reconstruct_stereo(ChannelAssignment::LeftSide, vec![10], vec![6]);
        assert_eq!(left[0], 10);
        assert_eq!(right[0], 4);
    }

    fn stream_info_with_md5(md5: [u8; 16]) -> StreamInfo {
        StreamInfo {
            stream_id: 0,
            codec_name: "flac",
            sample_rate: 44_100,
            channels: 1,
            bits_per_sample: 16,
            duration_samples: 0,
            duration_ms: 0,
            bitrate_bps: 0,
            codec_setup: Some(md5.to_vec()),
        }
    }

    #[test]
    fn all_zero_signature_skips_verification() {
        let options = DecoderOptions::default();
        let info = stream_info_with_md5([0u8; 16]);
        let mut decoder = FlacDecoder::new(&options, &info);
        assert_eq!(decoder.finalize_md5_verification(), None);
    }

    #[test]
    fn nonzero_signature_is_checked_against_decoded_pcm() {
        let options = DecoderOptions::default();
        let mut expected = Md5::new();
        expected.update(&1i16.to_le_bytes());
        expected.update(&2i16.to_le_bytes());
        let info = stream_info_with_md5(expected.finalize());

        let mut decoder = FlacDecoder::new(&options, &info);
        decoder.accumulate_md5(&[vec![1i64, 2i64]], 16);
        assert_eq!(decoder.finalize_md5_verification(), Some(true));
    }
}
