// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoders for the PCM codec family: integer PCM, IEEE float, A-law, and
//! mu-law, all converging on interleaved i16 output.

use waveframe_core::codecs::{AudioDecoder, DecoderOptions};
use waveframe_core::error::{Error, Result};
use waveframe_core::formats::StreamInfo;
use waveframe_core::packet::{AudioFrame, MediaChunk};

use crate::setup::{PcmSetup, SampleEncoding};
use crate::tables::{ALAW_TABLE, MULAW_TABLE};

pub struct PcmDecoder {
    setup: PcmSetup,
    sample_rate: u32,
    channels: u8,
}

impl PcmDecoder {
    pub fn new(_options: &DecoderOptions, stream_info: &StreamInfo) -> Self {
        let setup = stream_info
            .codec_setup
            .as_deref()
            .and_then(PcmSetup::decode)
            .unwrap_or(PcmSetup {
                encoding: SampleEncoding::IntLittleEndian,
                bits_per_sample: stream_info.bits_per_sample,
            });
        PcmDecoder { setup, sample_rate: stream_info.sample_rate, channels: stream_info.channels }
    }

    fn decode_int_sample(&self, bytes: &[u8], big_endian: bool) -> i32 {
        let bits = self.setup.bits_per_sample;
        let bytes_per_sample = ((bits as usize) + 7) / 8;
        let mut raw: u32 = 0;
        if big_endian {
            for &b in &bytes[..bytes_per_sample] {
                raw = (raw << 8) | b as u32;
            }
        } else {
            for &b in bytes[..bytes_per_sample].iter().rev() {
                raw = (raw << 8) | b as u32;
            }
        }
        let total_bits = (bytes_per_sample * 8) as u32;
        sign_extend(raw, total_bits)
    }
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    if bits >= 32 {
        return value as i32;
    }
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Narrows a wider integer sample to i16 by shifting rather than scaling, so
/// the top bits dominate the narrowed result.
fn narrow_to_i16(sample: i32, source_bits: u32) -> i16 {
    match source_bits.cmp(&16) {
        std::cmp::Ordering::Less => (sample << (16 - source_bits)) as i16,
        std::cmp::Ordering::Equal => sample as i16,
        std::cmp::Ordering::Greater => {
            let shifted = sample >> (source_bits - 16);
            shifted.clamp(i16::MIN as i32, i16::MAX as i32) as i16
        }
    }
}

fn float_to_i16(sample: f64) -> i16 {
    let scaled = sample * 32767.0;
    scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

impl AudioDecoder for PcmDecoder {
    fn codec_name(&self) -> &'static str {
        match self.setup.encoding {
            SampleEncoding::IntLittleEndian
            | SampleEncoding::IntBigEndian
            | SampleEncoding::FloatLittleEndian
            | SampleEncoding::FloatBigEndian => "pcm",
            SampleEncoding::ALaw => "alaw",
            SampleEncoding::MuLaw => "mulaw",
        }
    }

    fn decode(&mut self, chunk: &MediaChunk) -> Result<AudioFrame> {
        let bytes = chunk.data.as_slice();
        let bytes_per_sample = ((self.setup.bits_per_sample as usize) + 7) / 8;
        if bytes_per_sample == 0 || bytes.len() % bytes_per_sample != 0 {
            return Err(Error::BadFormat("pcm chunk is not a whole number of samples"));
        }
        let mut samples = Vec::with_capacity(bytes.len() / bytes_per_sample);
        match self.setup.encoding {
            SampleEncoding::IntLittleEndian | SampleEncoding::IntBigEndian => {
                let big_endian = self.setup.encoding == SampleEncoding::IntBigEndian;
                for frame in bytes.chunks_exact(bytes_per_sample) {
                    let raw = self.decode_int_sample(frame, big_endian);
                    samples.push(narrow_to_i16(raw, (bytes_per_sample * 8) as u32));
                }
            }
            SampleEncoding::FloatLittleEndian | SampleEncoding::FloatBigEndian => {
                let big_endian = self.setup.encoding == SampleEncoding::FloatBigEndian;
                match self.setup.bits_per_sample {
                    32 => {
                        for frame in bytes.chunks_exact(4) {
                            let mut arr = [0u8; 4];
                            arr.copy_from_slice(frame);
                            let value =
                                if big_endian { f32::from_be_bytes(arr) } else { f32::from_le_bytes(arr) };
                            samples.push(float_to_i16(value as f64));
                        }
                    }
                    64 => {
                        for frame in bytes.chunks_exact(8) {
                            let mut arr = [0u8; 8];
                            arr.copy_from_slice(frame);
                            let value =
                                if big_endian { f64::from_be_bytes(arr) } else { f64::from_le_bytes(arr) };
                            samples.push(float_to_i16(value));
                        }
                    }
                    _ => return Err(Error::Unsupported("unsupported floating-point sample width")),
                }
            }
            SampleEncoding::ALaw => {
                for &b in bytes {
                    samples.push(ALAW_TABLE[b as usize]);
                }
            }
            SampleEncoding::MuLaw => {
                for &b in bytes {
                    samples.push(MULAW_TABLE[b as usize]);
                }
            }
        }
        Ok(AudioFrame {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
            timestamp: chunk.timestamp,
        })
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use waveframe_core::io::buffer_pool::BufferPool;

    fn make_chunk(bytes: Vec<u8>) -> MediaChunk {
        let pool = BufferPool::new(1024 * 1024);
        let mut buf = pool.acquire(bytes.len(), "test");
        buf.as_mut_vec().extend_from_slice(&bytes);
        MediaChunk { stream_id: 0, data: buf, timestamp: 0, file_offset: 0, keyframe: true }
    }

    fn stream_info(setup: PcmSetup) -> StreamInfo {
        StreamInfo {
            stream_id: 0,
            codec_name: "pcm",
            sample_rate: 44100,
            channels: 1,
            bits_per_sample: setup.bits_per_sample,
            duration_samples: 0,
            duration_ms: 0,
            bitrate_bps: 0,
            codec_setup: Some(setup.encode()),
        }
    }

    #[test]
    fn decodes_16_bit_little_endian_passthrough() {
        let setup = PcmSetup { encoding: SampleEncoding::IntLittleEndian, bits_per_sample: 16 };
        let info = stream_info(setup);
        let mut decoder = PcmDecoder::new(&DecoderOptions::default(), &info);
        let chunk = make_chunk(vec![0x00, 0x01, 0xFF, 0x7F]); // 256, 32767
        let frame = decoder.decode(&chunk).unwrap();
        assert_eq!(frame.samples, vec![256, 32767]);
    }

    #[test]
    fn decodes_alaw_silence_byte() {
        let setup = PcmSetup { encoding: SampleEncoding::ALaw, bits_per_sample: 8 };
        let info = stream_info(setup);
        let mut decoder = PcmDecoder::new(&DecoderOptions::default(), &info);
        let chunk = make_chunk(vec![0x55]);
        let frame = decoder.decode(&chunk).unwrap();
        assert_eq!(frame.samples, vec![-8]);
    }

    #[test]
    fn narrows_24_bit_to_16_bit_by_shifting() {
        let setup = PcmSetup { encoding: SampleEncoding::IntLittleEndian, bits_per_sample: 24 };
        let info = stream_info(setup);
        let mut decoder = PcmDecoder::new(&DecoderOptions::default(), &info);
        // 0x7FFFFF little-endian: max positive 24-bit value.
        let chunk = make_chunk(vec![0xFF, 0xFF, 0x7F]);
        let frame = decoder.decode(&chunk).unwrap();
        assert_eq!(frame.samples, vec![32767]);
    }
}
