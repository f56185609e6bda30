// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `DecodedStream` facade: a demuxer and a decoder wired to a streaming
//! manager, presenting one `read_pcm`/`seek_to_ms` surface regardless of
//! container or codec.

use std::collections::{BTreeMap, VecDeque};

use waveframe_core::codecs::AudioDecoder;
use waveframe_core::error::{Error, Result};
use waveframe_core::formats::{Demuxer, Hint, StreamInfo};
use waveframe_core::io::byte_source::{ByteSource, HttpRangeSource, LocalFile};
use waveframe_core::log_channel::{log_msg, Channel, Level};
use waveframe_core::streaming::StreamingManager;

use crate::runtime::Runtime;

/// Strips a `scheme://` prefix, returning the scheme name and the remainder.
fn split_scheme(uri: &str) -> (Option<&str>, &str) {
    match uri.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, uri),
    }
}

fn open_source(uri: &str) -> Result<Box<dyn ByteSource>> {
    let (scheme, rest) = split_scheme(uri);
    match scheme {
        None | Some("file") => Ok(Box::new(LocalFile::open(std::path::Path::new(rest))?)),
        Some("http") | Some("https") => Ok(Box::new(HttpRangeSource::open(uri)?)),
        Some(other) => Err(Error::InvalidMedia(Box::leak(
            format!("unsupported URI scheme '{other}'").into_boxed_str(),
        ))),
    }
}

fn open_demuxer(
    format_id: &str,
    source: Box<dyn ByteSource>,
    pool: &std::sync::Arc<waveframe_core::io::buffer_pool::BufferPool>,
    format_options: waveframe_core::formats::FormatOptions,
) -> Result<Box<dyn Demuxer>> {
    match format_id {
        "riff" => Ok(Box::new(waveframe_format_riff::RiffDemuxer::open(source, pool.clone())?)),
        "aiff" => Ok(Box::new(waveframe_format_riff::AiffDemuxer::open(source, pool.clone())?)),
        "ogg" => Ok(Box::new(waveframe_format_ogg::OggDemuxer::open_with_options(
            source,
            pool.clone(),
            format_options,
        )?)),
        "flac" => Ok(Box::new(waveframe_codec_flac::FlacDemuxer::open(source, pool.clone())?)),
        "isomp4" => Ok(Box::new(waveframe_format_isomp4::open(source, pool.clone())?)),
        "mp3" => Err(Error::Unsupported("mp3 demuxing is recognized but not implemented")),
        other => Err(Error::InvalidMedia(Box::leak(
            format!("no demuxer registered for format '{other}'").into_boxed_str(),
        ))),
    }
}

pub(crate) fn open_with_runtime(runtime: &Runtime, uri: &str) -> Result<DecodedStream> {
    let mut source = open_source(uri)?;
    let hint = Hint { path: Some(uri.to_string()), mime_type: None };
    let format_id = runtime
        .demuxers
        .probe(&mut *source, Some(&hint))
        .ok_or(Error::InvalidMedia("no demuxer recognizes this stream"))?;

    let mut demuxer = open_demuxer(format_id, source, &runtime.pool, runtime.format_options)?;

    let stream_info = demuxer
        .streams()
        .first()
        .cloned()
        .ok_or(Error::InvalidMedia("demuxer exposes no audio streams"))?;
    let metadata = demuxer.metadata().clone();
    let stream_id = stream_info.stream_id;

    let decoder = runtime
        .codecs
        .make_decoder(stream_info.codec_name, &runtime.decoder_options, &stream_info)
        .ok_or(Error::Unsupported("no decoder registered for this codec"))?;

    let mut manager =
        StreamingManager::with_options(runtime.pool.clone(), stream_id, runtime.streaming_options);
    manager.start(demuxer);

    Ok(DecodedStream {
        manager,
        decoder,
        stream_info,
        metadata,
        sample_queue: VecDeque::new(),
        position_samples: 0,
        eof: false,
    })
}

/// A demuxer + decoder pair driven through a streaming manager, presenting
/// interleaved i16 PCM to the consumer. Internally queues decoded samples
/// between decoder output and `read_pcm` calls, refilling from the
/// streaming manager's chunk queue as needed.
pub struct DecodedStream {
    manager: StreamingManager,
    decoder: Box<dyn AudioDecoder>,
    stream_info: StreamInfo,
    metadata: BTreeMap<String, String>,
    sample_queue: VecDeque<i16>,
    position_samples: u64,
    eof: bool,
}

impl std::fmt::Debug for DecodedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedStream")
            .field("stream_info", &self.stream_info)
            .field("metadata", &self.metadata)
            .field("position_samples", &self.position_samples)
            .field("eof", &self.eof)
            .finish()
    }
}

impl DecodedStream {
    /// Fills `buf` with up to `buf.len()` interleaved i16 samples, returning
    /// the number actually written. Returns 0 at end of stream.
    pub fn read_pcm(&mut self, buf: &mut [i16]) -> usize {
        let mut written = 0;
        while written < buf.len() {
            if let Some(sample) = self.sample_queue.pop_front() {
                buf[written] = sample;
                written += 1;
                continue;
            }
            if self.eof {
                break;
            }
            if !self.refill() {
                break;
            }
        }
        written
    }

    /// Pulls one chunk from the streaming manager and decodes it into the
    /// sample queue. Returns `false` once end of stream is reached.
    fn refill(&mut self) -> bool {
        let chunk = match self.manager.read_chunk() {
            Ok(chunk) => chunk,
            Err(e) => {
                log_msg(Channel::Streaming, Level::Warn, &format!("read_chunk failed: {e}"));
                self.eof = true;
                return false;
            }
        };
        if chunk.is_eof() {
            self.eof = true;
            return false;
        }
        match self.decoder.decode(&chunk) {
            Ok(frame) => {
                self.position_samples = frame.timestamp;
                self.sample_queue.extend(frame.samples.iter().copied());
                true
            }
            Err(e) => {
                log_msg(Channel::Streaming, Level::Warn, &format!("decode failed: {e}"));
                self.eof = true;
                false
            }
        }
    }

    /// Flushes the manager's queue, requests a demuxer seek, and resets the
    /// decoder's lookahead state. Returns `false` if the producer thread is
    /// not running or the request could not be sent.
    pub fn seek_to_ms(&mut self, timestamp_ms: u64) -> bool {
        if !self.manager.seek_to(timestamp_ms) {
            return false;
        }
        self.sample_queue.clear();
        self.decoder.reset();
        self.eof = false;
        true
    }

    pub fn position_ms(&self) -> u64 {
        if self.stream_info.sample_rate == 0 {
            return 0;
        }
        self.position_samples * 1000 / self.stream_info.sample_rate as u64
    }

    pub fn length_ms(&self) -> u64 {
        self.stream_info.duration_ms
    }

    pub fn eof(&self) -> bool {
        self.eof && self.sample_queue.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.stream_info.sample_rate
    }

    pub fn channels(&self) -> u8 {
        self.stream_info.channels
    }

    pub fn codec_name(&self) -> &'static str {
        self.stream_info.codec_name
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

impl Drop for DecodedStream {
    fn drop(&mut self) {
        self.manager.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    #[test]
    fn split_scheme_separates_scheme_from_plain_paths() {
        assert_eq!(split_scheme("song.wav"), (None, "song.wav"));
        assert_eq!(split_scheme("file:///tmp/song.wav"), (Some("file"), "/tmp/song.wav"));
        assert_eq!(split_scheme("https://example.com/song.mp3"), (Some("https"), "example.com/song.mp3"));
    }

    fn build_wave(samples: &[i16]) -> Vec<u8> {
        let mut data = Vec::new();
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&1u16.to_le_bytes());
        fmt.extend_from_slice(&1u16.to_le_bytes());
        fmt.extend_from_slice(&44100u32.to_le_bytes());
        fmt.extend_from_slice(&88200u32.to_le_bytes());
        fmt.extend_from_slice(&2u16.to_le_bytes());
        fmt.extend_from_slice(&16u16.to_le_bytes());

        let mut body = Vec::new();
        body.extend_from_slice(b"WAVE");
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
        body.extend_from_slice(&fmt);
        body.extend_from_slice(b"data");
        body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        body.extend_from_slice(&data);

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn opens_a_local_wave_file_and_reads_interleaved_pcm() {
        let samples: Vec<i16> = (0..2048).map(|i| (i % 100) as i16).collect();
        let mut path = std::env::temp_dir();
        path.push("waveframe_facade_test.wav");
        std::fs::write(&path, build_wave(&samples)).unwrap();

        let runtime = Runtime::new();
        let mut stream = runtime.open(path.to_str().unwrap()).unwrap();
        assert_eq!(stream.sample_rate(), 44100);
        assert_eq!(stream.channels(), 1);
        assert_eq!(stream.codec_name(), "pcm");

        let mut out = vec![0i16; samples.len()];
        let mut total = 0;
        while total < out.len() {
            let n = stream.read_pcm(&mut out[total..]);
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, samples.len());
        assert_eq!(out, samples);

        let mut tail = [0i16; 4];
        assert_eq!(stream.read_pcm(&mut tail), 0);
        assert!(stream.eof());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn rejects_an_unrecognized_uri_scheme() {
        let runtime = Runtime::new();
        let err = runtime.open("ftp://example.com/song.wav").unwrap_err();
        assert!(matches!(err, Error::InvalidMedia(_)));
    }
}
