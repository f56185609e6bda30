// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `Demuxer` trait and the registry that selects one by content probe or
//! extension fallback.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::io::byte_source::ByteSource;
use crate::packet::MediaChunk;

/// Descriptor of one logical stream extracted by a demuxer. This core only
/// ever surfaces `audio` streams, but the field is kept explicit so callers
/// never have to guess.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub stream_id: u32,
    pub codec_name: &'static str,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    /// 0 when unknown.
    pub duration_samples: u64,
    /// 0 when unknown. Invariant: when both this and `sample_rate` are
    /// nonzero, `duration_ms == duration_samples * 1000 / sample_rate`.
    pub duration_ms: u64,
    /// 0 when unknown.
    pub bitrate_bps: u32,
    /// Codec-specific setup blob (e.g. FLAC STREAMINFO, AAC `esds`).
    pub codec_setup: Option<Vec<u8>>,
}

impl StreamInfo {
    pub fn recompute_duration_ms(&mut self) {
        if self.sample_rate != 0 && self.duration_samples != 0 {
            self.duration_ms = self.duration_samples * 1000 / self.sample_rate as u64;
        }
    }
}

/// A hint for format probing when content sniffing alone is insufficient —
/// typically a filename extension carried alongside a non-seekable source.
#[derive(Debug, Clone, Default)]
pub struct Hint {
    pub path: Option<String>,
    pub mime_type: Option<String>,
}

impl Hint {
    pub fn extension(&self) -> Option<&str> {
        self.path.as_deref().and_then(|p| p.rsplit('.').next())
    }
}

/// A container demuxer: owns a `ByteSource` and produces timestamped,
/// encoded `MediaChunk`s for its one or more logical streams.
pub trait Demuxer: Send {
    fn format_id(&self) -> &'static str;

    fn streams(&self) -> &[StreamInfo];

    /// Metadata key/value pairs discovered in comment headers.
    fn metadata(&self) -> &BTreeMap<String, String>;

    /// Reads the next chunk for `stream_id`. Returns an EOF chunk
    /// (`data.len() == 0`) rather than an error at end of stream.
    fn next_chunk(&mut self, stream_id: u32) -> Result<MediaChunk>;

    /// Seeks to the nearest position at or before `timestamp_ms` and returns
    /// the samples-domain timestamp actually landed on.
    fn seek(&mut self, stream_id: u32, timestamp_ms: u64) -> Result<u64>;
}

/// One entry in the demuxer registry's signature table.
struct Signature {
    format_id: &'static str,
    magic: &'static [u8],
    offset: usize,
    priority: i32,
}

/// Probes a byte source's leading bytes against the built-in signature
/// table, falling back to extension matching via `hint` when content
/// probing is inconclusive.
pub struct DemuxerRegistry {
    signatures: Vec<Signature>,
    extensions: BTreeMap<&'static str, &'static str>,
}

const PROBE_WINDOW: usize = 128;

impl DemuxerRegistry {
    pub fn with_builtins() -> Self {
        let signatures = vec![
            Signature { format_id: "riff", magic: b"RIFF", offset: 0, priority: 100 },
            Signature { format_id: "aiff", magic: b"FORM", offset: 0, priority: 100 },
            Signature { format_id: "ogg", magic: b"OggS", offset: 0, priority: 100 },
            Signature { format_id: "flac", magic: b"fLaC", offset: 0, priority: 100 },
            Signature { format_id: "isomp4", magic: b"ftyp", offset: 4, priority: 90 },
            Signature { format_id: "mp3", magic: b"ID3", offset: 0, priority: 50 },
            Signature { format_id: "mp3", magic: &[0xFF, 0xFB], offset: 0, priority: 40 },
        ];
        let extensions = BTreeMap::from([
            ("wav", "riff"),
            ("wave", "riff"),
            ("aif", "aiff"),
            ("aiff", "aiff"),
            ("ogg", "ogg"),
            ("oga", "ogg"),
            ("flac", "flac"),
            ("m4a", "isomp4"),
            ("mp4", "isomp4"),
            ("mp3", "mp3"),
        ]);
        DemuxerRegistry { signatures, extensions }
    }

    /// Probes `source` for its best-matching format id. On a content-probe
    /// miss, falls back to `hint`'s extension if present.
    pub fn probe(&self, source: &mut dyn ByteSource, hint: Option<&Hint>) -> Option<&'static str> {
        let start = source.tell();
        let mut window = [0u8; PROBE_WINDOW];
        let mut filled = 0;
        while filled < window.len() {
            match source.read(&mut window[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(_) => break,
            }
        }
        let _ = source.seek(start as i64, crate::io::byte_source::Whence::Start);

        let mut best: Option<&Signature> = None;
        for sig in &self.signatures {
            let end = sig.offset + sig.magic.len();
            if end > filled {
                continue;
            }
            if &window[sig.offset..end] == sig.magic {
                if best.map(|b| sig.priority > b.priority).unwrap_or(true) {
                    best = Some(sig);
                }
            }
        }
        if let Some(sig) = best {
            return Some(sig.format_id);
        }
        hint.and_then(|h| h.extension())
            .and_then(|ext| self.extensions.get(ext.to_ascii_lowercase().as_str()))
            .copied()
    }
}

impl Default for DemuxerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Per-demuxer tuning. Kept minimal for now; demuxer crates extend it with
/// their own options structs where it matters (e.g. strict fragment-index
/// validation), mirroring the ambient `FormatOptions`/`DecoderOptions` split.
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    /// Enter fallback resync mode after this many consecutive corrupted
    /// structures, rather than propagating `BadFormat` immediately.
    pub max_consecutive_corruption: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions { max_consecutive_corruption: 16 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct CursorSource(Cursor<Vec<u8>>);

    impl ByteSource for CursorSource {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            use std::io::Read;
            Ok(self.0.read(buf).unwrap_or(0))
        }

        fn seek(
            &mut self,
            offset: i64,
            whence: crate::io::byte_source::Whence,
        ) -> Result<u64> {
            use crate::io::byte_source::Whence;
            use std::io::{Seek, SeekFrom};
            let sf = match whence {
                Whence::Start => SeekFrom::Start(offset as u64),
                Whence::Current => SeekFrom::Current(offset),
                Whence::End => SeekFrom::End(offset),
            };
            Ok(self.0.seek(sf).unwrap())
        }

        fn tell(&self) -> u64 {
            self.0.position()
        }

        fn size(&self) -> Option<u64> {
            Some(self.0.get_ref().len() as u64)
        }

        fn eof(&self) -> bool {
            self.0.position() >= self.0.get_ref().len() as u64
        }
    }

    #[test]
    fn probes_flac_signature() {
        let registry = DemuxerRegistry::with_builtins();
        let mut data = b"fLaC".to_vec();
        data.extend(std::iter::repeat(0u8).take(64));
        let mut src = CursorSource(Cursor::new(data));
        assert_eq!(registry.probe(&mut src, None), Some("flac"));
        assert_eq!(src.tell(), 0, "probe must restore original position");
    }

    #[test]
    fn falls_back_to_extension_when_no_signature_matches() {
        let registry = DemuxerRegistry::with_builtins();
        let mut src = CursorSource(Cursor::new(vec![0u8; 16]));
        let hint = Hint { path: Some("song.wav".into()), mime_type: None };
        assert_eq!(registry.probe(&mut src, Some(&hint)), Some("riff"));
    }
}
