// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ISO-BMFF box-tree primitives: header parsing and a bounded sibling walk.
//!
//! Every box is `size:u32_be | type:u32_be_fourcc | [extended_size:u64_be if
//! size==1] | payload`. A `size` of zero means "extends to the end of the
//! enclosing container" and is only legal for the last box in that
//! container.

use waveframe_core::error::{Error, Result};
use waveframe_core::io::byte_source::{ByteSource, Whence};

/// Sanity ceiling well above any real audio-only MP4 box; guards against a
/// corrupt or adversarial size field driving an unbounded allocation.
pub const MAX_BOX_SIZE: u64 = 0x1_0000_0000;

#[derive(Debug, Clone, Copy)]
pub struct BoxHeader {
    pub box_type: [u8; 4],
    /// Absolute offset of this box's first header byte.
    pub start: u64,
    /// Total box length including the header, or `None` when the box
    /// extends to the end of its parent.
    pub total_len: Option<u64>,
}

impl BoxHeader {
    pub fn is_type(&self, fourcc: &[u8; 4]) -> bool {
        &self.box_type == fourcc
    }

    pub fn type_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.box_type)
    }
}

/// Reads one box header at the source's current position, returning the
/// header plus the number of bytes the header itself occupied.
pub fn read_box_header(source: &mut dyn ByteSource) -> Result<(BoxHeader, u64)> {
    let start = source.tell();
    let mut buf = [0u8; 8];
    source.read_exact(&mut buf)?;
    let small_size = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    let box_type: [u8; 4] = buf[4..8].try_into().unwrap();

    let (total_len, header_len) = if small_size == 1 {
        let mut ext = [0u8; 8];
        source.read_exact(&mut ext)?;
        (Some(u64::from_be_bytes(ext)), 16)
    } else if small_size == 0 {
        (None, 8)
    } else {
        (Some(small_size as u64), 8)
    };

    if let Some(len) = total_len {
        if len > MAX_BOX_SIZE {
            return Err(Error::BadFormat("isomp4 box size exceeds sanity ceiling"));
        }
        if len < header_len {
            return Err(Error::BadFormat("isomp4 box size smaller than its own header"));
        }
    }

    Ok((BoxHeader { box_type, start, total_len }, header_len))
}

/// Reads the 4-byte version/flags prefix common to "full boxes" (anything
/// with `stsd`-style version semantics).
pub fn read_full_box_header(source: &mut dyn ByteSource) -> Result<(u8, u32)> {
    let mut buf = [0u8; 4];
    source.read_exact(&mut buf)?;
    Ok((buf[0], u32::from_be_bytes([0, buf[1], buf[2], buf[3]])))
}

/// Payload length given a box's header and how many header bytes were
/// already consumed; `None` box extends to `container_end`.
pub fn data_len(header: &BoxHeader, header_len: u64, container_end: u64) -> Result<u64> {
    match header.total_len {
        Some(total) => Ok(total.saturating_sub(header_len)),
        None => Ok(container_end.saturating_sub(header.start + header_len)),
    }
}

/// Walks sibling boxes within `[source.tell(), end)`. `visit` receives the
/// header and the payload's byte length and is free to consume less than
/// that; any unconsumed remainder is skipped automatically before the next
/// sibling is read.
pub fn walk_boxes(
    source: &mut dyn ByteSource,
    end: u64,
    mut visit: impl FnMut(&mut dyn ByteSource, BoxHeader, u64) -> Result<()>,
) -> Result<()> {
    while source.tell() + 8 <= end {
        let (header, header_len) = read_box_header(source)?;
        let len = data_len(&header, header_len, end)?;
        let next = source.tell() + len;
        if next > end {
            return Err(Error::BadFormat("isomp4 child box extends past its container"));
        }
        visit(source, header, len)?;
        let actual = source.tell();
        if actual > next {
            return Err(Error::BadFormat("isomp4 child box read past its own bounds"));
        }
        if actual < next {
            source.seek((next - actual) as i64, Whence::Current)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct MemSource(Cursor<Vec<u8>>);

    impl ByteSource for MemSource {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            use std::io::Read;
            Ok(self.0.read(buf).unwrap_or(0))
        }

        fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
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
    fn reads_compact_box_header() {
        let mut bytes = 16u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"ftyp");
        bytes.extend_from_slice(&[0u8; 8]);
        let mut src = MemSource(Cursor::new(bytes));
        let (header, header_len) = read_box_header(&mut src).unwrap();
        assert_eq!(&header.box_type, b"ftyp");
        assert_eq!(header_len, 8);
        assert_eq!(header.total_len, Some(16));
    }

    #[test]
    fn reads_extended_64_bit_box_size() {
        let mut bytes = 1u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"mdat");
        bytes.extend_from_slice(&24u64.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        let mut src = MemSource(Cursor::new(bytes));
        let (header, header_len) = read_box_header(&mut src).unwrap();
        assert_eq!(header_len, 16);
        assert_eq!(header.total_len, Some(24));
    }

    #[test]
    fn walk_visits_all_siblings_and_skips_unread_payload() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&8u32.to_be_bytes());
        bytes.extend_from_slice(b"free");
        bytes.extend_from_slice(&12u32.to_be_bytes());
        bytes.extend_from_slice(b"ftyp");
        bytes.extend_from_slice(&[0u8; 4]);
        let end = bytes.len() as u64;
        let mut src = MemSource(Cursor::new(bytes));
        let mut seen = Vec::new();
        walk_boxes(&mut src, end, |_src, header, _len| {
            seen.push(header.box_type);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![*b"free", *b"ftyp"]);
    }
}
