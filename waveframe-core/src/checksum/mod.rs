// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Checksum algorithms used across the demuxers and decoders, plus the
//! `Monitor` trait that lets a byte source compute a running checksum over
//! bytes as they are read, without a second pass.

mod crc8;
mod crc16;
mod crc32;
mod md5;

pub use crc8::Crc8Ccitt;
pub use crc16::Crc16Ansi;
pub use crc32::Crc32NoReflect;
pub use md5::Md5;

/// Something that can observe a stream of bytes as they pass through a
/// reader, without owning the reader itself.
pub trait Monitor {
    fn process_byte(&mut self, byte: u8);

    fn process_buf_bytes(&mut self, buf: &[u8]) {
        for &b in buf {
            self.process_byte(b);
        }
    }
}
