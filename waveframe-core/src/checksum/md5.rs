// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MD5, used to verify STREAMINFO's stored signature against decoded FLAC
//! PCM (RFC 9639 §8.2, "MD5 signature of unencoded audio data").

use super::Monitor;

const S: [u32; 64] = [
    7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22,
    5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20,
    4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23,
    6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21,
];

const K: [u32; 64] = [
    0xd76aa478, 0xe8c7b756, 0x242070db, 0xc1bdceee, 0xf57c0faf, 0x4787c62a, 0xa8304613, 0xfd469501,
    0x698098d8, 0x8b44f7af, 0xffff5bb1, 0x895cd7be, 0x6b901122, 0xfd987193, 0xa679438e, 0x49b40821,
    0xf61e2562, 0xc040b340, 0x265e5a51, 0xe9b6c7aa, 0xd62f105d, 0x02441453, 0xd8a1e681, 0xe7d3fbc8,
    0x21e1cde6, 0xc33707d6, 0xf4d50d87, 0x455a14ed, 0xa9e3e905, 0xfcefa3f8, 0x676f02d9, 0x8d2a4c8a,
    0xfffa3942, 0x8771f681, 0x6d9d6122, 0xfde5380c, 0xa4beea44, 0x4bdecfa9, 0xf6bb4b60, 0xbebfbc70,
    0x289b7ec6, 0xeaa127fa, 0xd4ef3085, 0x04881d05, 0xd9d4d039, 0xe6db99e5, 0x1fa27cf8, 0xc4ac5665,
    0xf4292244, 0x432aff97, 0xab9423a7, 0xfc93a039, 0x655b59c3, 0x8f0ccc92, 0xffeff47d, 0x85845dd1,
    0x6fa87e4f, 0xfe2ce6e0, 0xa3014314, 0x4e0811a1, 0xf7537e82, 0xbd3af235, 0x2ad7d2bb, 0xeb86d391,
];

/// Streaming MD5, fed one buffer at a time and finalized once.
pub struct Md5 {
    state: [u32; 4],
    buffer: Vec<u8>,
    total_len: u64,
}

impl Md5 {
    pub fn new() -> Self {
        Md5 {
            state: [0x67452301, 0xefcdab89, 0x98badcfe, 0x10325476],
            buffer: Vec::with_capacity(64),
            total_len: 0,
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.total_len += bytes.len() as u64;
        self.buffer.extend_from_slice(bytes);
        let mut start = 0;
        while self.buffer.len() - start >= 64 {
            let mut block = [0u8; 64];
            block.copy_from_slice(&self.buffer[start..start + 64]);
            self.transform(&block);
            start += 64;
        }
        self.buffer.drain(0..start);
    }

    fn transform(&mut self, block: &[u8; 64]) {
        let mut m = [0u32; 16];
        for i in 0..16 {
            m[i] = u32::from_le_bytes([
                block[i * 4],
                block[i * 4 + 1],
                block[i * 4 + 2],
                block[i * 4 + 3],
            ]);
        }

        let (mut a, mut b, mut c, mut d) = (self.state[0], self.state[1], self.state[2], self.state[3]);

        for i in 0..64 {
            let (f, g) = match i {
                0..=15 => ((b & c) | (!b & d), i),
                16..=31 => ((d & b) | (!d & c), (5 * i + 1) % 16),
                32..=47 => (b ^ c ^ d, (3 * i + 5) % 16),
                _ => (c ^ (b | !d), (7 * i) % 16),
            };
            let f = f
                .wrapping_add(a)
                .wrapping_add(K[i])
                .wrapping_add(m[g]);
            a = d;
            d = c;
            c = b;
            b = b.wrapping_add(f.rotate_left(S[i]));
        }

        self.state[0] = self.state[0].wrapping_add(a);
        self.state[1] = self.state[1].wrapping_add(b);
        self.state[2] = self.state[2].wrapping_add(c);
        self.state[3] = self.state[3].wrapping_add(d);
    }

    /// Consumes the accumulator and produces the 16-byte digest.
    pub fn finalize(mut self) -> [u8; 16] {
        let bit_len = self.total_len * 8;
        let mut pad = vec![0x80u8];
        let pending = (self.buffer.len() + 1) % 64;
        let zeros_needed = if pending <= 56 { 56 - pending } else { 120 - pending };
        pad.extend(std::iter::repeat(0u8).take(zeros_needed));
        pad.extend_from_slice(&bit_len.to_le_bytes());
        self.update_raw(&pad);

        let mut out = [0u8; 16];
        for (i, word) in self.state.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Like `update`, but bypasses `total_len` accounting — used only for
    /// feeding the padding block during finalize.
    fn update_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        let mut start = 0;
        while self.buffer.len() - start >= 64 {
            let mut block = [0u8; 64];
            block.copy_from_slice(&self.buffer[start..start + 64]);
            self.transform(&block);
            start += 64;
        }
        self.buffer.drain(0..start);
    }
}

impl Default for Md5 {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor for Md5 {
    fn process_byte(&mut self, byte: u8) {
        self.update(&[byte]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn empty_input() {
        let md5 = Md5::new();
        assert_eq!(hex(&md5.finalize()), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn known_vector_abc() {
        let mut md5 = Md5::new();
        md5.update(b"abc");
        assert_eq!(hex(&md5.finalize()), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn incremental_update_matches_single_shot() {
        let mut incremental = Md5::new();
        incremental.update(b"hello, ");
        incremental.update(b"waveframe");
        let mut single = Md5::new();
        single.update(b"hello, waveframe");
        assert_eq!(incremental.finalize(), single.finalize());
    }
}
