// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-serial-number logical bitstream state: codec identity, header-packet
//! accumulation, and the running granule position used for timestamping.

use std::collections::VecDeque;

use crate::mappings::OggCodec;

pub struct LogicalStream {
    pub serial: u32,
    pub codec: Option<OggCodec>,
    pub headers_seen: usize,
    pub headers_needed: usize,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    pub pre_skip: u16,
    pub total_samples: u64,
    /// Packets waiting to be handed to the consumer as `MediaChunk`s, each
    /// paired with the granule position of the page it completed in.
    pub pending_packets: VecDeque<(Vec<u8>, i64)>,
    /// Bytes of a packet spanning multiple pages, not yet complete.
    pub partial_packet: Vec<u8>,
    pub headers_complete: bool,
    pub eos: bool,
}

impl LogicalStream {
    pub fn new(serial: u32) -> Self {
        LogicalStream {
            serial,
            codec: None,
            headers_seen: 0,
            headers_needed: usize::MAX,
            sample_rate: 0,
            channels: 0,
            bits_per_sample: 0,
            pre_skip: 0,
            total_samples: 0,
            pending_packets: VecDeque::new(),
            partial_packet: Vec::new(),
            headers_complete: false,
            eos: false,
        }
    }
}
