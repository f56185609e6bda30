// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared structs, traits, and I/O primitives for the waveframe media
//! pipeline: byte sources, the bitstream reader, the buffer pool, the
//! streaming manager, demuxer/codec registries, the error taxonomy, and
//! leveled channel logging.

pub mod checksum;
pub mod codecs;
pub mod error;
pub mod formats;
pub mod io;
pub mod log_channel;
pub mod packet;
pub mod streaming;

pub use error::{Error, Result};
