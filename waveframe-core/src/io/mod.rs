// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! I/O primitives: byte sources, the bitstream reader, and the buffer pool.

pub mod bitstream;
pub mod buffer_pool;
pub mod byte_source;
