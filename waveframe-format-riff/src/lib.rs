// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RIFF/WAVE and AIFF chunk demuxers.

mod aiff;
mod riff;

pub use aiff::{decode_extended_80, AiffDemuxer};
pub use riff::RiffDemuxer;
