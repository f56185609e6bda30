// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ISO Base Media File Format (MP4/M4A) demuxer: box tree, sample tables,
//! sample description, and fragmented-MP4 (`moof`/`mdat`) playback.

mod boxes;
mod fragmented;
mod sample_table;
mod stsd;
mod trak;

mod demuxer;

pub use demuxer::{open, Mp4Demuxer};
pub use fragmented::{SegmentIndex, SidxReference, TrackExtends, TrackFragmentHeader, TrackFragmentRun};
pub use sample_table::SampleTable;
pub use stsd::AudioSampleEntry;
pub use trak::Track;
