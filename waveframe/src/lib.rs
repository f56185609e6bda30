// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Demuxer and codec registries wired together behind a single entry point:
//! construct a [`Runtime`], call [`Runtime::open`] with a `file://`/plain
//! path or `http(s)://` URI, and drive the returned [`DecodedStream`].

mod runtime;
mod stream;

pub use runtime::{Runtime, RuntimeOptions};
pub use stream::DecodedStream;

pub use waveframe_core::error::{Error, Result};

/// Convenience wrapper around `Runtime::new().open(uri)` for callers that
/// don't need to share a `Runtime` (and its buffer pool) across streams.
pub fn open(uri: &str) -> Result<DecodedStream> {
    Runtime::new().open(uri)
}
