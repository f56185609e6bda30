// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `error` module defines the common error taxonomy shared by every
//! demuxer, decoder, and I/O backend in the pipeline.

use std::fmt;
use std::io;

/// Reasons a byte-source operation can fail.
#[derive(Debug)]
pub enum IoErrorKind {
    NotFound,
    PermissionDenied,
    NetworkTransient,
    NetworkFatal,
    OutOfRange,
    NotSeekable,
    Other(io::Error),
}

impl fmt::Display for IoErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoErrorKind::NotFound => write!(f, "not found"),
            IoErrorKind::PermissionDenied => write!(f, "permission denied"),
            IoErrorKind::NetworkTransient => write!(f, "transient network error"),
            IoErrorKind::NetworkFatal => write!(f, "fatal network error"),
            IoErrorKind::OutOfRange => write!(f, "requested range is out of bounds"),
            IoErrorKind::NotSeekable => write!(f, "source does not support seeking"),
            IoErrorKind::Other(e) => write!(f, "io error: {e}"),
        }
    }
}

/// `Error` enumerates every failure mode the pipeline can report, per the
/// error taxonomy: a file not openable or unrecognized is `InvalidMedia`; a
/// recognized-but-malformed stream is `BadFormat`; truncation at a frame
/// boundary degrades to end-of-stream at the call site, not here.
#[derive(Debug)]
pub enum Error {
    /// The source could not be opened, or no demuxer recognizes its format.
    InvalidMedia(&'static str),
    /// The stream was recognized but violates its own format specification.
    BadFormat(&'static str),
    /// End-of-file was reached in the middle of a structure.
    Truncated(&'static str),
    /// The underlying byte source failed.
    Io(IoErrorKind),
    /// A recognized but unimplemented feature was required.
    Unsupported(&'static str),
    /// A CRC mismatch or bad sync that was recovered from locally; callers
    /// that want hard failure should watch decoder/demuxer statistics
    /// instead of matching on this variant repeatedly.
    Corrupted(&'static str),
    /// An allocation could not be satisfied under critical memory pressure.
    ResourceExhausted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidMedia(msg) => write!(f, "invalid media: {msg}"),
            Error::BadFormat(msg) => write!(f, "bad format: {msg}"),
            Error::Truncated(msg) => write!(f, "truncated: {msg}"),
            Error::Io(kind) => write!(f, "io: {kind}"),
            Error::Unsupported(feature) => write!(f, "unsupported: {feature}"),
            Error::Corrupted(msg) => write!(f, "corrupted (recovered): {msg}"),
            Error::ResourceExhausted => write!(f, "resource exhausted"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(IoErrorKind::Other(e)) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::Io(IoErrorKind::NotFound),
            io::ErrorKind::PermissionDenied => Error::Io(IoErrorKind::PermissionDenied),
            io::ErrorKind::UnexpectedEof => Error::Truncated("unexpected end of file"),
            _ => Error::Io(IoErrorKind::Other(err)),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Convenience constructor for a decode error.
pub fn bad_format<T>(msg: &'static str) -> Result<T> {
    Err(Error::BadFormat(msg))
}

/// Convenience constructor for an unsupported-feature error.
pub fn unsupported<T>(feature: &'static str) -> Result<T> {
    Err(Error::Unsupported(feature))
}

/// Convenience constructor for an invalid-media error.
pub fn invalid_media<T>(msg: &'static str) -> Result<T> {
    Err(Error::InvalidMedia(msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_maps_eof_to_truncated() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(Error::from(io_err), Error::Truncated(_)));
    }
}
