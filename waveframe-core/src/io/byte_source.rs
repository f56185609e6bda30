// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte-source abstraction: the single point where the pipeline touches the
//! outside world, whether that is a local file or an HTTP range-capable
//! resource.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom as StdSeekFrom};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{Error, IoErrorKind, Result};
use crate::log_channel::{log_msg, Channel, Level};

/// Mirrors `std::io::SeekFrom` but is re-declared here so `ByteSource`
/// implementations outside this crate (an HTTP range source, a test double)
/// never need to depend on `std::io` seek semantics for non-file sources.
#[derive(Debug, Clone, Copy)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// A polymorphic, seekable byte source. A demuxer owns exactly one of these
/// for the lifetime of its open stream.
pub trait ByteSource: Send {
    /// Reads into `buf`, returning the number of bytes copied. Zero means
    /// end of stream; short reads are permitted otherwise.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Seeks to a new position, returning the resulting absolute offset.
    /// `Whence::End` fails with `NotSeekable` when `size()` is unknown.
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64>;

    fn tell(&self) -> u64;

    /// Total size in bytes, if known.
    fn size(&self) -> Option<u64>;

    fn eof(&self) -> bool;

    /// Reads exactly `buf.len()` bytes, or fails with `Truncated`.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(Error::Truncated("read_exact hit end of stream"));
            }
            filled += n;
        }
        Ok(())
    }
}

/// A `ByteSource` backed by a local, fully seekable `File`.
pub struct LocalFile {
    file: File,
    pos: u64,
    size: u64,
    eof: bool,
}

impl LocalFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::Io(IoErrorKind::NotFound),
            std::io::ErrorKind::PermissionDenied => Error::Io(IoErrorKind::PermissionDenied),
            _ => Error::Io(IoErrorKind::Other(e)),
        })?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);
        log_msg(Channel::Io, Level::Debug, &format!("opened local file, size={size}"));
        Ok(LocalFile { file, pos: 0, size, eof: false })
    }
}

impl ByteSource for LocalFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.file.read(buf).map_err(Error::from)?;
        self.pos += n as u64;
        self.eof = n == 0;
        Ok(n)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let std_whence = match whence {
            Whence::Start => StdSeekFrom::Start(offset.max(0) as u64),
            Whence::Current => StdSeekFrom::Current(offset),
            Whence::End => StdSeekFrom::End(offset),
        };
        let new_pos = self.file.seek(std_whence).map_err(Error::from)?;
        self.pos = new_pos;
        self.eof = false;
        Ok(new_pos)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn eof(&self) -> bool {
        self.eof
    }
}

/// A contiguous cached byte range, used by [`HttpRangeSource`] to avoid
/// re-issuing a request for bytes already fetched.
struct CachedRange {
    start: u64,
    data: Vec<u8>,
}

impl CachedRange {
    fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }

    fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.end()
    }
}

/// An HTTP-backed byte source using range requests, built on a blocking
/// client rather than an async runtime (the pipeline runs on plain OS
/// threads — see the concurrency model). A single connection is reused
/// across requests via the client's internal keep-alive pool; all request
/// issuance is serialized by `inner`'s mutex so concurrent demuxer reads
/// never race two in-flight ranges for the same source.
pub struct HttpRangeSource {
    inner: Mutex<HttpInner>,
}

struct HttpInner {
    url: String,
    pos: u64,
    size: Option<u64>,
    range_supported: bool,
    eof: bool,
    cache: Vec<CachedRange>,
}

const HTTP_READ_CHUNK: u64 = 64 * 1024;
const HTTP_TIMEOUT_SECS: u64 = 10;
const NETWORK_RETRIES: u32 = 3;
const NETWORK_RETRY_BACKOFF_MS: u64 = 100;

impl HttpRangeSource {
    #[cfg(feature = "http")]
    pub fn open(url: &str) -> Result<Self> {
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build();
        let head = agent.head(url).call();
        let (size, range_supported) = match head {
            Ok(resp) => {
                let size = resp
                    .header("Content-Length")
                    .and_then(|v| v.parse::<u64>().ok());
                let accepts_ranges = resp
                    .header("Accept-Ranges")
                    .map(|v| v.eq_ignore_ascii_case("bytes"))
                    .unwrap_or(false);
                (size, accepts_ranges)
            }
            Err(_) => (None, false),
        };
        log_msg(
            Channel::Http,
            Level::Debug,
            &format!("opened http source, size={size:?}, range_supported={range_supported}"),
        );
        Ok(HttpRangeSource {
            inner: Mutex::new(HttpInner {
                url: url.to_string(),
                pos: 0,
                size,
                range_supported,
                eof: false,
                cache: Vec::new(),
            }),
        })
    }

    #[cfg(feature = "http")]
    fn fetch_range(inner: &mut HttpInner, start: u64, len: u64) -> Result<()> {
        let end = start + len - 1;
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build();
        let mut last_err = None;
        for attempt in 0..=NETWORK_RETRIES {
            let req = if inner.range_supported {
                agent
                    .get(&inner.url)
                    .set("Range", &format!("bytes={start}-{end}"))
            } else {
                agent.get(&inner.url)
            };
            match req.call() {
                Ok(resp) => {
                    let mut data = Vec::new();
                    resp.into_reader()
                        .take(len)
                        .read_to_end(&mut data)
                        .map_err(Error::from)?;
                    inner.cache.push(CachedRange { start, data });
                    return Ok(());
                }
                Err(ureq::Error::Transport(t)) => {
                    last_err = Some(t);
                    log_msg(
                        Channel::Http,
                        Level::Warn,
                        &format!("transient network error on attempt {attempt}, retrying"),
                    );
                    std::thread::sleep(std::time::Duration::from_millis(
                        NETWORK_RETRY_BACKOFF_MS,
                    ));
                }
                Err(_) => return Err(Error::Io(IoErrorKind::NetworkFatal)),
            }
        }
        let _ = last_err;
        Err(Error::Io(IoErrorKind::NetworkTransient))
    }

    #[cfg(not(feature = "http"))]
    pub fn open(_url: &str) -> Result<Self> {
        Err(Error::Unsupported("http byte source built without the `http` feature"))
    }
}

impl ByteSource for HttpRangeSource {
    #[cfg(feature = "http")]
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock().expect("http source mutex poisoned");
        if let Some(size) = inner.size {
            if inner.pos >= size {
                inner.eof = true;
                return Ok(0);
            }
        }
        if !inner.cache.iter().any(|r| r.contains(inner.pos)) {
            let want = HTTP_READ_CHUNK.max(buf.len() as u64);
            let start = inner.pos;
            Self::fetch_range(&mut inner, start, want)?;
        }
        let pos = inner.pos;
        let range = inner
            .cache
            .iter()
            .find(|r| r.contains(pos))
            .expect("range was just fetched");
        let offset_in_range = (pos - range.start) as usize;
        let available = &range.data[offset_in_range..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        inner.pos += n as u64;
        Ok(n)
    }

    #[cfg(not(feature = "http"))]
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        unreachable!("HttpRangeSource cannot be constructed without the `http` feature")
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let mut inner = self.inner.lock().expect("http source mutex poisoned");
        let base = match whence {
            Whence::Start => 0i64,
            Whence::Current => inner.pos as i64,
            Whence::End => {
                let size = inner.size.ok_or(Error::Io(IoErrorKind::NotSeekable))?;
                size as i64
            }
        };
        let new_pos = base + offset;
        if new_pos < 0 {
            return Err(Error::Io(IoErrorKind::OutOfRange));
        }
        if !inner.range_supported && (new_pos as u64) < inner.pos {
            return Err(Error::Io(IoErrorKind::NotSeekable));
        }
        inner.pos = new_pos as u64;
        inner.eof = false;
        Ok(inner.pos)
    }

    fn tell(&self) -> u64 {
        self.inner.lock().expect("http source mutex poisoned").pos
    }

    fn size(&self) -> Option<u64> {
        self.inner.lock().expect("http source mutex poisoned").size
    }

    fn eof(&self) -> bool {
        self.inner.lock().expect("http source mutex poisoned").eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn local_file_reads_and_seeks() {
        let mut path = std::env::temp_dir();
        path.push("waveframe_local_file_test.bin");
        {
            let mut f = File::create(&path).unwrap();
            f.write_all(&[1, 2, 3, 4, 5]).unwrap();
        }
        let mut src = LocalFile::open(&path).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(src.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(src.tell(), 2);
        src.seek(0, Whence::Start).unwrap();
        assert_eq!(src.tell(), 0);
        assert_eq!(src.size(), Some(5));
        std::fs::remove_file(&path).ok();
    }
}
