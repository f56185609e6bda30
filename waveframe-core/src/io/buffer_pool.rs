// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Size-class-binned buffer pool with pressure-adaptive reclaim.
//!
//! The pool is a single piece of owned state (see `Runtime` in the facade
//! crate) rather than a hidden global singleton, but its internal behavior —
//! bins, caps, and pressure bands — follows §4.2 exactly.

use std::sync::{Arc, Mutex};

use crate::log_channel::{log_msg, Channel, Level};

/// Human-friendly size classes the pool bins buffers into, ascending.
const SIZE_CLASSES: &[usize] = &[
    4 * 1024,
    8 * 1024,
    16 * 1024,
    32 * 1024,
    64 * 1024,
    128 * 1024,
    256 * 1024,
    512 * 1024,
];

/// Maximum number of free buffers retained per bin under low pressure.
const DEFAULT_BIN_CAP: usize = 16;

const DEFAULT_MAX_TOTAL_BYTES: usize = 16 * 1024 * 1024;

/// Construction-time pool sizing, mirroring `DecoderOptions`/`FormatOptions`:
/// a plain struct with a `Default` impl rather than constructor arguments.
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub max_total_bytes: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions { max_total_bytes: DEFAULT_MAX_TOTAL_BYTES }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureBand {
    Low,
    Medium,
    High,
    Critical,
}

impl PressureBand {
    fn from_level(level: u8) -> Self {
        match level {
            0..=29 => PressureBand::Low,
            30..=49 => PressureBand::Medium,
            50..=74 => PressureBand::High,
            _ => PressureBand::Critical,
        }
    }

    fn bin_cap(self) -> usize {
        match self {
            PressureBand::Low => DEFAULT_BIN_CAP,
            PressureBand::Medium => DEFAULT_BIN_CAP / 2,
            PressureBand::High | PressureBand::Critical => 0,
        }
    }
}

struct Bin {
    size: usize,
    free: Vec<Vec<u8>>,
}

struct PoolState {
    bins: Vec<Bin>,
    live_bytes: usize,
    max_total: usize,
    pressure_level: u8,
    band: PressureBand,
}

/// Process-scoped pool of reusable byte buffers, shared behind `Arc` so the
/// streaming manager, demuxers, and the decoded-stream facade can all
/// acquire/release against the same accounting without their own locks.
pub struct BufferPool {
    state: Mutex<PoolState>,
}

impl BufferPool {
    pub fn new(max_total_bytes: usize) -> Arc<Self> {
        let bins = SIZE_CLASSES
            .iter()
            .map(|&size| Bin { size, free: Vec::new() })
            .collect();
        Arc::new(BufferPool {
            state: Mutex::new(PoolState {
                bins,
                live_bytes: 0,
                max_total: max_total_bytes,
                pressure_level: 0,
                band: PressureBand::Low,
            }),
        })
    }

    pub fn with_options(options: PoolOptions) -> Arc<Self> {
        Self::new(options.max_total_bytes)
    }

    /// Sets the pressure level (0-100); logs when the band changes.
    pub fn set_pressure(&self, level: u8) {
        let level = level.min(100);
        let mut state = self.state.lock().expect("buffer pool mutex poisoned");
        let new_band = PressureBand::from_level(level);
        if new_band != state.band {
            log_msg(
                Channel::Memory,
                Level::Info,
                &format!("pressure band transition {:?} -> {:?} (level={level})", state.band, new_band),
            );
            state.band = new_band;
            if matches!(new_band, PressureBand::High | PressureBand::Critical) {
                let mut reclaimed = 0usize;
                for bin in state.bins.iter_mut() {
                    for buf in bin.free.drain(..) {
                        reclaimed += buf.capacity();
                    }
                }
                state.live_bytes = state.live_bytes.saturating_sub(reclaimed);
            }
        }
        state.pressure_level = level;
    }

    pub fn pressure_band(&self) -> PressureBand {
        self.state.lock().expect("buffer pool mutex poisoned").band
    }

    fn size_class_for(size: usize) -> Option<usize> {
        SIZE_CLASSES.iter().copied().find(|&c| c >= size)
    }

    /// Acquires a buffer with capacity at least `size`, bound to `self` so
    /// dropping the returned [`PooledBuffer`] returns its storage to a bin.
    /// Never blocks: requests above the largest bin, or bins empty at this
    /// pressure band, fall through to a fresh allocation. A fresh allocation
    /// that would push `live_bytes` over `max_total` first reclaims cached
    /// bin buffers rather than denying or blocking the caller.
    ///
    /// Takes `self` by an owned `Arc` (clone the pool handle at the call
    /// site) rather than `&Arc<Self>`, which is not a valid receiver type.
    pub fn acquire(self: Arc<Self>, size: usize, owner_tag: &'static str) -> PooledBuffer {
        let mut state = self.state.lock().expect("buffer pool mutex poisoned");
        let class = Self::size_class_for(size);
        let reused = match class {
            Some(class_size) => {
                let bin = state.bins.iter_mut().find(|b| b.size == class_size);
                bin.and_then(|b| b.free.pop())
            }
            None => None,
        };
        let buf = match reused {
            // Already counted in live_bytes while it sat in its bin.
            Some(buf) => buf,
            None => {
                let cap = class.unwrap_or(size);
                if state.live_bytes + cap > state.max_total {
                    log_msg(
                        Channel::Memory,
                        Level::Warn,
                        &format!(
                            "pool at {}/{} bytes, reclaiming cached buffers for a {cap}-byte allocation",
                            state.live_bytes, state.max_total
                        ),
                    );
                    let mut reclaimed = 0usize;
                    for bin in state.bins.iter_mut() {
                        for freed in bin.free.drain(..) {
                            reclaimed += freed.capacity();
                        }
                    }
                    state.live_bytes = state.live_bytes.saturating_sub(reclaimed);
                }
                state.live_bytes += cap;
                Vec::with_capacity(cap)
            }
        };
        drop(state);
        log_msg(Channel::Memory, Level::Trace, &format!("acquire {size} bytes for {owner_tag}"));
        PooledBuffer { data: buf, owner_tag, pool: self }
    }

    fn release_raw(&self, mut buf: Vec<u8>) {
        let mut state = self.state.lock().expect("buffer pool mutex poisoned");
        let cap = buf.capacity();
        state.live_bytes = state.live_bytes.saturating_sub(cap);
        let class = Self::size_class_for(cap).filter(|&c| c == cap);
        let bin_cap = state.band.bin_cap();
        if let Some(class_size) = class {
            let mut pushed = false;
            if let Some(bin) = state.bins.iter_mut().find(|b| b.size == class_size) {
                if bin.free.len() < bin_cap {
                    buf.clear();
                    bin.free.push(buf);
                    pushed = true;
                }
            }
            if pushed {
                state.live_bytes += cap;
            }
        }
    }

    pub fn live_bytes(&self) -> usize {
        self.state.lock().expect("buffer pool mutex poisoned").live_bytes
    }

    pub fn max_total(&self) -> usize {
        self.state.lock().expect("buffer pool mutex poisoned").max_total
    }
}

/// A buffer on loan from a [`BufferPool`]. Always bound to the pool it came
/// from; returns its storage to a bin on drop.
pub struct PooledBuffer {
    data: Vec<u8>,
    owner_tag: &'static str,
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub fn owner_tag(&self) -> &'static str {
        self.owner_tag
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.release_raw(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_rounds_up_to_size_class() {
        let pool = BufferPool::new(16 * 1024 * 1024);
        let buf = pool.clone().acquire(1000, "test");
        assert!(buf.data.capacity() >= 4096);
    }

    #[test]
    fn release_returns_to_bin_and_reacquire_reuses() {
        let pool = BufferPool::new(16 * 1024 * 1024);
        let buf = pool.clone().acquire(4096, "test");
        drop(buf);
        let live_after_release = pool.live_bytes();
        assert!(live_after_release > 0, "buffer should still be accounted for while pooled");
        let buf2 = pool.clone().acquire(4096, "test");
        assert!(buf2.data.capacity() >= 4096);
        assert_eq!(pool.live_bytes(), live_after_release, "reusing a cached buffer must not double-count it");
    }

    #[test]
    fn critical_pressure_drops_all_bins() {
        let pool = BufferPool::new(16 * 1024 * 1024);
        let buf = pool.clone().acquire(4096, "test");
        drop(buf);
        assert!(pool.live_bytes() > 0);
        pool.set_pressure(90);
        assert_eq!(pool.live_bytes(), 0);
    }

    #[test]
    fn pool_conservation_after_quiescence() {
        let pool = BufferPool::new(16 * 1024 * 1024);
        let a = pool.clone().acquire(4096, "a");
        let b = pool.clone().acquire(8192, "b");
        drop(a);
        drop(b);
        pool.set_pressure(90);
        assert_eq!(pool.live_bytes(), 0);
    }

    #[test]
    fn acquire_over_cap_reclaims_cached_bins_instead_of_exceeding_it() {
        let pool = BufferPool::new(8192);
        let a = pool.clone().acquire(4096, "a");
        drop(a);
        assert_eq!(pool.live_bytes(), 4096);
        // This allocation alone fits under the cap, but only after the
        // cached 4096-byte bin entry from `a` is reclaimed first.
        let b = pool.clone().acquire(8192, "b");
        assert_eq!(pool.live_bytes(), 8192);
        drop(b);
    }
}
