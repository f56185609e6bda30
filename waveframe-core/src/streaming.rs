// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridges a demuxer to its consumer through a background producer thread
//! and a bounded chunk queue, per §4.3 and the concurrency model in §5.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::error::{Error, Result};
use crate::formats::Demuxer;
use crate::io::buffer_pool::BufferPool;
use crate::log_channel::{log_msg, Channel, Level};
use crate::packet::MediaChunk;

const DEFAULT_MAX_CHUNKS: usize = 32;
const DEFAULT_MAX_BYTES: usize = 1024 * 1024;
const MIN_CHUNKS: usize = 4;
const MIN_BYTES: usize = 64 * 1024;
const DISCARD_PRESSURE_THRESHOLD: u8 = 85;

#[derive(Clone, Copy)]
struct QueueLimits {
    max_chunks: usize,
    max_bytes: usize,
}

impl Default for QueueLimits {
    fn default() -> Self {
        QueueLimits { max_chunks: DEFAULT_MAX_CHUNKS, max_bytes: DEFAULT_MAX_BYTES }
    }
}

/// Construction-time queue sizing for a [`StreamingManager`], mirroring
/// `DecoderOptions`/`FormatOptions`: a plain struct with a `Default` impl.
#[derive(Debug, Clone, Copy)]
pub struct StreamingOptions {
    pub max_chunks: usize,
    pub max_bytes: usize,
}

impl Default for StreamingOptions {
    fn default() -> Self {
        StreamingOptions { max_chunks: DEFAULT_MAX_CHUNKS, max_bytes: DEFAULT_MAX_BYTES }
    }
}

impl From<StreamingOptions> for QueueLimits {
    fn from(options: StreamingOptions) -> Self {
        QueueLimits { max_chunks: options.max_chunks, max_bytes: options.max_bytes }
    }
}

struct Shared {
    queue: Mutex<VecDeque<MediaChunk>>,
    not_full: Condvar,
    not_empty: Condvar,
    limits: Mutex<QueueLimits>,
    stop_flag: AtomicBool,
    producer_eof: AtomicBool,
    /// Monotonically incremented on every `flush`. The producer captures it
    /// before decoding a chunk and re-checks it before enqueueing: a mismatch
    /// means a seek landed mid-decode, so the chunk is dropped instead of
    /// being handed to the consumer as if it came from the new position.
    generation: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn queued_bytes(queue: &VecDeque<MediaChunk>) -> usize {
        queue.iter().map(|c| c.data.len()).sum()
    }
}

/// Runs one background producer thread per active stream, pulling
/// `MediaChunk`s from a demuxer into a bounded queue that the consumer
/// drains at its own pace.
pub struct StreamingManager {
    shared: Arc<Shared>,
    stream_id: u32,
    handle: Option<JoinHandle<()>>,
    pool: Arc<BufferPool>,
    cmd_tx: Option<std::sync::mpsc::Sender<Command>>,
}

/// Commands sent from the manager to the producer loop to request a seek
/// without tearing down the thread.
enum Command {
    Seek(u64),
}

impl StreamingManager {
    pub fn new(pool: Arc<BufferPool>, stream_id: u32) -> Self {
        StreamingManager {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                not_full: Condvar::new(),
                not_empty: Condvar::new(),
                limits: Mutex::new(QueueLimits::default()),
                stop_flag: AtomicBool::new(false),
                producer_eof: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                last_error: Mutex::new(None),
            }),
            stream_id,
            handle: None,
            pool,
            cmd_tx: None,
        }
    }

    pub fn with_options(pool: Arc<BufferPool>, stream_id: u32, options: StreamingOptions) -> Self {
        let manager = Self::new(pool, stream_id);
        *manager.shared.limits.lock().expect("limits mutex poisoned") = options.into();
        manager
    }

    /// Spawns the producer thread if not already running. Idempotent.
    pub fn start(&mut self, mut demuxer: Box<dyn Demuxer>) {
        if self.handle.is_some() {
            return;
        }
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel();
        self.cmd_tx = Some(cmd_tx);
        let shared = self.shared.clone();
        let stream_id = self.stream_id;
        let handle = std::thread::spawn(move || {
            producer_loop(demuxer.as_mut(), stream_id, shared, cmd_rx);
        });
        self.handle = Some(handle);
        log_msg(Channel::Streaming, Level::Debug, "producer started");
    }

    /// Clears the queue, requests the producer seek the demuxer, and resets
    /// EOF state. Returns `false` if the producer thread is not running.
    pub fn seek_to(&self, timestamp_ms: u64) -> bool {
        let Some(tx) = &self.cmd_tx else { return false };
        self.flush();
        tx.send(Command::Seek(timestamp_ms)).is_ok()
    }

    /// Signals the producer to exit and joins it.
    pub fn stop(&mut self) {
        self.shared.stop_flag.store(true, Ordering::SeqCst);
        self.shared.not_full.notify_all();
        self.shared.not_empty.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.cmd_tx = None;
        log_msg(Channel::Streaming, Level::Debug, "producer stopped");
    }

    /// Blocking pop; returns an EOF chunk when the producer has finished and
    /// the queue has drained.
    pub fn read_chunk(&self) -> Result<MediaChunk> {
        if let Some(err) = self.shared.last_error.lock().expect("queue mutex poisoned").take() {
            return Err(Error::BadFormat(Box::leak(err.into_boxed_str())));
        }
        let mut queue = self.shared.queue.lock().expect("queue mutex poisoned");
        loop {
            if let Some(chunk) = queue.pop_front() {
                self.shared.not_full.notify_one();
                return Ok(chunk);
            }
            if self.shared.producer_eof.load(Ordering::SeqCst) {
                return Ok(self.empty_chunk());
            }
            queue = self.shared.not_empty.wait(queue).expect("queue mutex poisoned");
        }
    }

    fn empty_chunk(&self) -> MediaChunk {
        MediaChunk {
            stream_id: self.stream_id,
            data: self.pool.clone().acquire(0, "streaming_eof"),
            timestamp: 0,
            file_offset: 0,
            keyframe: true,
        }
    }

    /// Clears the queue and bumps the generation counter so the producer's
    /// in-flight read (if any) is discarded rather than enqueued stale.
    pub fn flush(&self) {
        let mut queue = self.shared.queue.lock().expect("queue mutex poisoned");
        queue.clear();
        self.shared.producer_eof.store(false, Ordering::SeqCst);
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.not_full.notify_all();
    }

    pub fn set_buffer_limits(&self, max_chunks: usize, max_bytes: usize) {
        let mut limits = self.shared.limits.lock().expect("limits mutex poisoned");
        limits.max_chunks = max_chunks;
        limits.max_bytes = max_bytes;
    }

    /// Adapts queue limits to a 0-100 pressure level: linear scale down to a
    /// floor of `(MIN_CHUNKS, MIN_BYTES)`. At or above the discard
    /// threshold, proactively drops the oldest half of queued chunks.
    pub fn apply_pressure(&self, level: u8) {
        let level = level.min(100);
        let scale = 1.0 - (level as f64 / 100.0) * 0.9;
        let mut limits = self.shared.limits.lock().expect("limits mutex poisoned");
        limits.max_chunks = ((DEFAULT_MAX_CHUNKS as f64 * scale) as usize).max(MIN_CHUNKS);
        limits.max_bytes = ((DEFAULT_MAX_BYTES as f64 * scale) as usize).max(MIN_BYTES);
        drop(limits);

        if level >= DISCARD_PRESSURE_THRESHOLD {
            let mut queue = self.shared.queue.lock().expect("queue mutex poisoned");
            let drop_count = queue.len() / 2;
            for _ in 0..drop_count {
                queue.pop_front();
            }
            log_msg(
                Channel::Streaming,
                Level::Info,
                &format!("pressure={level}: discarded {drop_count} queued chunks"),
            );
            self.shared.not_full.notify_all();
        }
    }

    pub fn queued_len(&self) -> usize {
        self.shared.queue.lock().expect("queue mutex poisoned").len()
    }
}

fn producer_loop(
    demuxer: &mut dyn Demuxer,
    stream_id: u32,
    shared: Arc<Shared>,
    cmd_rx: std::sync::mpsc::Receiver<Command>,
) {
    loop {
        if shared.stop_flag.load(Ordering::SeqCst) {
            return;
        }
        while let Ok(Command::Seek(timestamp_ms)) = cmd_rx.try_recv() {
            match demuxer.seek(stream_id, timestamp_ms) {
                Ok(_) => {}
                Err(e) => {
                    *shared.last_error.lock().expect("queue mutex poisoned") = Some(e.to_string());
                }
            }
        }

        let generation = shared.generation.load(Ordering::SeqCst);
        let chunk = match demuxer.next_chunk(stream_id) {
            Ok(chunk) => chunk,
            Err(e) => {
                *shared.last_error.lock().expect("queue mutex poisoned") = Some(e.to_string());
                shared.producer_eof.store(true, Ordering::SeqCst);
                shared.not_empty.notify_all();
                return;
            }
        };
        let is_eof = chunk.is_eof();

        let mut queue = shared.queue.lock().expect("queue mutex poisoned");
        if shared.generation.load(Ordering::SeqCst) != generation {
            // A seek landed while this chunk was in flight; it reflects the
            // pre-seek position and must not reach the consumer.
            continue;
        }
        loop {
            if shared.stop_flag.load(Ordering::SeqCst) {
                return;
            }
            let limits = *shared.limits.lock().expect("limits mutex poisoned");
            let bytes = Shared::queued_bytes(&queue);
            if queue.len() < limits.max_chunks && bytes < limits.max_bytes {
                break;
            }
            queue = shared.not_full.wait(queue).expect("queue mutex poisoned");
        }
        queue.push_back(chunk);
        shared.not_empty.notify_one();
        if is_eof {
            shared.producer_eof.store(true, Ordering::SeqCst);
            return;
        }
    }
}
