// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batching writer for Line Protocol lines.
//!
//! Accumulates lines and flushes them to a [`LineSink`] either when the
//! batch is full or when the configured time interval has elapsed.

use crate::error::Result;
use crate::sink::LineSink;
use std::time::{Duration, Instant};

/// Default number of lines per batch.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Default maximum time between flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// A batching writer in front of a [`LineSink`].
///
/// Lines are accumulated until either:
/// - The buffer reaches `max_size` (size-based flush)
/// - `flush_interval` has elapsed since the last flush (time-based flush)
///
/// Each flush is a single `write_lines` call. The buffer is cleared and
/// the timer reset whether or not that call succeeds.
pub struct BatchWriter<K> {
    sink: K,
    lines: Vec<String>,
    max_size: usize,
    flush_interval: Duration,
    last_flush: Instant,
    total_written: u64,
}

impl<K: LineSink> BatchWriter<K> {
    /// Create a new batch writer.
    ///
    /// # Arguments
    /// - `sink` - Destination for flushed batches
    /// - `max_size` - Number of lines that triggers a flush
    /// - `flush_interval` - Maximum time between flushes
    pub fn new(sink: K, max_size: usize, flush_interval: Duration) -> Self {
        Self {
            sink,
            lines: Vec::with_capacity(max_size),
            max_size,
            flush_interval,
            last_flush: Instant::now(),
            total_written: 0,
        }
    }

    /// Append a line to the buffer. Never flushes.
    pub fn offer(&mut self, line: String) {
        self.lines.push(line);
    }

    /// Check whether a size- or time-based flush is due at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.lines.len() >= self.max_size
            || now.saturating_duration_since(self.last_flush) >= self.flush_interval
    }

    /// Flush if the batch is full or the interval has elapsed.
    ///
    /// Returns the number of lines written (0 if nothing was due or the
    /// buffer was empty).
    pub fn maybe_flush(&mut self, now: Instant) -> Result<usize> {
        if !self.is_due(now) {
            return Ok(0);
        }
        self.flush_at(now)
    }

    /// Flush unconditionally.
    pub fn force_flush(&mut self) -> Result<usize> {
        self.flush_at(Instant::now())
    }

    fn flush_at(&mut self, now: Instant) -> Result<usize> {
        self.last_flush = now;
        if self.lines.is_empty() {
            return Ok(0);
        }

        let batch = std::mem::replace(&mut self.lines, Vec::with_capacity(self.max_size));
        let count = batch.len();
        self.sink.write_lines(&batch)?;

        self.total_written += count as u64;
        tracing::info!(
            points = count,
            total = self.total_written,
            "[FLUSH] wrote {} points (total={})",
            count,
            self.total_written
        );
        Ok(count)
    }

    /// Get the current number of buffered lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines successfully written since creation.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Borrow the underlying sink.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Consume the writer, returning the sink. Buffered lines are dropped.
    pub fn into_sink(self) -> K {
        self.sink
    }
}
