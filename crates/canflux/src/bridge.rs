// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingestion loop: bus -> decode -> encode -> batch -> flush.

use crate::buffer::BatchWriter;
use crate::config::{BridgeConfig, WriteFailurePolicy};
use crate::decoder::decode;
use crate::encoder::{encode_raw, encode_telemetry, PointTags};
use crate::error::Result;
use crate::frame::CanFrame;
use crate::sink::LineSink;
use crate::source::FrameSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// What a single [`Bridge::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// No frame arrived within the receive timeout.
    Idle {
        /// Lines flushed by the time-based check.
        flushed: usize,
    },
    /// A frame was processed.
    Frame {
        /// Points produced from the frame (0, 1 or 2).
        points: usize,
        /// Lines flushed after offering them.
        flushed: usize,
    },
}

/// Bridge statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Frames received from the source.
    pub frames_received: u64,
    /// Raw-frame points produced.
    pub raw_points: u64,
    /// Telemetry points produced.
    pub telemetry_points: u64,
    /// Telemetry frames too short to decode.
    pub decode_skips: u64,
    /// Receives that timed out.
    pub timeouts: u64,
    /// Batches written.
    pub flushes: u64,
    /// Lines written.
    pub points_written: u64,
    /// Batches dropped after a failed write.
    pub write_failures: u64,
}

/// Handle used to stop a running bridge from another thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    /// A handle that has not been triggered.
    pub fn new() -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ask the bridge to stop after the current iteration.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether [`stop`](Self::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings the loop reads on every frame, resolved once from [`BridgeConfig`].
struct LoopSettings {
    raw_tags: PointTags,
    telemetry_tags: PointTags,
    raw_measurement: String,
    telemetry_measurement: String,
    write_raw_frames: bool,
    decode_telemetry: bool,
    telemetry_id: u32,
    telemetry_extended: bool,
    receive_timeout: Duration,
    on_write_error: WriteFailurePolicy,
}

impl LoopSettings {
    fn from_config(config: &BridgeConfig) -> Self {
        Self {
            raw_tags: config.raw_tags(),
            telemetry_tags: config.telemetry_tags(),
            raw_measurement: config.raw_measurement.clone(),
            telemetry_measurement: config.telemetry_measurement.clone(),
            write_raw_frames: config.write_raw_frames,
            decode_telemetry: config.decode_telemetry,
            telemetry_id: config.telemetry.can_id,
            telemetry_extended: config.telemetry.extended,
            receive_timeout: config.receive_timeout(),
            on_write_error: config.on_write_error,
        }
    }
}

/// The CAN-to-InfluxDB ingestion loop.
///
/// Single-threaded: each [`step`](Self::step) waits for one frame (or a
/// timeout), turns it into points, offers them to the batch writer and
/// checks the flush thresholds.
pub struct Bridge<S, K> {
    source: S,
    writer: BatchWriter<K>,
    settings: LoopSettings,
    stats: BridgeStats,
}

impl<S: FrameSource, K: LineSink> Bridge<S, K> {
    /// Wire a source and a sink using `config`.
    pub fn new(config: &BridgeConfig, source: S, sink: K) -> Self {
        let writer = BatchWriter::new(sink, config.batch.max_size, config.flush_interval());
        Self {
            source,
            writer,
            settings: LoopSettings::from_config(config),
            stats: BridgeStats::default(),
        }
    }

    /// Run one WAITING -> PROCESSING -> WAITING cycle.
    pub fn step(&mut self) -> Result<StepOutcome> {
        let Some(frame) = self.source.receive(self.settings.receive_timeout)? else {
            self.stats.timeouts += 1;
            let flushed = self.flush_if_due()?;
            return Ok(StepOutcome::Idle { flushed });
        };

        self.stats.frames_received += 1;
        let points = self.process_frame(&frame, unix_nanos())?;
        let flushed = self.flush_if_due()?;
        Ok(StepOutcome::Frame { points, flushed })
    }

    /// Run until `stop` is triggered, then flush what is buffered.
    ///
    /// Without a stop this only returns on error.
    pub fn run(&mut self, stop: &StopHandle) -> Result<BridgeStats> {
        tracing::info!(
            telemetry_id = %format!("0x{:X}", self.settings.telemetry_id),
            "Bridge running"
        );
        while !stop.is_stopped() {
            self.step()?;
        }
        self.shutdown()
    }

    /// Run exactly `iterations` steps, then flush what is buffered.
    pub fn run_for(&mut self, iterations: usize) -> Result<BridgeStats> {
        for _ in 0..iterations {
            self.step()?;
        }
        self.shutdown()
    }

    /// Get bridge statistics.
    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    /// Lines waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.writer.len()
    }

    /// Borrow the sink.
    pub fn sink(&self) -> &K {
        self.writer.sink()
    }

    /// Borrow the source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Produce and offer the points for one frame.
    fn process_frame(&mut self, frame: &CanFrame, timestamp_ns: u64) -> Result<usize> {
        let s = &self.settings;
        let mut points = 0;

        if s.write_raw_frames {
            let line = encode_raw(frame, &s.raw_tags, &s.raw_measurement, timestamp_ns)?;
            self.writer.offer(line);
            self.stats.raw_points += 1;
            points += 1;
        }

        if s.decode_telemetry && frame.matches(s.telemetry_id, s.telemetry_extended) {
            match decode(frame.payload()) {
                Some(record) => {
                    let line = encode_telemetry(
                        &record,
                        &s.telemetry_tags,
                        &s.telemetry_measurement,
                        timestamp_ns,
                    )?;
                    self.writer.offer(line);
                    self.stats.telemetry_points += 1;
                    points += 1;
                    tracing::info!(
                        "[TELEM] V={:.1}V  SOC={:.1}%",
                        record.pack_voltage,
                        record.soc
                    );
                }
                None => {
                    self.stats.decode_skips += 1;
                    tracing::debug!(dlc = frame.dlc(), "Telemetry frame too short to decode");
                }
            }
        }

        Ok(points)
    }

    fn flush_if_due(&mut self) -> Result<usize> {
        let pending = self.writer.len();
        let result = self.writer.maybe_flush(Instant::now());
        self.account_flush(result, pending)
    }

    fn shutdown(&mut self) -> Result<BridgeStats> {
        let pending = self.writer.len();
        let result = self.writer.force_flush();
        self.account_flush(result, pending)?;
        tracing::info!(
            frames = self.stats.frames_received,
            written = self.stats.points_written,
            write_failures = self.stats.write_failures,
            "Bridge stopped"
        );
        Ok(self.stats.clone())
    }

    fn account_flush(&mut self, result: Result<usize>, pending: usize) -> Result<usize> {
        match result {
            Ok(0) => Ok(0),
            Ok(n) => {
                self.stats.flushes += 1;
                self.stats.points_written += n as u64;
                Ok(n)
            }
            Err(e) => {
                self.stats.write_failures += 1;
                match self.settings.on_write_error {
                    WriteFailurePolicy::Abort => Err(e),
                    WriteFailurePolicy::LogAndContinue => {
                        tracing::warn!(dropped = pending, "Batch write failed: {}", e);
                        Ok(0)
                    }
                }
            }
        }
    }
}

/// Wall-clock time in nanoseconds since the Unix epoch.
///
/// Not monotonic: a clock stepped backwards yields earlier timestamps.
fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sink::MemorySink;
    use std::collections::VecDeque;

    const EXAMPLE: [u8; 8] = [0xE8, 0x03, 0x64, 0x00, 0xC8, 0x19, 0x1E, 0x00];

    /// Replays frames; `None` entries become timeouts.
    struct ScriptedSource {
        script: VecDeque<Option<CanFrame>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Option<CanFrame>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn receive(&mut self, _timeout: Duration) -> Result<Option<CanFrame>> {
            Ok(self.script.pop_front().flatten())
        }
    }

    struct RejectingSink;

    impl LineSink for RejectingSink {
        fn write_lines(&mut self, _lines: &[String]) -> Result<()> {
            Err(Error::WriteRejected {
                status: 401,
                body: "unauthorized".to_string(),
            })
        }
    }

    fn processed(points: usize, flushed: usize) -> StepOutcome {
        StepOutcome::Frame { points, flushed }
    }

    fn telem(data: &[u8]) -> Option<CanFrame> {
        CanFrame::new_data(0x6B0, false, data)
    }

    fn other() -> Option<CanFrame> {
        CanFrame::new_data(0x100, false, &[1, 2, 3])
    }

    fn config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.batch.flush_interval_ms = 60_000;
        config
    }

    #[test]
    fn test_step_telemetry_frame_produces_two_points() {
        let source = ScriptedSource::new(vec![telem(&EXAMPLE)]);
        let mut bridge = Bridge::new(&config(), source, MemorySink::new());
        let outcome = bridge.step().expect("step");
        assert_eq!(outcome, processed(2, 0));
        assert_eq!(bridge.buffered(), 2);
        assert_eq!(bridge.stats().raw_points, 1);
        assert_eq!(bridge.stats().telemetry_points, 1);
    }

    #[test]
    fn test_step_other_frame_is_raw_only() {
        let source = ScriptedSource::new(vec![other()]);
        let mut bridge = Bridge::new(&config(), source, MemorySink::new());
        let outcome = bridge.step().expect("step");
        assert_eq!(outcome, processed(1, 0));
        assert_eq!(bridge.stats().telemetry_points, 0);
    }

    #[test]
    fn test_extended_flag_must_match() {
        let frame = CanFrame::new_data(0x6B0, true, &EXAMPLE);
        let source = ScriptedSource::new(vec![frame]);
        let mut bridge = Bridge::new(&config(), source, MemorySink::new());
        assert_eq!(bridge.step().expect("step"), processed(1, 0));
    }

    #[test]
    fn test_short_telemetry_frame_is_skipped() {
        let source = ScriptedSource::new(vec![telem(&EXAMPLE[..7])]);
        let mut bridge = Bridge::new(&config(), source, MemorySink::new());
        bridge.step().expect("step");
        assert_eq!(bridge.stats().decode_skips, 1);
        assert_eq!(bridge.stats().raw_points, 1);
        assert_eq!(bridge.stats().telemetry_points, 0);
    }

    #[test]
    fn test_toggles_disable_outputs() {
        let mut cfg = config();
        cfg.write_raw_frames = false;
        cfg.decode_telemetry = false;
        let source = ScriptedSource::new(vec![telem(&EXAMPLE)]);
        let mut bridge = Bridge::new(&cfg, source, MemorySink::new());
        assert_eq!(bridge.step().expect("step"), processed(0, 0));
        assert_eq!(bridge.buffered(), 0);
    }

    #[test]
    fn test_timeout_counts_and_buffers_nothing() {
        let mut bridge = Bridge::new(&config(), ScriptedSource::new(vec![None]), MemorySink::new());
        assert_eq!(bridge.step().expect("step"), StepOutcome::Idle { flushed: 0 });
        assert_eq!(bridge.stats().timeouts, 1);
    }

    #[test]
    fn test_timeout_triggers_time_based_flush() {
        let mut cfg = config();
        cfg.batch.flush_interval_ms = 0;
        cfg.write_raw_frames = false;
        let script = vec![None];
        let mut bridge = Bridge::new(&cfg, ScriptedSource::new(script), MemorySink::new());
        bridge.writer.offer("pending 1".to_string());

        assert_eq!(bridge.step().expect("step"), StepOutcome::Idle { flushed: 1 });
        assert_eq!(bridge.sink().batches().len(), 1);
    }

    #[test]
    fn test_size_threshold_flushes() {
        let mut cfg = config();
        cfg.batch.max_size = 4;
        let script = vec![telem(&EXAMPLE), other(), telem(&EXAMPLE)];
        let mut bridge = Bridge::new(&cfg, ScriptedSource::new(script), MemorySink::new());

        bridge.step().expect("step");
        bridge.step().expect("step");
        assert_eq!(bridge.buffered(), 3);
        let outcome = bridge.step().expect("step");
        assert_eq!(outcome, processed(2, 5));
        assert_eq!(bridge.buffered(), 0);
        assert_eq!(bridge.stats().flushes, 1);
        assert_eq!(bridge.stats().points_written, 5);
    }

    #[test]
    fn test_run_for_flushes_remainder() {
        let script = vec![telem(&EXAMPLE), None, other()];
        let mut bridge = Bridge::new(&config(), ScriptedSource::new(script), MemorySink::new());
        let stats = bridge.run_for(3).expect("run");

        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.points_written, 3);
        assert_eq!(bridge.buffered(), 0);

        let lines: Vec<_> = bridge.sink().lines().cloned().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("bms_can_raw,car_id=sunstang24,source=candapter "));
        assert!(lines[1].starts_with("bms_telemetry,car_id=sunstang24,source=candapter_decoded "));
        assert!(lines[2].contains("arb_id=256i"));
    }

    #[test]
    fn test_run_stops_when_handle_triggered() {
        let stop = StopHandle::new();
        stop.stop();
        let source = ScriptedSource::new(vec![other()]);
        let mut bridge = Bridge::new(&config(), source, MemorySink::new());
        let stats = bridge.run(&stop).expect("run");
        assert_eq!(stats.frames_received, 0);
    }

    #[test]
    fn test_points_share_frame_timestamp() {
        let source = ScriptedSource::new(vec![telem(&EXAMPLE)]);
        let mut bridge = Bridge::new(&config(), source, MemorySink::new());
        bridge.run_for(1).expect("run");
        let stamps: Vec<&str> = bridge
            .sink()
            .lines()
            .map(|l| l.rsplit(' ').next().unwrap_or(""))
            .collect();
        assert_eq!(stamps.len(), 2);
        assert_eq!(stamps[0], stamps[1]);
    }

    #[test]
    fn test_write_failure_aborts_by_default() {
        let mut cfg = config();
        cfg.batch.max_size = 1;
        let source = ScriptedSource::new(vec![other(), other()]);
        let mut bridge = Bridge::new(&cfg, source, RejectingSink);
        let err = bridge.step().unwrap_err();
        assert!(matches!(err, Error::WriteRejected { status: 401, .. }));
        assert_eq!(bridge.stats().write_failures, 1);
        assert_eq!(bridge.buffered(), 0);
    }

    #[test]
    fn test_write_failure_log_and_continue() {
        let mut cfg = config();
        cfg.batch.max_size = 1;
        cfg.on_write_error = WriteFailurePolicy::LogAndContinue;
        let source = ScriptedSource::new(vec![other(), other()]);
        let mut bridge = Bridge::new(&cfg, source, RejectingSink);
        let stats = bridge.run_for(2).expect("run keeps going");
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.write_failures, 2);
        assert_eq!(stats.points_written, 0);
    }

    #[test]
    fn test_source_failure_is_fatal() {
        struct Unplugged;
        impl FrameSource for Unplugged {
            fn receive(&mut self, _timeout: Duration) -> Result<Option<CanFrame>> {
                Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "adapter unplugged",
                )))
            }
        }

        let mut bridge = Bridge::new(&config(), Unplugged, MemorySink::new());
        assert!(matches!(bridge.run(&StopHandle::new()), Err(Error::Io(_))));
    }
}
