use crate::alert::{AlertMachine, EventKind};
use crate::baseline::{Baseline, BaselineManager};
use crate::capture::{Acquired, FrameSource};
use crate::config::MonitorConfig;
use crate::diff::{ChangeScore, Differencer};
use crate::error::{MonitorError, Result};
use crate::normalize::Normalizer;
use crate::persist::BaselineStore;
use crate::sink::EventSink;
use crate::status::{StatusHandle, StatusSnapshot};
use chrono::{DateTime, Utc};
use image::GrayImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest stretch the loop sleeps without checking for shutdown
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Cooperative stop signal shared between the loop and whoever stops it.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on shutdown.
    fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.is_requested() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(SHUTDOWN_POLL));
        }
    }
}

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// First usable frame became the baseline
    BaselineEstablished,
    Compared {
        score: ChangeScore,
        event: Option<EventKind>,
        baseline_updated: bool,
    },
    /// Acquisition or decode failed; the cycle was skipped
    Skipped,
    /// Frame older than the last compared one; dropped
    OutOfOrder,
    EndOfStream,
}

#[derive(Debug, Default)]
struct StageTimings {
    frames: u64,
    acquire: Duration,
    normalize: Duration,
    compare: Duration,
}

impl StageTimings {
    fn log(&self) {
        if self.frames == 0 {
            return;
        }
        let avg_ms = |total: Duration| total.as_secs_f64() * 1000.0 / self.frames as f64;
        tracing::info!(
            "Frame {}: acquire={:.1}ms, normalize={:.1}ms, compare={:.1}ms",
            self.frames,
            avg_ms(self.acquire),
            avg_ms(self.normalize),
            avg_ms(self.compare)
        );
    }
}

/// Drives acquisition, comparison and alerting on a fixed cadence.
///
/// The monitor is the only writer of the baseline and alert state. Other
/// threads observe it through [`StatusHandle`] snapshots.
pub struct Monitor<S, K> {
    source: S,
    sink: K,
    config: MonitorConfig,
    normalizer: Normalizer,
    differencer: Differencer,
    baseline: BaselineManager,
    alerts: AlertMachine,
    store: Option<BaselineStore>,
    status: StatusHandle,
    shutdown: Shutdown,
    last_frame_at: Option<DateTime<Utc>>,
    last_score: Option<ChangeScore>,
    consecutive_failures: u32,
    cycles: u64,
    skipped_cycles: u64,
    timings: StageTimings,
}

impl<S, K> Monitor<S, K>
where
    S: FrameSource,
    K: EventSink,
{
    pub fn new(config: MonitorConfig, source: S, sink: K) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            normalizer: Normalizer::new(
                config.target_width,
                config.target_height,
                config.blur_sigma,
            ),
            differencer: Differencer::new(config.pixel_threshold),
            baseline: BaselineManager::new(config.settle_frames, config.low_threshold),
            alerts: AlertMachine::new(
                config.high_threshold,
                config.low_threshold,
                config.cooldown,
            ),
            source,
            sink,
            config,
            store: None,
            status: StatusHandle::new(),
            shutdown: Shutdown::new(),
            last_frame_at: None,
            last_score: None,
            consecutive_failures: 0,
            cycles: 0,
            skipped_cycles: 0,
            timings: StageTimings::default(),
        })
    }

    /// Restrict comparisons to the non-zero pixels of `mask`.
    ///
    /// The mask is resized to the canonical frame size.
    pub fn with_mask(mut self, mask: GrayImage) -> Result<Self> {
        if mask.width() == 0 || mask.height() == 0 {
            return Err(MonitorError::Configuration(
                "region-of-interest mask has zero area".to_string(),
            ));
        }
        let (width, height) = self.normalizer.target_size();
        let mask = if mask.dimensions() != (width, height) {
            image::imageops::resize(&mask, width, height, image::imageops::FilterType::Nearest)
        } else {
            mask
        };
        if mask.pixels().all(|p| p[0] == 0) {
            return Err(MonitorError::Configuration(
                "region-of-interest mask excludes every pixel".to_string(),
            ));
        }
        self.differencer = self.differencer.with_mask(mask);
        Ok(self)
    }

    /// Persist baselines to `store`, starting from the stored one if any.
    pub fn with_baseline_store(mut self, store: BaselineStore) -> Result<Self> {
        if let Some(frame) = store.load(self.normalizer.target_size())? {
            self.baseline.reset(frame);
        }
        self.store = Some(store);
        self.publish_status();
        Ok(self)
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.current()
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Run until the source ends or shutdown is requested.
    ///
    /// Returns an error only for fatal conditions; the sink is flushed first.
    pub fn run(&mut self) -> Result<()> {
        tracing::info!(
            "Monitoring {} every {:?}",
            self.source.describe(),
            self.config.poll_interval
        );

        loop {
            if self.shutdown.is_requested() {
                tracing::info!("Shutdown requested, stopping monitor");
                break;
            }

            let cycle_start = Instant::now();
            match self.run_cycle() {
                Ok(CycleOutcome::EndOfStream) => {
                    tracing::info!("Frame source ended, stopping monitor");
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!("Monitor stopping: {}", err);
                    self.flush_sink();
                    return Err(err);
                }
            }

            if self.cycles % self.config.stats_every == 0 {
                self.timings.log();
            }

            // Cadence limiting
            let elapsed = cycle_start.elapsed();
            if elapsed < self.config.poll_interval {
                self.shutdown.sleep(self.config.poll_interval - elapsed);
            }
        }

        self.flush_sink();
        Ok(())
    }

    /// One acquire, normalize, compare, alert, settle pass.
    ///
    /// The status snapshot is republished afterwards, fatal errors included.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let outcome = self.cycle();
        if !matches!(outcome, Ok(CycleOutcome::EndOfStream)) {
            self.cycles += 1;
        }
        self.publish_status();
        outcome
    }

    fn cycle(&mut self) -> Result<CycleOutcome> {
        let acquire_start = Instant::now();
        let raw = match self.source.next_frame() {
            Ok(Acquired::Frame(raw)) => raw,
            Ok(Acquired::EndOfStream) => return Ok(CycleOutcome::EndOfStream),
            Err(err) => return self.skip(MonitorError::Acquisition(err)),
        };
        self.timings.acquire += acquire_start.elapsed();

        let normalize_start = Instant::now();
        let frame = match self.normalizer.normalize(raw) {
            Ok(frame) => frame,
            Err(err) if err.is_recoverable() => return self.skip(err),
            Err(err) => return Err(err),
        };
        self.timings.normalize += normalize_start.elapsed();
        self.timings.frames += 1;
        self.consecutive_failures = 0;

        if let Some(last) = self.last_frame_at {
            if frame.timestamp() < last {
                tracing::warn!(
                    "Dropping out-of-order frame at {} (last compared {})",
                    frame.timestamp(),
                    last
                );
                return Ok(CycleOutcome::OutOfOrder);
            }
        }
        self.last_frame_at = Some(frame.timestamp());

        let Some(baseline) = self.baseline.current() else {
            tracing::info!("Initial baseline from frame at {}", frame.timestamp());
            self.baseline.reset(frame);
            self.persist_baseline();
            return Ok(CycleOutcome::BaselineEstablished);
        };

        let compare_start = Instant::now();
        let score = self.differencer.compare(&baseline.frame, &frame)?;
        self.timings.compare += compare_start.elapsed();
        self.last_score = Some(score);

        tracing::debug!(
            "Score {:.4} ({}/{} pixels) at {}",
            score.magnitude,
            score.changed_pixels,
            score.compared_pixels,
            frame.timestamp()
        );

        let event = self
            .alerts
            .update(&score, frame.timestamp())
            .map(|event| event.with_evidence(frame.clone()));

        let baseline_updated = self.baseline.observe(&score, &frame);
        if baseline_updated {
            tracing::info!("Scene settled, baseline updated");
            self.persist_baseline();
        }

        if let Some(event) = &event {
            if let Err(err) = self.sink.emit(event) {
                tracing::warn!("Failed to deliver {:?} event: {:#}", event.kind, err);
            }
        }

        Ok(CycleOutcome::Compared {
            score,
            event: event.map(|event| event.kind),
            baseline_updated,
        })
    }

    fn skip(&mut self, err: MonitorError) -> Result<CycleOutcome> {
        self.consecutive_failures += 1;
        self.skipped_cycles += 1;
        tracing::warn!(
            "Skipping cycle ({} consecutive failures): {}",
            self.consecutive_failures,
            err
        );

        if self.consecutive_failures > self.config.max_consecutive_failures {
            return Err(MonitorError::FailureBudgetExhausted {
                failures: self.consecutive_failures,
            });
        }
        Ok(CycleOutcome::Skipped)
    }

    fn persist_baseline(&self) {
        let (Some(store), Some(baseline)) = (&self.store, self.baseline.current()) else {
            return;
        };
        if let Err(err) = store.save(&baseline.frame) {
            tracing::warn!(
                "Failed to save baseline to {}: {}",
                store.path().display(),
                err
            );
        }
    }

    fn flush_sink(&mut self) {
        if let Err(err) = self.sink.flush() {
            tracing::warn!("Failed to flush event sink: {:#}", err);
        }
    }

    fn publish_status(&self) {
        let baseline = self.baseline.current();
        self.status.publish(StatusSnapshot {
            state: self.alerts.state(),
            last_transition: self.alerts.last_transition(),
            last_score: self.last_score,
            last_frame_at: self.last_frame_at,
            baseline_established_at: baseline.map(|b| b.established_at),
            baseline_updates: baseline.map_or(0, |b| b.update_count),
            cycles: self.cycles,
            skipped_cycles: self.skipped_cycles,
            consecutive_failures: self.consecutive_failures,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertState, Event};
    use crate::capture::MemorySource;
    use crate::frame::{Frame, RawFrame};
    use chrono::TimeZone;
    use image::Luma;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recording(Arc<Mutex<Vec<Event>>>);

    impl Recording {
        fn kinds(&self) -> Vec<EventKind> {
            self.0.lock().unwrap().iter().map(|e| e.kind).collect()
        }
    }

    impl EventSink for Recording {
        fn emit(&mut self, event: &Event) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    /// Counts flushes, drops events.
    #[derive(Clone, Default)]
    struct Flushes(Arc<AtomicUsize>);

    impl EventSink for Flushes {
        fn emit(&mut self, _event: &Event) -> anyhow::Result<()> {
            Ok(())
        }

        fn flush(&mut self) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_millis(1),
            target_width: 8,
            target_height: 8,
            blur_sigma: None,
            pixel_threshold: 10,
            high_threshold: 0.8,
            low_threshold: 0.2,
            cooldown: Duration::from_secs(2),
            settle_frames: 3,
            max_consecutive_failures: 2,
            stats_every: 10,
        }
    }

    fn raw(secs: i64, value: u8) -> RawFrame {
        let timestamp = Utc.timestamp_opt(secs, 0).unwrap();
        RawFrame::decoded(timestamp, GrayImage::from_pixel(8, 8, Luma([value])))
    }

    #[test]
    fn first_frame_becomes_baseline() {
        let source: MemorySource = [raw(1, 0)].into_iter().collect();
        let mut monitor = Monitor::new(config(), source, Recording::default()).unwrap();

        assert_eq!(
            monitor.run_cycle().unwrap(),
            CycleOutcome::BaselineEstablished
        );
        assert_eq!(monitor.baseline().unwrap().update_count, 1);
        assert_eq!(monitor.run_cycle().unwrap(), CycleOutcome::EndOfStream);
    }

    #[test]
    fn rejects_invalid_config_at_construction() {
        let bad = MonitorConfig {
            low_threshold: 0.9,
            ..config()
        };

        let result = Monitor::new(bad, MemorySource::new(), Recording::default());
        assert!(matches!(result, Err(MonitorError::Configuration(_))));
    }

    #[test]
    fn transient_failures_are_skipped() {
        let mut source = MemorySource::new();
        source.push_frame(raw(1, 0));
        source.push_error(anyhow::anyhow!("timeout"));
        source.push_frame(RawFrame::encoded(
            Utc.timestamp_opt(2, 0).unwrap(),
            b"junk".to_vec(),
        ));
        source.push_frame(raw(3, 0));
        let mut monitor = Monitor::new(config(), source, Recording::default()).unwrap();

        monitor.run().unwrap();

        let status = monitor.status_handle().snapshot();
        assert_eq!(status.skipped_cycles, 2);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.cycles, 4);
        assert_eq!(status.last_score.unwrap().magnitude, 0.0);
    }

    #[test]
    fn failure_budget_exhaustion_is_fatal() {
        let mut source = MemorySource::new();
        for _ in 0..3 {
            source.push_error(anyhow::anyhow!("camera gone"));
        }
        source.push_frame(raw(1, 0));
        let mut monitor = Monitor::new(config(), source, Recording::default()).unwrap();

        let err = monitor.run().unwrap_err();

        assert!(matches!(
            err,
            MonitorError::FailureBudgetExhausted { failures: 3 }
        ));
    }

    #[test]
    fn sink_is_flushed_before_fatal_error() {
        let mut source = MemorySource::new();
        source.push_frame(raw(1, 0));
        for _ in 0..3 {
            source.push_error(anyhow::anyhow!("camera gone"));
        }
        let flushes = Flushes::default();
        let mut monitor = Monitor::new(config(), source, flushes.clone()).unwrap();

        let err = monitor.run().unwrap_err();

        assert!(matches!(err, MonitorError::FailureBudgetExhausted { .. }));
        assert_eq!(flushes.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dimension_mismatch_is_fatal() {
        let source: MemorySource = [raw(2, 0), raw(3, 0)].into_iter().collect();
        let mut monitor = Monitor::new(config(), source, Recording::default()).unwrap();
        let stale = Frame::new(Utc.timestamp_opt(1, 0).unwrap(), GrayImage::new(4, 4));
        monitor.baseline.reset(stale);

        let err = monitor.run_cycle().unwrap_err();

        assert!(matches!(
            err,
            MonitorError::DimensionMismatch {
                expected: (4, 4),
                actual: (8, 8),
            }
        ));
        assert_eq!(monitor.status_handle().snapshot().skipped_cycles, 0);
    }

    #[test]
    fn out_of_order_frames_are_dropped() {
        let source: MemorySource = [raw(5, 0), raw(3, 255)].into_iter().collect();
        let mut monitor = Monitor::new(config(), source, Recording::default()).unwrap();

        monitor.run_cycle().unwrap();
        assert_eq!(monitor.run_cycle().unwrap(), CycleOutcome::OutOfOrder);
        assert!(monitor.sink().kinds().is_empty());
    }

    #[test]
    fn alert_carries_frame_evidence() {
        let source: MemorySource = [raw(1, 0), raw(2, 200)].into_iter().collect();
        let sink = Recording::default();
        let mut monitor = Monitor::new(config(), source, sink.clone()).unwrap();

        monitor.run().unwrap();

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Alert);
        let evidence = events[0].frame.as_ref().unwrap();
        assert_eq!(evidence.pixels().get_pixel(0, 0)[0], 200);
        assert_eq!(
            monitor.status_handle().snapshot().state,
            AlertState::Triggered
        );
    }

    #[test]
    fn mask_must_cover_some_pixels() {
        let monitor = Monitor::new(config(), MemorySource::new(), Recording::default()).unwrap();

        let result = monitor.with_mask(GrayImage::new(8, 8));
        assert!(matches!(result, Err(MonitorError::Configuration(_))));
    }

    #[test]
    fn shutdown_stops_before_next_cycle() {
        let source: MemorySource = [raw(1, 0), raw(2, 0)].into_iter().collect();
        let mut monitor = Monitor::new(config(), source, Recording::default()).unwrap();
        monitor.shutdown_handle().request();

        monitor.run().unwrap();

        assert!(monitor.baseline().is_none());
    }

    #[test]
    fn shutdown_during_sleep_stops_after_current_cycle() {
        let source: MemorySource = (1..=5).map(|n| raw(n, 0)).collect();
        let config = MonitorConfig {
            poll_interval: Duration::from_secs(30),
            ..config()
        };
        let mut monitor = Monitor::new(config, source, Recording::default()).unwrap();
        let shutdown = monitor.shutdown_handle();

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            shutdown.request();
        });
        let started = Instant::now();
        monitor.run().unwrap();
        stopper.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(monitor.status_handle().snapshot().cycles, 1);
        assert!(monitor.baseline().is_some());
        assert_eq!(monitor.source.remaining(), 4);
    }
}
