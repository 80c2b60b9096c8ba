use anyhow::{bail, Context, Result};
use clap::Parser;
use framewatch::capture::{DirectorySource, FileSource, FrameSource};
use framewatch::sink::{EvidenceSink, FanoutSink, JsonLinesSink, LogSink};
use framewatch::{BaselineStore, Monitor, MonitorConfig, Shutdown};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image file to re-read on every poll
    #[arg(long, conflicts_with = "watch_dir")]
    watch_file: Option<PathBuf>,

    /// Directory to take new images from
    #[arg(long)]
    watch_dir: Option<PathBuf>,

    /// Webcam device index to capture from
    #[cfg(feature = "webcam")]
    #[arg(long, conflicts_with_all = ["watch_file", "watch_dir"])]
    webcam: Option<u32>,

    /// Milliseconds between polls
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Normalized frame width
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Normalized frame height
    #[arg(long, default_value_t = 240)]
    height: u32,

    /// Gaussian blur sigma applied after resizing (0 disables)
    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    blur: f32,

    /// Luma difference (0-255) above which a pixel counts as changed
    #[arg(long, default_value_t = 25)]
    pixel_threshold: u8,

    /// Changed-pixel fraction that raises an alert
    #[arg(long, default_value_t = 0.05)]
    high_threshold: f64,

    /// Changed-pixel fraction below which an alert clears
    #[arg(long, default_value_t = 0.01)]
    low_threshold: f64,

    /// Seconds after a clear before the monitor is fully idle again
    #[arg(long, default_value_t = 30)]
    cooldown_secs: u64,

    /// Quiet comparisons in a row before the baseline follows the scene
    #[arg(long, default_value_t = 10)]
    settle_frames: u32,

    /// Failed cycles in a row tolerated before exiting
    #[arg(long, default_value_t = 5)]
    max_failures: u32,

    /// Log stage timings every N cycles
    #[arg(long, default_value_t = 60)]
    stats_every: u64,

    /// Region-of-interest mask image; black pixels are ignored
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Where to keep the baseline across restarts
    #[arg(long)]
    baseline: Option<PathBuf>,

    /// Append events as JSON lines to this file
    #[arg(long)]
    events: Option<PathBuf>,

    /// Save a JPEG of the triggering frame for each alert into this directory
    #[arg(long)]
    evidence_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_millis(self.interval_ms),
            target_width: self.width,
            target_height: self.height,
            blur_sigma: (self.blur != 0.0).then_some(self.blur),
            pixel_threshold: self.pixel_threshold,
            high_threshold: self.high_threshold,
            low_threshold: self.low_threshold,
            cooldown: Duration::from_secs(self.cooldown_secs),
            settle_frames: self.settle_frames,
            max_consecutive_failures: self.max_failures,
            stats_every: self.stats_every,
        }
    }

    #[cfg(feature = "webcam")]
    fn webcam_source(&self) -> Result<Option<Box<dyn FrameSource>>> {
        let Some(index) = self.webcam else {
            return Ok(None);
        };
        let source: Box<dyn FrameSource> = Box::new(
            framewatch::capture::WebcamSource::new(index)
                .context("Failed to initialize webcam capture")?,
        );
        Ok(Some(source))
    }

    #[cfg(not(feature = "webcam"))]
    fn webcam_source(&self) -> Result<Option<Box<dyn FrameSource>>> {
        Ok(None)
    }

    fn frame_source(&self) -> Result<Box<dyn FrameSource>> {
        if let Some(source) = self.webcam_source()? {
            return Ok(source);
        }
        if let Some(path) = &self.watch_file {
            return Ok(Box::new(FileSource::new(path)));
        }
        if let Some(dir) = &self.watch_dir {
            let source = DirectorySource::new(dir).context("Failed to open watch directory")?;
            return Ok(Box::new(source));
        }
        bail!("No frame source given; use --watch-file or --watch-dir")
    }

    fn event_sink(&self) -> Result<FanoutSink> {
        let mut sinks = FanoutSink::new();
        sinks.push(Box::new(LogSink));

        if let Some(path) = &self.events {
            sinks.push(Box::new(JsonLinesSink::append(path)?));
        }
        if let Some(dir) = &self.evidence_dir {
            sinks.push(Box::new(EvidenceSink::new(dir)?));
        }
        Ok(sinks)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = args.monitor_config();
    config.validate().context("Invalid monitor configuration")?;

    tracing::info!("framewatch starting");
    tracing::info!("Frame size: {}x{}", config.target_width, config.target_height);
    tracing::info!(
        "Thresholds: high={} low={} cooldown={:?}",
        config.high_threshold,
        config.low_threshold,
        config.cooldown
    );

    let source = args.frame_source()?;
    let sink = args.event_sink()?;

    let mut monitor = Monitor::new(config, source, sink)?;

    if let Some(path) = &args.mask {
        let mask = image::open(path)
            .with_context(|| format!("Failed to load mask {}", path.display()))?
            .into_luma8();
        monitor = monitor.with_mask(mask)?;
        tracing::info!("Using region-of-interest mask {}", path.display());
    }

    if let Some(path) = &args.baseline {
        monitor = monitor
            .with_baseline_store(BaselineStore::new(path))
            .with_context(|| format!("Failed to restore baseline from {}", path.display()))?;
    }

    let shutdown = Shutdown::new();
    let handler_shutdown = shutdown.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Interrupt received, finishing current cycle");
        handler_shutdown.request();
    })
    .context("Failed to install Ctrl+C handler")?;
    monitor = monitor.with_shutdown(shutdown);

    tracing::info!("Press Ctrl+C to stop");
    monitor.run()?;

    let status = monitor.status_handle().snapshot();
    tracing::info!(
        "Stopped after {} cycles ({} skipped), final state {:?}",
        status.cycles,
        status.skipped_cycles,
        status.state
    );

    Ok(())
}
