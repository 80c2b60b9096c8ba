use crate::error::{MonitorError, Result};
use std::time::Duration;

/// Tunables for the whole monitoring pipeline.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between the start of two consecutive cycles
    pub poll_interval: Duration,
    /// Canonical frame width after normalization
    pub target_width: u32,
    /// Canonical frame height after normalization
    pub target_height: u32,
    /// Gaussian blur applied after resizing, `None` to skip
    pub blur_sigma: Option<f32>,
    /// Per-pixel luma difference above which a pixel counts as changed
    pub pixel_threshold: u8,
    /// Score at or above which an alert is raised
    pub high_threshold: f64,
    /// Score below which a raised alert clears
    pub low_threshold: f64,
    /// Suppression window after a clear
    pub cooldown: Duration,
    /// Consecutive quiet comparisons before the baseline follows the scene
    pub settle_frames: u32,
    /// Consecutive failed cycles tolerated before the loop gives up
    pub max_consecutive_failures: u32,
    /// Log stage timings every this many cycles
    pub stats_every: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            target_width: 320,
            target_height: 240,
            blur_sigma: Some(1.0),
            pixel_threshold: 25,
            high_threshold: 0.05,
            low_threshold: 0.01,
            cooldown: Duration::from_secs(30),
            settle_frames: 10,
            max_consecutive_failures: 5,
            stats_every: 60,
        }
    }
}

impl MonitorConfig {
    /// Reject degenerate settings before the monitor starts.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(invalid("poll interval must be positive"));
        }
        if self.target_width == 0 || self.target_height == 0 {
            return Err(invalid(format!(
                "target size {}x{} has zero area",
                self.target_width, self.target_height
            )));
        }
        if let Some(sigma) = self.blur_sigma {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(invalid(format!("blur sigma {sigma} must be positive")));
            }
        }
        for (name, value) in [
            ("high threshold", self.high_threshold),
            ("low threshold", self.low_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(invalid(format!("{name} {value} must be in (0, 1]")));
            }
        }
        if self.low_threshold >= self.high_threshold {
            return Err(invalid(format!(
                "low threshold {} must be below high threshold {}",
                self.low_threshold, self.high_threshold
            )));
        }
        if self.cooldown.is_zero() {
            return Err(invalid("cooldown must be positive"));
        }
        if self.settle_frames == 0 {
            return Err(invalid("settle frames must be at least 1"));
        }
        if self.max_consecutive_failures == 0 {
            return Err(invalid("failure budget must be at least 1"));
        }
        if self.stats_every == 0 {
            return Err(invalid("stats interval must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> MonitorError {
    MonitorError::Configuration(reason.into())
}
