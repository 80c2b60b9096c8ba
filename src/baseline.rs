use crate::diff::ChangeScore;
use crate::frame::Frame;
use chrono::{DateTime, Utc};

/// The reference frame new frames are compared against.
#[derive(Debug, Clone)]
pub struct Baseline {
    pub frame: Frame,
    pub established_at: DateTime<Utc>,
    /// How many baselines have been installed so far, this one included
    pub update_count: u64,
}

/// Owns the current baseline and decides when it follows the scene.
///
/// A baseline is replaced wholesale, never edited. Replacement happens on
/// `reset` (startup, manual intervention) or once `settle_frames`
/// consecutive comparisons have stayed below the low threshold.
#[derive(Debug)]
pub struct BaselineManager {
    current: Option<Baseline>,
    settle_frames: u32,
    low_threshold: f64,
    quiet_streak: u32,
    update_count: u64,
}

impl BaselineManager {
    pub fn new(settle_frames: u32, low_threshold: f64) -> Self {
        Self {
            current: None,
            settle_frames,
            low_threshold,
            quiet_streak: 0,
            update_count: 0,
        }
    }

    pub fn current(&self) -> Option<&Baseline> {
        self.current.as_ref()
    }

    /// Install `frame` as the new baseline.
    pub fn accept(&mut self, frame: Frame) -> &Baseline {
        self.quiet_streak = 0;
        self.update_count += 1;
        tracing::debug!(
            "Baseline #{} established from frame at {}",
            self.update_count,
            frame.timestamp()
        );
        self.current.insert(Baseline {
            established_at: frame.timestamp(),
            frame,
            update_count: self.update_count,
        })
    }

    /// Force-replace the baseline regardless of policy.
    pub fn reset(&mut self, frame: Frame) -> &Baseline {
        tracing::info!("Baseline reset to frame at {}", frame.timestamp());
        self.accept(frame)
    }

    /// Feed the score of `frame` against the current baseline.
    ///
    /// Returns `true` when the frame was accepted as the new baseline.
    pub fn observe(&mut self, score: &ChangeScore, frame: &Frame) -> bool {
        if score.magnitude >= self.low_threshold {
            self.quiet_streak = 0;
            return false;
        }

        self.quiet_streak += 1;
        if self.quiet_streak < self.settle_frames {
            return false;
        }

        self.accept(frame.clone());
        true
    }
}
