use thiserror::Error;

/// Errors raised by the monitoring core.
///
/// `Decode` and `Acquisition` are recoverable per cycle. Everything else ends
/// the monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to decode frame: {0}")]
    Decode(String),

    #[error("frame dimensions {actual:?} do not match expected {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("frame acquisition failed: {0:#}")]
    Acquisition(anyhow::Error),

    #[error("{failures} consecutive cycle failures, giving up")]
    FailureBudgetExhausted { failures: u32 },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Whether the monitor loop may skip the cycle and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MonitorError::Decode(_) | MonitorError::Acquisition(_))
    }
}

impl From<image::ImageError> for MonitorError {
    fn from(err: image::ImageError) -> Self {
        MonitorError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
