use super::EventSink;
use crate::alert::{Event, EventKind};
use anyhow::Result;

/// Reports events through the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&mut self, event: &Event) -> Result<()> {
        let score = &event.score;
        match event.kind {
            EventKind::Alert => tracing::warn!(
                "ALERT at {}: {:.2}% of pixels changed ({}/{})",
                event.timestamp,
                score.magnitude * 100.0,
                score.changed_pixels,
                score.compared_pixels
            ),
            EventKind::Clear => tracing::info!(
                "Clear at {}: change down to {:.2}%",
                event.timestamp,
                score.magnitude * 100.0
            ),
        }
        Ok(())
    }
}
