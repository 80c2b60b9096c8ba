mod evidence;
mod jsonl;
mod log;

pub use evidence::EvidenceSink;
pub use jsonl::JsonLinesSink;
pub use log::LogSink;

use crate::alert::Event;
use anyhow::Result;

/// Trait for event destinations
pub trait EventSink {
    /// Deliver one event
    fn emit(&mut self, event: &Event) -> Result<()>;

    /// Push out anything buffered
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn emit(&mut self, event: &Event) -> Result<()> {
        (**self).emit(event)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Forwards every event to each inner sink.
///
/// A failing sink doesn't stop the others; the first error is returned
/// once all sinks have been tried.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn for_each<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut dyn EventSink) -> Result<()>,
    {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(err) = f(sink.as_mut()) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl EventSink for FanoutSink {
    fn emit(&mut self, event: &Event) -> Result<()> {
        self.for_each(|sink| sink.emit(event))
    }

    fn flush(&mut self) -> Result<()> {
        self.for_each(|sink| sink.flush())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::EventKind;
    use crate::diff::ChangeScore;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    struct Failing;

    impl EventSink for Failing {
        fn emit(&mut self, _event: &Event) -> Result<()> {
            anyhow::bail!("sink offline")
        }
    }

    struct Recording(Arc<Mutex<Vec<EventKind>>>);

    impl EventSink for Recording {
        fn emit(&mut self, event: &Event) -> Result<()> {
            self.0.lock().unwrap().push(event.kind);
            Ok(())
        }
    }

    #[test]
    fn fanout_reaches_all_sinks_despite_failure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut fanout = FanoutSink::new();
        fanout.push(Box::new(Failing));
        fanout.push(Box::new(Recording(seen.clone())));

        let event = Event {
            kind: EventKind::Alert,
            timestamp: Utc::now(),
            score: ChangeScore::ZERO,
            frame: None,
        };
        let result = fanout.emit(&event);

        assert!(result.is_err());
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::Alert]);
        assert!(fanout.flush().is_ok());
    }
}
