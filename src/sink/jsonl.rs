use super::EventSink;
use crate::alert::Event;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes each event as one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// Append to the event log at `path`, creating it if needed.
    pub fn append<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::options()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open event log at {}", path.display()))?;

        tracing::info!("Appending events to {}", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &Event) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event).context("Failed to serialize event")?;
        self.writer
            .write_all(b"\n")
            .context("Failed to write event")?;
        // Events are rare; keep the log current for tailing
        self.writer.flush().context("Failed to flush event log")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush event log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::EventKind;
    use crate::diff::ChangeScore;
    use chrono::{TimeZone, Utc};

    #[test]
    fn writes_one_object_per_line() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let timestamp = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let score = ChangeScore {
            magnitude: 0.5,
            changed_pixels: 2,
            compared_pixels: 4,
        };

        for kind in [EventKind::Alert, EventKind::Clear] {
            sink.emit(&Event {
                kind,
                timestamp,
                score,
                frame: None,
            })
            .unwrap();
        }

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "alert");
        assert_eq!(lines[1]["kind"], "clear");
        assert_eq!(lines[0]["score"]["changed_pixels"], 2);
        assert_eq!(lines[0]["timestamp"], "2023-11-14T22:13:20Z");
        assert!(lines[0].get("frame").is_none());
    }

    #[test]
    fn append_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let mut sink = JsonLinesSink::append(&path).unwrap();
        sink.emit(&Event {
            kind: EventKind::Alert,
            timestamp: Utc::now(),
            score: ChangeScore::ZERO,
            frame: None,
        })
        .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}
