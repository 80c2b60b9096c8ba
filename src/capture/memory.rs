use super::{Acquired, FrameSource};
use crate::frame::RawFrame;
use anyhow::Result;
use std::collections::VecDeque;

/// Replays a scripted sequence of acquisitions, then ends the stream.
///
/// Useful for replaying recorded frames and for driving the monitor in tests.
#[derive(Default)]
pub struct MemorySource {
    queue: VecDeque<Result<RawFrame>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&mut self, frame: RawFrame) {
        self.queue.push_back(Ok(frame));
    }

    pub fn push_error(&mut self, err: anyhow::Error) {
        self.queue.push_back(Err(err));
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl FromIterator<RawFrame> for MemorySource {
    fn from_iter<I: IntoIterator<Item = RawFrame>>(iter: I) -> Self {
        Self {
            queue: iter.into_iter().map(Ok).collect(),
        }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Acquired> {
        match self.queue.pop_front() {
            Some(Ok(frame)) => Ok(Acquired::Frame(frame)),
            Some(Err(err)) => Err(err),
            None => Ok(Acquired::EndOfStream),
        }
    }

    fn describe(&self) -> String {
        format!("memory ({} queued)", self.queue.len())
    }
}
