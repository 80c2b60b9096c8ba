//! Headless image change monitor.
//!
//! Frames are pulled from a [`FrameSource`], normalized to a small luma
//! image, compared against a baseline and fed through a hysteresis alert
//! machine. Alert and Clear events go to an [`EventSink`].
//!
//! ```text
//! FrameSource ─▶ Normalizer ─▶ Differencer ─▶ AlertMachine ─▶ EventSink
//!                                   ▲               │
//!                                   └─ Baseline ◀───┘ (settle policy)
//! ```

pub mod alert;
pub mod baseline;
pub mod capture;
pub mod config;
pub mod diff;
pub mod error;
pub mod frame;
pub mod monitor;
pub mod normalize;
pub mod persist;
pub mod sink;
pub mod status;

pub use alert::{AlertMachine, AlertState, Event, EventKind};
pub use baseline::{Baseline, BaselineManager};
pub use capture::{Acquired, FrameSource};
pub use config::MonitorConfig;
pub use diff::{ChangeScore, Differencer};
pub use error::{MonitorError, Result};
pub use frame::{Frame, RawFrame, RawImage};
pub use monitor::{CycleOutcome, Monitor, Shutdown};
pub use normalize::Normalizer;
pub use persist::BaselineStore;
pub use sink::EventSink;
pub use status::{StatusHandle, StatusSnapshot};
