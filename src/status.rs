use crate::alert::AlertState;
use crate::diff::ChangeScore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};

/// Point-in-time view of the monitor, as a status endpoint would serve it.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: AlertState,
    pub last_transition: Option<DateTime<Utc>>,
    pub last_score: Option<ChangeScore>,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub baseline_established_at: Option<DateTime<Utc>>,
    pub baseline_updates: u64,
    pub cycles: u64,
    pub skipped_cycles: u64,
    pub consecutive_failures: u32,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: AlertState::Idle,
            last_transition: None,
            last_score: None,
            last_frame_at: None,
            baseline_established_at: None,
            baseline_updates: 0,
            cycles: 0,
            skipped_cycles: 0,
            consecutive_failures: 0,
        }
    }
}

/// Read side of the published status.
///
/// Readers only ever get an owned copy; the monitor replaces the whole
/// snapshot at the end of each cycle.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn publish(&self, snapshot: StatusSnapshot) {
        match self.inner.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_get_copies() {
        let handle = StatusHandle::new();
        let reader = handle.clone();

        let before = reader.snapshot();
        handle.publish(StatusSnapshot {
            state: AlertState::Triggered,
            cycles: 7,
            ..StatusSnapshot::default()
        });

        assert_eq!(before.state, AlertState::Idle);
        assert_eq!(before.cycles, 0);
        let after = reader.snapshot();
        assert_eq!(after.state, AlertState::Triggered);
        assert_eq!(after.cycles, 7);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let snapshot = StatusSnapshot {
            state: AlertState::Cooldown,
            ..StatusSnapshot::default()
        };

        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["state"], "cooldown");
        assert!(json["last_score"].is_null());
    }
}
