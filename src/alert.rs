use crate::diff::ChangeScore;
use crate::frame::Frame;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Where the alert machine currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    /// No anomaly, ready to trigger
    Idle,
    /// Anomaly currently reported
    Triggered,
    /// Anomaly cleared, waiting out the suppression window
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Alert,
    Clear,
}

/// Emitted once per Alert or Clear transition.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub score: ChangeScore,
    /// Frame that caused the transition, kept as evidence
    #[serde(skip)]
    pub frame: Option<Frame>,
}

impl Event {
    pub fn with_evidence(mut self, frame: Frame) -> Self {
        self.frame = Some(frame);
        self
    }
}

/// Turns a stream of change scores into Alert/Clear events.
///
/// Two thresholds give hysteresis: a score must reach `high` to trigger,
/// and the alert only clears once the score drops below `low`. After a
/// clear the machine sits in `Cooldown` until `cooldown` has passed
/// (measured on frame timestamps); a high score during cooldown
/// re-triggers immediately with a fresh Alert.
#[derive(Debug)]
pub struct AlertMachine {
    state: AlertState,
    high_threshold: f64,
    low_threshold: f64,
    cooldown: Duration,
    cooldown_since: Option<DateTime<Utc>>,
    last_transition: Option<DateTime<Utc>>,
}

impl AlertMachine {
    pub fn new(high_threshold: f64, low_threshold: f64, cooldown: Duration) -> Self {
        Self {
            state: AlertState::Idle,
            high_threshold,
            low_threshold,
            cooldown,
            cooldown_since: None,
            last_transition: None,
        }
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn last_transition(&self) -> Option<DateTime<Utc>> {
        self.last_transition
    }

    pub fn update(&mut self, score: &ChangeScore, at: DateTime<Utc>) -> Option<Event> {
        let magnitude = score.magnitude;

        let (next, kind) = match self.state {
            AlertState::Idle if magnitude >= self.high_threshold => {
                (AlertState::Triggered, Some(EventKind::Alert))
            }
            AlertState::Idle => (AlertState::Idle, None),
            AlertState::Triggered if magnitude < self.low_threshold => {
                (AlertState::Cooldown, Some(EventKind::Clear))
            }
            AlertState::Triggered => (AlertState::Triggered, None),
            AlertState::Cooldown if magnitude >= self.high_threshold => {
                (AlertState::Triggered, Some(EventKind::Alert))
            }
            AlertState::Cooldown if self.cooldown_elapsed(at) => (AlertState::Idle, None),
            AlertState::Cooldown => (AlertState::Cooldown, None),
        };

        if next != self.state {
            tracing::debug!(
                "Alert state {:?} -> {:?} (score={:.4})",
                self.state,
                next,
                magnitude
            );
            self.state = next;
            self.last_transition = Some(at);
            self.cooldown_since = (next == AlertState::Cooldown).then_some(at);
        }

        kind.map(|kind| Event {
            kind,
            timestamp: at,
            score: *score,
            frame: None,
        })
    }

    fn cooldown_elapsed(&self, at: DateTime<Utc>) -> bool {
        let Some(since) = self.cooldown_since else {
            return true;
        };
        (at - since)
            .to_std()
            .map_or(false, |elapsed| elapsed >= self.cooldown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tick(n: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(n, 0).unwrap()
    }

    fn score(magnitude: f64) -> ChangeScore {
        ChangeScore {
            magnitude,
            ..ChangeScore::ZERO
        }
    }

    fn machine() -> AlertMachine {
        AlertMachine::new(0.8, 0.2, Duration::from_secs(2))
    }

    /// Feeds scores at ticks 1, 2, 3... and records (tick, event, state after).
    fn run(
        machine: &mut AlertMachine,
        scores: &[f64],
    ) -> Vec<(i64, Option<EventKind>, AlertState)> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let t = i as i64 + 1;
                let event = machine.update(&score(s), tick(t));
                (t, event.map(|e| e.kind), machine.state())
            })
            .collect()
    }

    #[test]
    fn alert_clear_then_idle_after_cooldown() {
        let mut machine = machine();
        let trace = run(&mut machine, &[0.0, 0.9, 0.9, 0.05, 0.0, 0.0, 0.0]);

        let events: Vec<_> = trace
            .iter()
            .filter_map(|(t, kind, _)| kind.map(|k| (*t, k)))
            .collect();
        assert_eq!(events, vec![(2, EventKind::Alert), (4, EventKind::Clear)]);

        assert_eq!(trace[3].2, AlertState::Cooldown);
        assert_eq!(trace[4].2, AlertState::Cooldown);
        assert_eq!(trace[5].2, AlertState::Idle);
        assert_eq!(machine.last_transition(), Some(tick(6)));
    }

    #[test]
    fn retrigger_during_cooldown_emits_fresh_alert() {
        let mut machine = machine();
        let trace = run(&mut machine, &[0.9, 0.1, 0.9]);

        let kinds: Vec<_> = trace.iter().filter_map(|(_, kind, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Alert, EventKind::Clear, EventKind::Alert]
        );
        assert_eq!(machine.state(), AlertState::Triggered);
    }

    #[test]
    fn hysteresis_holds_trigger_between_thresholds() {
        let mut machine = machine();
        let trace = run(&mut machine, &[0.9, 0.5, 0.3, 0.2, 0.7]);

        assert!(trace[1..].iter().all(|(_, kind, _)| kind.is_none()));
        assert_eq!(machine.state(), AlertState::Triggered);
    }

    #[test]
    fn score_between_thresholds_does_not_trigger_from_idle() {
        let mut machine = machine();
        let trace = run(&mut machine, &[0.5, 0.79, 0.3]);

        assert!(trace
            .iter()
            .all(|(_, kind, state)| kind.is_none() && *state == AlertState::Idle));
        assert_eq!(machine.last_transition(), None);
    }

    #[test]
    fn moderate_score_in_cooldown_does_not_retrigger() {
        let mut machine = machine();
        let trace = run(&mut machine, &[0.9, 0.1, 0.5, 0.5]);

        assert_eq!(trace[2].2, AlertState::Cooldown);
        assert!(trace[2].1.is_none());
        // Cooldown started at tick 2, two ticks have passed by tick 4
        assert_eq!(trace[3].2, AlertState::Idle);
    }

    #[test]
    fn constant_input_never_flaps() {
        let mut machine = machine();
        let scores = vec![0.9; 50];
        let trace = run(&mut machine, &scores);

        let events = trace.iter().filter(|(_, kind, _)| kind.is_some()).count();
        assert_eq!(events, 1);
    }

    #[test]
    fn event_carries_score_and_evidence() {
        let mut machine = machine();
        let event = machine.update(&score(0.95), tick(1)).unwrap();
        let frame = Frame::new(tick(1), image::GrayImage::new(2, 2));

        let event = event.with_evidence(frame);

        assert_eq!(event.kind, EventKind::Alert);
        assert_eq!(event.score.magnitude, 0.95);
        assert!(event.frame.is_some());
    }
}
