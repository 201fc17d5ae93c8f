use crate::pipeline::types::{DetectionSet, Frame, HazardLabel};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Default minimum time between two alerts
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(45);

/// Which hazard the gate will accept next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Expectation {
    Any,
    Only(HazardLabel),
}

/// Cooldown plus alternation gate over a stream of classification events.
///
/// An event fires when it matches the expected label and the cooldown has elapsed.
/// After firing, only the *other* hazard is accepted, so a persistent single hazard
/// alerts once and then stays quiet until the opposite hazard has alerted.
#[derive(Debug, Clone)]
pub struct AlertManager {
    cooldown: Duration,
    last_alert: Option<Duration>,
    expected: Expectation,
}

impl AlertManager {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_alert: None,
            expected: Expectation::Any,
        }
    }

    pub fn expected(&self) -> Expectation {
        self.expected
    }

    /// Feed one event observed at `now` (time since pipeline start).
    /// Returns the label when an alert fires.
    pub fn observe(&mut self, label: Option<HazardLabel>, now: Duration) -> Option<HazardLabel> {
        let label = label?;

        let accepted = match self.expected {
            Expectation::Any => true,
            Expectation::Only(expected) => expected == label,
        };
        // Never alerted counts as infinitely long ago
        let cooled_down = match self.last_alert {
            None => true,
            Some(last) => now.saturating_sub(last) > self.cooldown,
        };

        if accepted && cooled_down {
            self.last_alert = Some(now);
            self.expected = Expectation::Only(label.other());
            Some(label)
        } else {
            None
        }
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

/// Label of the most confident hazard box across all sets, if there is one.
pub fn hazard_event<'a, I>(sets: I) -> Option<HazardLabel>
where
    I: IntoIterator<Item = &'a DetectionSet>,
{
    let mut best: Option<(HazardLabel, f32)> = None;
    for d in sets.into_iter().flat_map(|s| s.detections.iter()) {
        if let Some(hazard) = d.label.hazard() {
            match best {
                Some((_, conf)) if conf >= d.confidence => {}
                _ => best = Some((hazard, d.confidence)),
            }
        }
    }
    best.map(|(label, _)| label)
}

/// A fired alert as delivered to sinks
#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    pub label: HazardLabel,
    pub elapsed_secs: f64,
    pub timestamp: DateTime<Utc>,
    pub frame_seq: Option<u64>,
}

/// Receives alerts synchronously on the monitor thread.
pub trait AlertSink: Send {
    fn on_alert(&mut self, alert: &AlertRecord, frame: Option<&Frame>) -> Result<()>;
}

/// Reports alerts through the log
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn on_alert(&mut self, alert: &AlertRecord, _frame: Option<&Frame>) -> Result<()> {
        tracing::warn!(
            "{} detected at {} (t+{:.1}s)",
            alert.label,
            alert.timestamp.to_rfc3339(),
            alert.elapsed_secs
        );
        Ok(())
    }
}
