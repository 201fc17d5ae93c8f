// Monitor: composes the latest frame with the latest results, drives alerts
// and publishes the status snapshot served by the web API.

use crate::pipeline::alert::{hazard_event, AlertManager, AlertRecord, AlertSink, Expectation};
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::slot::SharedSlot;
use crate::pipeline::types::{DetectionSet, Frame, HazardLabel, ProcessingState};
use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const MONITOR_STAGE: &str = "monitor";

/// Number of fired alerts kept in the status snapshot
pub const MAX_RECENT_ALERTS: usize = 20;

/// Receives the latest frame together with the latest result of every worker.
pub trait FrameSink: Send {
    fn present(&mut self, frame: &Frame, sets: &[Arc<DetectionSet>]) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct StageStatus {
    pub current: u64,
    pub ms_per_frame: f64,
    pub fps: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub is_active: bool,
    pub elapsed_secs: f64,
    pub frames_captured: u64,
    pub latest_frame_seq: Option<u64>,
    pub stages: BTreeMap<String, StageStatus>,
    /// "detected" while a fire or smoke box is visible, otherwise "none"
    pub detection_status: String,
    pub latest_hazard: Option<HazardLabel>,
    pub expected_hazard: Expectation,
    /// Oldest first
    pub alerts: Vec<AlertRecord>,
    pub detections: Vec<DetectionSet>,
}

pub struct Monitor {
    frames: Arc<SharedSlot<Frame>>,
    results: Vec<Arc<SharedSlot<DetectionSet>>>,
    status: Arc<SharedSlot<StatusSnapshot>>,
    state: Arc<ProcessingState>,
    alerts: AlertManager,
    alert_sinks: Vec<Box<dyn AlertSink>>,
    frame_sink: Option<Box<dyn FrameSink>>,
    recent: VecDeque<AlertRecord>,
}

impl Monitor {
    pub fn new(
        frames: Arc<SharedSlot<Frame>>,
        results: Vec<Arc<SharedSlot<DetectionSet>>>,
        status: Arc<SharedSlot<StatusSnapshot>>,
        state: Arc<ProcessingState>,
        alerts: AlertManager,
        alert_sinks: Vec<Box<dyn AlertSink>>,
        frame_sink: Option<Box<dyn FrameSink>>,
    ) -> Self {
        Self {
            frames,
            results,
            status,
            state,
            alerts,
            alert_sinks,
            frame_sink,
            recent: VecDeque::with_capacity(MAX_RECENT_ALERTS),
        }
    }

    /// Runs one compositor cycle. Returns the alert it fired, if any.
    pub fn step(&mut self, is_active: bool) -> Option<AlertRecord> {
        let frame = self.frames.get();
        let sets: Vec<Arc<DetectionSet>> = self.results.iter().filter_map(|s| s.get()).collect();

        if let (Some(sink), Some(frame)) = (self.frame_sink.as_mut(), frame.as_deref()) {
            if let Err(e) = sink.present(frame, &sets) {
                tracing::warn!("Frame sink failed on frame {}: {:#}", frame.seq, e);
            }
        }

        let hazard = hazard_event(sets.iter().map(Arc::as_ref));
        let now = self.state.elapsed();

        let mut fired = None;
        if let Some(label) = self.alerts.observe(hazard, now) {
            let record = AlertRecord {
                label,
                elapsed_secs: now.as_secs_f64(),
                timestamp: chrono::Utc::now(),
                frame_seq: frame.as_ref().map(|f| f.seq),
            };
            self.dispatch(&record, frame.as_deref());
            self.remember(record.clone());
            fired = Some(record);
        }

        let snapshot = self.snapshot(is_active, hazard, frame.as_deref(), &sets);
        self.status.put(snapshot);
        fired
    }

    /// Ticks every `refresh` until cancelled, then publishes a final inactive snapshot.
    pub fn run(mut self, cancel: CancellationToken, refresh: Duration) -> Result<()> {
        self.state.register_stage(MONITOR_STAGE);
        tracing::info!(
            "Monitor started: {} worker slots, {} alert sinks, refresh {:?}",
            self.results.len(),
            self.alert_sinks.len(),
            refresh
        );

        let ticker = crossbeam::channel::tick(refresh);
        while !cancel.is_cancelled() {
            if ticker.recv().is_err() {
                break;
            }
            let start_inst = Instant::now();
            self.step(true);
            let duration_ms = start_inst.elapsed().as_secs_f64() * 1000.0;
            self.state.update_stage(MONITOR_STAGE, duration_ms);
        }

        let frame = self.frames.get();
        let sets: Vec<Arc<DetectionSet>> = self.results.iter().filter_map(|s| s.get()).collect();
        let hazard = hazard_event(sets.iter().map(Arc::as_ref));
        let snapshot = self.snapshot(false, hazard, frame.as_deref(), &sets);
        self.status.put(snapshot);

        tracing::info!("Monitor observed cancellation");
        Ok(())
    }

    fn dispatch(&mut self, record: &AlertRecord, frame: Option<&Frame>) {
        for sink in self.alert_sinks.iter_mut() {
            if let Err(e) = sink.on_alert(record, frame) {
                tracing::error!("Alert sink failed for {} alert: {:#}", record.label, e);
            }
        }
    }

    fn remember(&mut self, record: AlertRecord) {
        if self.recent.len() == MAX_RECENT_ALERTS {
            self.recent.pop_front();
        }
        self.recent.push_back(record);
    }

    fn snapshot(
        &self,
        is_active: bool,
        hazard: Option<HazardLabel>,
        frame: Option<&Frame>,
        sets: &[Arc<DetectionSet>],
    ) -> StatusSnapshot {
        let stages = self
            .state
            .stage_snapshot()
            .into_iter()
            .map(|(name, progress)| {
                let status = StageStatus {
                    current: progress.current,
                    ms_per_frame: progress.ms_per_frame,
                    fps: progress.fps(),
                };
                (name, status)
            })
            .collect();

        StatusSnapshot {
            is_active,
            elapsed_secs: self.state.elapsed().as_secs_f64(),
            frames_captured: self
                .state
                .frames_captured
                .load(std::sync::atomic::Ordering::Relaxed),
            latest_frame_seq: frame.map(|f| f.seq),
            stages,
            detection_status: if hazard.is_some() { "detected" } else { "none" }.to_string(),
            latest_hazard: hazard,
            expected_hazard: self.alerts.expected(),
            alerts: self.recent.iter().cloned().collect(),
            detections: sets.iter().map(|s| DetectionSet::clone(s)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{BBox, ChannelOrder, DetectionBox, DetectionLabel};
    use anyhow::bail;
    use image::RgbImage;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recording {
        alerts: Arc<Mutex<Vec<(AlertRecord, Option<u64>)>>>,
    }

    impl AlertSink for Recording {
        fn on_alert(&mut self, alert: &AlertRecord, frame: Option<&Frame>) -> Result<()> {
            self.alerts
                .lock()
                .unwrap()
                .push((alert.clone(), frame.map(|f| f.seq)));
            Ok(())
        }
    }

    struct Broken;

    impl AlertSink for Broken {
        fn on_alert(&mut self, _alert: &AlertRecord, _frame: Option<&Frame>) -> Result<()> {
            bail!("disk full")
        }
    }

    #[derive(Clone, Default)]
    struct CountingFrames {
        seen: Arc<Mutex<Vec<(u64, usize)>>>,
    }

    impl FrameSink for CountingFrames {
        fn present(&mut self, frame: &Frame, sets: &[Arc<DetectionSet>]) -> Result<()> {
            self.seen.lock().unwrap().push((frame.seq, sets.len()));
            Ok(())
        }
    }

    struct Fixture {
        frames: Arc<SharedSlot<Frame>>,
        results: Vec<Arc<SharedSlot<DetectionSet>>>,
        status: Arc<SharedSlot<StatusSnapshot>>,
        state: Arc<ProcessingState>,
    }

    impl Fixture {
        fn new(workers: usize) -> Self {
            Self {
                frames: Arc::new(SharedSlot::new()),
                results: (0..workers).map(|_| Arc::new(SharedSlot::new())).collect(),
                status: Arc::new(SharedSlot::new()),
                state: Arc::new(ProcessingState::new()),
            }
        }

        fn monitor(
            &self,
            sinks: Vec<Box<dyn AlertSink>>,
            frame_sink: Option<Box<dyn FrameSink>>,
        ) -> Monitor {
            Monitor::new(
                self.frames.clone(),
                self.results.clone(),
                self.status.clone(),
                self.state.clone(),
                AlertManager::new(Duration::from_secs(45)),
                sinks,
                frame_sink,
            )
        }
    }

    fn frame(seq: u64) -> Frame {
        Frame::new(seq, RgbImage::new(8, 8), ChannelOrder::Rgb)
    }

    fn set(worker: &str, seq: u64, label: DetectionLabel, confidence: f32) -> DetectionSet {
        DetectionSet {
            worker: worker.to_string(),
            frame_seq: seq,
            detections: vec![DetectionBox::new(
                label,
                confidence,
                BBox::new(0.0, 0.0, 4.0, 4.0),
            )],
        }
    }

    #[test]
    fn test_quiet_step_publishes_status() {
        let fixture = Fixture::new(2);
        let mut monitor = fixture.monitor(Vec::new(), None);

        assert!(fixture.status.get().is_none());
        assert!(monitor.step(true).is_none());

        let status = fixture.status.get().unwrap();
        assert!(status.is_active);
        assert_eq!(status.detection_status, "none");
        assert_eq!(status.latest_hazard, None);
        assert_eq!(status.latest_frame_seq, None);
        assert!(status.detections.is_empty());
        assert!(status.alerts.is_empty());
    }

    #[test]
    fn test_fire_detection_alerts_once_and_reaches_every_sink() {
        let fixture = Fixture::new(2);
        let recording = Recording::default();
        let mut monitor = fixture.monitor(
            vec![Box::new(Broken), Box::new(recording.clone())],
            None,
        );

        fixture.frames.put(frame(7));
        fixture.results[0].put(set("person", 7, DetectionLabel::Person, 0.9));
        fixture.results[1].put(set("fire-smoke", 7, DetectionLabel::Fire, 0.6));

        let fired = monitor.step(true).unwrap();
        assert_eq!(fired.label, HazardLabel::Fire);
        assert_eq!(fired.frame_seq, Some(7));
        // Persistent fire does not alert again
        assert!(monitor.step(true).is_none());

        let received = recording.alerts.lock().unwrap().clone();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0.label, HazardLabel::Fire);
        assert_eq!(received[0].1, Some(7));

        let status = fixture.status.get().unwrap();
        assert_eq!(status.detection_status, "detected");
        assert_eq!(status.latest_hazard, Some(HazardLabel::Fire));
        assert_eq!(status.expected_hazard, Expectation::Only(HazardLabel::Smoke));
        assert_eq!(status.alerts.len(), 1);
        assert_eq!(status.detections.len(), 2);
    }

    #[test]
    fn test_frame_sink_sees_frame_and_all_sets() {
        let fixture = Fixture::new(2);
        let frames = CountingFrames::default();
        let mut monitor = fixture.monitor(Vec::new(), Some(Box::new(frames.clone())));

        // No frame yet, nothing to present
        monitor.step(true);
        fixture.frames.put(frame(3));
        fixture.results[1].put(set("fire-smoke", 2, DetectionLabel::Smoke, 0.7));
        monitor.step(true);

        assert_eq!(*frames.seen.lock().unwrap(), vec![(3, 1)]);
    }

    #[test]
    fn test_recent_alerts_are_bounded() {
        let fixture = Fixture::new(0);
        let mut monitor = fixture.monitor(Vec::new(), None);
        for i in 0..(MAX_RECENT_ALERTS as u64 + 5) {
            monitor.remember(AlertRecord {
                label: HazardLabel::Smoke,
                elapsed_secs: i as f64,
                timestamp: chrono::Utc::now(),
                frame_seq: Some(i),
            });
        }
        monitor.step(true);

        let status = fixture.status.get().unwrap();
        assert_eq!(status.alerts.len(), MAX_RECENT_ALERTS);
        assert_eq!(status.alerts[0].frame_seq, Some(5));
    }

    #[test]
    fn test_run_stops_on_cancel_with_inactive_snapshot() {
        let fixture = Fixture::new(1);
        let recording = Recording::default();
        let monitor = fixture.monitor(vec![Box::new(recording.clone())], None);
        let cancel = CancellationToken::new();

        fixture.frames.put(frame(1));
        fixture.results[0].put(set("fire-smoke", 1, DetectionLabel::Smoke, 0.8));

        let handle = {
            let cancel = cancel.clone();
            std::thread::spawn(move || monitor.run(cancel, Duration::from_millis(2)))
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while recording.alerts.lock().unwrap().is_empty() {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(1));
        }
        cancel.cancel();
        handle.join().unwrap().unwrap();

        let status = fixture.status.get().unwrap();
        assert!(!status.is_active);
        assert_eq!(status.alerts.len(), 1);
        assert!(status.stages.contains_key(MONITOR_STAGE));
    }
}
