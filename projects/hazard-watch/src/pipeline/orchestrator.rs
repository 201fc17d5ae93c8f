// Pipeline orchestrator: owns the shared slots and the worker threads
//
// Capture, one thread per detector and the monitor run independently and only
// meet through latest-wins slots. Shutdown is cooperative via cancellation
// tokens; capture has its own token, cancelled only once every other unit has
// been joined, so the device outlives every reader.

use crate::pipeline::alert::{AlertManager, AlertSink};
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::detection_worker::{inference_worker, panic_message, FrameDetector};
use crate::pipeline::monitor::{FrameSink, Monitor, StatusSnapshot};
use crate::pipeline::reader::capture_worker;
use crate::pipeline::slot::SharedSlot;
use crate::pipeline::types::{DetectionSet, Frame, ProcessingState};
use crate::video::FrameSource;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Timing knobs for the worker threads
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Publish every n-th captured frame (1 = all)
    pub frame_skip: u32,
    /// Sleep for a worker that finds no frame yet
    pub idle_interval_ms: u64,
    /// Monitor tick period
    pub refresh_interval_ms: u64,
    /// Back-off after a failed or empty read
    pub retry_interval_ms: u64,
    pub alert_cooldown_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_skip: 1,
            idle_interval_ms: 5,
            refresh_interval_ms: 33,
            retry_interval_ms: 100,
            alert_cooldown_secs: crate::pipeline::alert::DEFAULT_COOLDOWN.as_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }
}

type UnitHandle = (String, JoinHandle<Result<()>>);

/// A running capture → inference → monitor pipeline.
///
/// The frame and result slots live in the threads that share them; the pipeline keeps
/// the status slot for readers outside. Dropping it without calling `shutdown` still
/// cancels and joins every thread.
pub struct Pipeline {
    status: Arc<SharedSlot<StatusSnapshot>>,
    state: Arc<ProcessingState>,
    cancel: CancellationToken,
    capture_cancel: CancellationToken,
    workers: Vec<UnitHandle>,
    monitor: Option<UnitHandle>,
    capture: Option<UnitHandle>,
}

impl Pipeline {
    /// Spawns all units. The source must already be open.
    pub fn start(
        source: Box<dyn FrameSource>,
        detectors: Vec<Box<dyn FrameDetector>>,
        alert_sinks: Vec<Box<dyn AlertSink>>,
        frame_sink: Option<Box<dyn FrameSink>>,
        config: PipelineConfig,
    ) -> Result<Self> {
        if detectors.is_empty() {
            bail!("Pipeline needs at least one detector");
        }
        let mut names = HashSet::new();
        for detector in &detectors {
            if !names.insert(detector.name().to_string()) {
                bail!("Duplicate detector name: {}", detector.name());
            }
        }

        let frames: Arc<SharedSlot<Frame>> = Arc::new(SharedSlot::new());
        let results: Vec<Arc<SharedSlot<DetectionSet>>> =
            detectors.iter().map(|_| Arc::new(SharedSlot::new())).collect();

        let mut pipeline = Self {
            status: Arc::new(SharedSlot::new()),
            state: Arc::new(ProcessingState::new()),
            cancel: CancellationToken::new(),
            capture_cancel: CancellationToken::new(),
            workers: Vec::with_capacity(detectors.len()),
            monitor: None,
            capture: None,
        };

        tracing::info!(
            "Starting pipeline: source={}, detectors={}, frame_skip={}",
            source.describe(),
            detectors.len(),
            config.frame_skip
        );

        // Spawn 1: Inference workers
        for (detector, results) in detectors.into_iter().zip(results.clone()) {
            let name = detector.name().to_string();
            let frames = frames.clone();
            let state = pipeline.state.clone();
            let cancel = pipeline.cancel.clone();
            let idle = config.idle_interval();
            let handle = spawn_unit(&format!("infer-{}", name), move || {
                inference_worker(detector, frames, results, state, cancel, idle)
            })?;
            pipeline.workers.push((name, handle));
        }

        // Spawn 2: Monitor
        let monitor = Monitor::new(
            frames.clone(),
            results,
            pipeline.status.clone(),
            pipeline.state.clone(),
            AlertManager::new(config.alert_cooldown()),
            alert_sinks,
            frame_sink,
        );
        let cancel = pipeline.cancel.clone();
        let refresh = config.refresh_interval();
        let handle = spawn_unit("monitor", move || monitor.run(cancel, refresh))?;
        pipeline.monitor = Some(("monitor".to_string(), handle));

        // Spawn 3: Capture
        let state = pipeline.state.clone();
        let cancel = pipeline.capture_cancel.clone();
        let (frame_skip, retry) = (config.frame_skip, config.retry_interval());
        let handle = spawn_unit("capture", move || {
            capture_worker(source, frames, state, cancel, frame_skip, retry)
        })?;
        pipeline.capture = Some(("capture".to_string(), handle));

        Ok(pipeline)
    }

    pub fn status_slot(&self) -> Arc<SharedSlot<StatusSnapshot>> {
        self.status.clone()
    }

    pub fn state(&self) -> Arc<ProcessingState> {
        self.state.clone()
    }

    /// Cancels every unit and waits for all of them: workers, then monitor, then capture.
    /// Capture keeps reading until the others have exited.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.workers.is_empty() && self.monitor.is_none() && self.capture.is_none() {
            return;
        }
        tracing::info!("Stopping pipeline");
        self.cancel.cancel();

        for unit in self.workers.drain(..) {
            join_unit(unit);
        }
        if let Some(unit) = self.monitor.take() {
            join_unit(unit);
        }
        self.capture_cancel.cancel();
        if let Some(unit) = self.capture.take() {
            join_unit(unit);
        }
        tracing::info!("Pipeline stopped");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_unit<F>(name: &str, body: F) -> Result<JoinHandle<Result<()>>>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .with_context(|| format!("Failed to spawn {} thread", name))
}

fn join_unit((name, handle): UnitHandle) {
    match handle.join() {
        Ok(Ok(())) => tracing::info!("{} finished gracefully", name),
        Ok(Err(e)) => tracing::error!("{} failed: {:#}", name, e),
        Err(payload) => tracing::error!("{} panicked: {}", name, panic_message(&*payload)),
    }
}
