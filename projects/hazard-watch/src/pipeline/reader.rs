// Capture worker: pulls frames from the source and publishes the latest one

use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::slot::SharedSlot;
use crate::pipeline::types::{Frame, ProcessingState};
use crate::video::FrameSource;
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const CAPTURE_STAGE: &str = "capture";

/// Reads frames until cancelled, overwriting the frame slot with every `frame_skip`-th one.
///
/// Never waits on consumers. A missing frame or a read error is logged and retried after
/// `retry_interval`. The source is dropped (device released) when this returns.
pub fn capture_worker(
    mut source: Box<dyn FrameSource>,
    frames: Arc<SharedSlot<Frame>>,
    state: Arc<ProcessingState>,
    cancel: CancellationToken,
    frame_skip: u32,
    retry_interval: Duration,
) -> Result<()> {
    let frame_skip = u64::from(frame_skip.max(1));
    let description = source.describe();
    state.register_stage(CAPTURE_STAGE);
    tracing::info!("Capture worker started on {}", description);

    let mut read_count = 0u64;
    let mut consecutive_misses = 0u64;

    while !cancel.is_cancelled() {
        let start_inst = Instant::now();

        let raw = match source.read_frame() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                report_miss(&description, &mut consecutive_misses, None);
                std::thread::sleep(retry_interval);
                continue;
            }
            Err(e) => {
                report_miss(&description, &mut consecutive_misses, Some(&e));
                std::thread::sleep(retry_interval);
                continue;
            }
        };

        if consecutive_misses > 0 {
            tracing::info!(
                "Capture on {} recovered after {} missed reads",
                description,
                consecutive_misses
            );
            consecutive_misses = 0;
        }

        read_count += 1;
        if read_count % frame_skip != 0 {
            continue;
        }

        let seq = state.record_capture();
        frames.put(Frame::new(seq, raw.image, raw.order));

        let duration_ms = start_inst.elapsed().as_secs_f64() * 1000.0;
        state.update_stage(CAPTURE_STAGE, duration_ms);
    }

    tracing::info!("Capture worker on {} observed cancellation", description);
    Ok(())
}

fn report_miss(description: &str, consecutive_misses: &mut u64, error: Option<&anyhow::Error>) {
    *consecutive_misses += 1;
    let first = *consecutive_misses == 1;
    match (error, first) {
        (Some(e), true) => tracing::warn!("Failed to read frame from {}: {:#}", description, e),
        (None, true) => tracing::warn!("No frame available from {}, retrying", description),
        (Some(e), false) => tracing::debug!("Read from {} still failing: {:#}", description, e),
        (None, false) => tracing::debug!("Still no frame from {}", description),
    }
}
