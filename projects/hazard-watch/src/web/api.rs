use crate::pipeline::alert::{AlertRecord, Expectation};
use crate::pipeline::monitor::{StageStatus, StatusSnapshot};
use crate::pipeline::slot::SharedSlot;
use crate::pipeline::types::{DetectionSet, HazardLabel};
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Handlers only ever read the slot the monitor publishes into
pub type StatusSlot = Arc<SharedSlot<StatusSnapshot>>;

#[derive(Serialize)]
pub struct StatusResponse {
    pub is_active: bool,
    pub elapsed_secs: f64,
    pub frames_captured: u64,
    pub latest_frame_seq: Option<u64>,
    pub stages: BTreeMap<String, StageStatus>,
    pub detection_status: String,
    pub latest_hazard: Option<HazardLabel>,
    pub expected_hazard: Expectation,
    pub alerts: Vec<AlertRecord>,
}

pub async fn get_status(
    State(status): State<StatusSlot>,
) -> Result<Json<StatusResponse>, StatusCode> {
    let snapshot = status.get().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(StatusResponse {
        is_active: snapshot.is_active,
        elapsed_secs: snapshot.elapsed_secs,
        frames_captured: snapshot.frames_captured,
        latest_frame_seq: snapshot.latest_frame_seq,
        stages: snapshot.stages.clone(),
        detection_status: snapshot.detection_status.clone(),
        latest_hazard: snapshot.latest_hazard,
        expected_hazard: snapshot.expected_hazard,
        alerts: snapshot.alerts.clone(),
    }))
}

pub async fn get_detections(
    State(status): State<StatusSlot>,
) -> Result<Json<Vec<DetectionSet>>, StatusCode> {
    let snapshot = status.get().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(snapshot.detections.clone()))
}
