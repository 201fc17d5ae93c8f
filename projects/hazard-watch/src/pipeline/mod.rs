// Hazard detection pipeline: capture, inference workers, monitor

pub mod alert;
pub mod cancel;
pub mod detection_worker;
pub mod geometry;
pub mod merge;
pub mod monitor;
pub mod orchestrator;
pub mod reader;
pub mod slicing;
pub mod slot;
pub mod types;
