// Alert artifacts: the alerting frame as a JPEG plus a running CSV ledger

use crate::pipeline::alert::{AlertRecord, AlertSink};
use crate::pipeline::types::Frame;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

pub const LEDGER_FILE: &str = "alerts.csv";

#[derive(Serialize)]
struct LedgerRow<'a> {
    sequence: u64,
    label: &'a str,
    elapsed_secs: f64,
    timestamp: String,
}

/// Saves a snapshot for every alert into `output_dir`.
pub struct SnapshotAlertSink {
    output_dir: PathBuf,
    sequence: u64,
}

impl SnapshotAlertSink {
    pub fn new(output_dir: &Path) -> Result<Self> {
        fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create snapshot directory at: '{}'", output_dir.display())
        })?;
        tracing::info!("Alert snapshots will be written to {:?}", output_dir);

        // Sequence numbers continue across restarts
        let sequence = ledger_rows(&output_dir.join(LEDGER_FILE))?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            sequence,
        })
    }

    /// `<label>_<YYYYmmdd_HHMMSS>.jpg`
    pub fn snapshot_name(alert: &AlertRecord) -> String {
        format!(
            "{}_{}.jpg",
            alert.label.as_str(),
            alert.timestamp.format("%Y%m%d_%H%M%S")
        )
    }

    fn append_ledger(&self, alert: &AlertRecord) -> Result<()> {
        let path = self.output_dir.join(LEDGER_FILE);
        let is_new = !path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open alert ledger at: '{}'", path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer.serialize(LedgerRow {
            sequence: self.sequence,
            label: alert.label.as_str(),
            elapsed_secs: alert.elapsed_secs,
            timestamp: alert.timestamp.to_rfc3339(),
        })?;
        writer.flush()?;
        Ok(())
    }
}

fn ledger_rows(path: &Path) -> Result<u64> {
    if !path.exists() {
        return Ok(0);
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to read alert ledger at: '{}'", path.display()))?;
    Ok(reader.records().count() as u64)
}

impl AlertSink for SnapshotAlertSink {
    fn on_alert(&mut self, alert: &AlertRecord, frame: Option<&Frame>) -> Result<()> {
        self.sequence += 1;

        match frame {
            Some(frame) => {
                let path = self.output_dir.join(Self::snapshot_name(alert));
                frame
                    .to_rgb()
                    .save(&path)
                    .with_context(|| format!("Failed to save snapshot at: '{}'", path.display()))?;
                tracing::info!("Saved {} snapshot to {:?}", alert.label, path);
            }
            None => tracing::warn!("{} alert without a frame, no snapshot saved", alert.label),
        }

        self.append_ledger(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{ChannelOrder, HazardLabel};
    use chrono::{TimeZone, Utc};
    use image::{Rgb, RgbImage};

    fn alert(label: HazardLabel, secs: u32) -> AlertRecord {
        AlertRecord {
            label,
            elapsed_secs: secs as f64,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 13, 2, secs).unwrap(),
            frame_seq: Some(secs as u64),
        }
    }

    #[test]
    fn test_creates_directory_and_names_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("alerts");
        let mut sink = SnapshotAlertSink::new(&out).unwrap();
        assert!(out.is_dir());

        let frame = Frame::new(
            1,
            RgbImage::from_pixel(16, 8, Rgb([0, 0, 200])),
            ChannelOrder::Bgr,
        );
        sink.on_alert(&alert(HazardLabel::Fire, 5), Some(&frame))
            .unwrap();

        let saved = out.join("fire_20240501_130205.jpg");
        assert!(saved.is_file());
        let decoded = image::open(&saved).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (16, 8));
        // Saved in RGB order; the last BGR byte is red
        let px = decoded.get_pixel(8, 4).0;
        assert!(px[0] > 150 && px[2] < 50, "unexpected pixel {:?}", px);
    }

    #[test]
    fn test_ledger_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SnapshotAlertSink::new(dir.path()).unwrap();
        sink.on_alert(&alert(HazardLabel::Fire, 1), None).unwrap();
        sink.on_alert(&alert(HazardLabel::Smoke, 50), None).unwrap();

        // A restarted sink keeps appending to the same ledger
        let mut restarted = SnapshotAlertSink::new(dir.path()).unwrap();
        restarted
            .on_alert(&alert(HazardLabel::Fire, 59), None)
            .unwrap();

        let ledger = fs::read_to_string(dir.path().join(LEDGER_FILE)).unwrap();
        let lines: Vec<&str> = ledger.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "sequence,label,elapsed_secs,timestamp");
        assert!(lines[1].starts_with("1,fire,1.0,2024-05-01T13:02:01"));
        assert!(lines[2].starts_with("2,smoke,50.0,"));
        assert!(lines[3].starts_with("3,fire,59.0,"));
    }
}
