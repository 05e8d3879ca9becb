//! Status publishers for the daemon's periodic snapshot.

use spectrod_core::{StatusPublisher, StatusSnapshot};

/// Writes one JSON object per period to stdout, for supervisors that tail
/// the daemon.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPublisher;

impl StatusPublisher for JsonPublisher {
    fn publish(&self, snapshot: &StatusSnapshot) {
        let obj = serde_json::json!({
            "type": "status",
            "state": snapshot.state,
            "active": snapshot.active,
            "device_status": snapshot.device_status,
            "mode": snapshot.mode,
            "exposure_secs": snapshot.exposure_secs,
            "interval_secs": snapshot.interval_secs,
            "series_length": snapshot.series_length,
            "triggered": snapshot.triggered_count,
            "captured": snapshot.captured_count,
            "stored_today": snapshot.stored_today,
            "temperature_c": snapshot.temperature_c,
            "target_temperature_c": snapshot.target_temperature_c,
            "temperature_status": &snapshot.temperature_status,
            "log_path": &snapshot.log_path,
        });
        println!("{obj}");
    }
}
