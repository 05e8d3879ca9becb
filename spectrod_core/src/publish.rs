//! Status publishing.
//!
//! The controller produces a flat snapshot once per publish period; how it
//! leaves the process (log line, JSON on stdout, message bus) is the
//! publisher's business.

/// One published status frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub state: &'static str,
    pub active: bool,
    /// Numeric device status code, `DetectorStatus::as_code`.
    pub device_status: u32,
    /// Raw device acquisition mode code.
    pub mode: u32,
    pub exposure_secs: f64,
    pub interval_secs: f64,
    pub series_length: u32,
    pub triggered_count: u64,
    pub captured_count: u64,
    /// Records in today's data file.
    pub stored_today: u64,
    /// `None` until the first temperature poll completes.
    pub temperature_c: Option<f64>,
    pub target_temperature_c: i32,
    pub temperature_status: String,
    /// Today's data file.
    pub log_path: String,
}

pub trait StatusPublisher: Send {
    fn publish(&self, snapshot: &StatusSnapshot);
}

/// Default publisher: one structured log line per period.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

impl StatusPublisher for LogPublisher {
    fn publish(&self, snapshot: &StatusSnapshot) {
        tracing::info!(
            state = snapshot.state,
            device_status = snapshot.device_status,
            mode = snapshot.mode,
            exposure_secs = snapshot.exposure_secs,
            triggered = snapshot.triggered_count,
            captured = snapshot.captured_count,
            stored_today = snapshot.stored_today,
            temperature_c = snapshot.temperature_c,
            temperature = %snapshot.temperature_status,
            "status"
        );
    }
}
