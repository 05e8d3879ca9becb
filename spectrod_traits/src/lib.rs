pub mod cancel;
pub mod clock;

pub use cancel::CancelToken;
pub use clock::{Clock, MonotonicClock};

use std::path::Path;

/// Result type for hardware-facing calls. Concrete adapters define their own
/// error enums; the core maps them back to typed errors by downcasting.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Outcome of a blocking wait for the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A frame finished and can be read with `read_frame`.
    FrameReady,
    /// The wait was cancelled via the `CancelToken`; no frame is available.
    Cancelled,
}

/// Effective acquisition timings as reported by the device after it has
/// reconciled the requested exposure with readout constraints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timings {
    pub exposure_secs: f64,
    pub cycle_secs: f64,
    pub readout_secs: f64,
}

/// Current and target sensor temperatures in degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureReading {
    pub current_c: f64,
    pub target_c: f64,
}

/// Cooling-loop status as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureStatus {
    #[default]
    Off,
    NotStabilized,
    Stabilized,
    NotReached,
    OutOfRange,
    Drift,
}

impl std::fmt::Display for TemperatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Off => "Temperature off",
            Self::NotStabilized => "Temperature not stabilized",
            Self::Stabilized => "Temperature stabilized",
            Self::NotReached => "Temperature not reached",
            Self::OutOfRange => "Temperature out of range",
            Self::Drift => "Temperature drift detected",
        };
        f.write_str(s)
    }
}

/// Coarse device state for status publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorStatus {
    #[default]
    Idle,
    Acquiring,
    Accumulating,
    Fault,
}

impl DetectorStatus {
    /// Numeric code published to external observers.
    pub fn as_code(self) -> u32 {
        match self {
            Self::Idle => 0,
            Self::Acquiring => 1,
            Self::Accumulating => 2,
            Self::Fault => 3,
        }
    }
}

/// The narrow detector capability every component depends on.
///
/// Methods take `&self`: a concrete adapter wraps a vendor SDK (or a
/// simulation) and provides its own interior synchronization, the way vendor
/// driver libraries do. Callers serialize hardware access through the
/// session's config lock; `wait_for_frame` is the one call allowed to block
/// outside it and must honor the cancel token promptly.
pub trait Detector: Send + Sync {
    fn initialize(&self, driver_path: &Path) -> HwResult<()>;
    fn shutdown(&self) -> HwResult<()>;

    /// Sensor dimensions in pixels (width, height). Fixed after `initialize`.
    fn detector_size(&self) -> HwResult<(u32, u32)>;

    fn set_exposure_secs(&self, secs: f64) -> HwResult<()>;
    fn set_acquisition_mode(&self, mode: u32) -> HwResult<()>;
    fn set_read_mode(&self, mode: u32) -> HwResult<()>;
    fn set_shutter(&self, shutter_type: u32, shutter_mode: u32) -> HwResult<()>;
    fn set_accumulation_count(&self, count: u32) -> HwResult<()>;
    fn set_series_length(&self, length: u32) -> HwResult<()>;
    fn set_kinetic_cycle_secs(&self, secs: f64) -> HwResult<()>;
    fn set_target_temperature(&self, celsius: i32) -> HwResult<()>;
    fn set_cooler(&self, on: bool) -> HwResult<()>;

    fn start_acquisition(&self) -> HwResult<()>;
    /// Abort any in-progress acquisition. Must succeed when nothing is
    /// running; only genuine device failures are errors.
    fn abort_acquisition(&self) -> HwResult<()>;

    /// Block until the next frame is ready or the token is cancelled.
    fn wait_for_frame(&self, cancel: &CancelToken) -> HwResult<WaitOutcome>;
    /// Read the most recent completed frame (one sample per pixel column).
    fn read_frame(&self) -> HwResult<Vec<i32>>;
    fn acquisition_timings(&self) -> HwResult<Timings>;

    fn status(&self) -> HwResult<DetectorStatus>;
    fn temperatures(&self) -> HwResult<TemperatureReading>;
    fn temperature_status(&self) -> HwResult<TemperatureStatus>;
}
