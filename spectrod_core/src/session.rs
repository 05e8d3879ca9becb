//! Session parameters and controller state shared across threads.
//!
//! One mutex guards the whole of [`SessionShared`]; this is the config lock.
//! The data file has its own lock inside `DataSink` and the two are only ever
//! taken in config-then-file order.

use spectrod_traits::{TemperatureReading, TemperatureStatus};

/// Device acquisition modes, matching the raw codes the driver accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionMode {
    #[default]
    SingleScan,
    Accumulate,
    Kinetics,
    FastKinetics,
    RunTillAbort,
}

impl AcquisitionMode {
    /// Raw code 1..=5. Code 0 means "keep the current mode" at the call sites
    /// that accept it and is not a mode of its own.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::SingleScan),
            2 => Some(Self::Accumulate),
            3 => Some(Self::Kinetics),
            4 => Some(Self::FastKinetics),
            5 => Some(Self::RunTillAbort),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            Self::SingleScan => 1,
            Self::Accumulate => 2,
            Self::Kinetics => 3,
            Self::FastKinetics => 4,
            Self::RunTillAbort => 5,
        }
    }

    /// Number of spectra one started run is expected to store, `None` for
    /// open-ended modes.
    pub fn expected_frames(self, series_length: u32) -> Option<u32> {
        match self {
            Self::SingleScan | Self::Accumulate => Some(1),
            Self::Kinetics | Self::FastKinetics => Some(series_length),
            Self::RunTillAbort => None,
        }
    }
}

/// Session parameters applied to the device on activation and adjusted by the
/// set-commands while active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub exposure_secs: f64,
    pub interval_secs: f64,
    pub mode: AcquisitionMode,
    pub read_mode: u32,
    pub shutter_type: u32,
    pub shutter_mode: u32,
    pub series_length: u32,
    pub accumulation_count: u32,
    pub target_temperature_c: i32,
    pub target_intensity: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            exposure_secs: 0.01,
            interval_secs: 1.0,
            mode: AcquisitionMode::SingleScan,
            // Full vertical binning, TTL-high fully-auto shutter.
            read_mode: 0,
            shutter_type: 1,
            shutter_mode: 0,
            series_length: 5,
            accumulation_count: 1,
            target_temperature_c: -60,
            target_intensity: 30_000,
        }
    }
}

impl SessionConfig {
    pub fn from_defaults(d: &spectrod_config::DefaultsCfg) -> Self {
        Self {
            exposure_secs: d.exposure_secs,
            interval_secs: d.interval_secs,
            // Validated at config load; fall back to single scan if bypassed.
            mode: AcquisitionMode::from_raw(d.acquisition_mode).unwrap_or_default(),
            series_length: d.series_length,
            accumulation_count: d.accumulation_count,
            target_temperature_c: d.target_temperature_c,
            target_intensity: d.target_intensity,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivePhase {
    Idle,
    Capturing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    #[default]
    Inactive,
    Activating,
    Active(ActivePhase),
    Deactivating,
    Resetting,
    Error,
}

impl ControllerState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active(_))
    }

    pub fn is_capturing(self) -> bool {
        matches!(self, Self::Active(ActivePhase::Capturing))
    }

    /// Short name published in status snapshots.
    pub fn name(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Activating => "activating",
            Self::Active(ActivePhase::Idle) => "idle",
            Self::Active(ActivePhase::Capturing) => "capturing",
            Self::Deactivating => "deactivating",
            Self::Resetting => "resetting",
            Self::Error => "error",
        }
    }
}

/// Mutable session state, guarded together with the config by one mutex.
#[derive(Debug, Default)]
pub struct SessionState {
    pub controller: ControllerState,
    /// Accepted start requests. Incremented by one before the hardware start
    /// is attempted, so a failed start leaves a visible gap against
    /// `captured_count`.
    pub triggered_count: u64,
    /// Spectra actually stored in the data file.
    pub captured_count: u64,
    /// Start requests since the last device initialization.
    pub acquisitions_since_init: u64,
    /// Stores expected before the current run drops back to idle; `None`
    /// between runs and for run-till-abort.
    pub run_expected: Option<u32>,
    /// Spectra stored by the current run so far.
    pub run_stored: u32,
    /// A stabilized-start request is waiting; the next temperature poll that
    /// reports stabilized arms the device.
    pub pending_start: bool,
    /// Sensor dimensions read once per initialization.
    pub detector_size: Option<(u32, u32)>,
    pub last_temperature: Option<TemperatureReading>,
    pub temperature_status: TemperatureStatus,
}

/// Everything the config lock guards.
#[derive(Debug, Default)]
pub struct SessionShared {
    pub config: SessionConfig,
    pub state: SessionState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_raw_codes_round_trip() {
        for raw in 1..=5 {
            let mode = AcquisitionMode::from_raw(raw).unwrap();
            assert_eq!(mode.as_raw(), raw);
        }
        assert!(AcquisitionMode::from_raw(0).is_none());
        assert!(AcquisitionMode::from_raw(6).is_none());
    }

    #[test]
    fn expected_frames_per_mode() {
        assert_eq!(AcquisitionMode::SingleScan.expected_frames(5), Some(1));
        assert_eq!(AcquisitionMode::Accumulate.expected_frames(5), Some(1));
        assert_eq!(AcquisitionMode::Kinetics.expected_frames(5), Some(5));
        assert_eq!(AcquisitionMode::FastKinetics.expected_frames(3), Some(3));
        assert_eq!(AcquisitionMode::RunTillAbort.expected_frames(5), None);
    }

    #[test]
    fn state_names_are_stable() {
        assert_eq!(ControllerState::Inactive.name(), "inactive");
        assert_eq!(ControllerState::Active(ActivePhase::Capturing).name(), "capturing");
        assert!(ControllerState::Active(ActivePhase::Idle).is_active());
        assert!(!ControllerState::Deactivating.is_active());
    }
}
