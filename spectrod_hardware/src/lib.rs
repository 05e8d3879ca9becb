#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
//! Detector adapters for the spectrod daemon.
//!
//! The only in-tree backend is [`SimulatedDetector`], a full software model of
//! a cooled line-scan detector used for development and the test suite. A
//! vendor SDK backend plugs in behind the same `spectrod_traits::Detector`
//! capability without touching the rest of the stack.

pub mod error;

pub use error::HwError;

use spectrod_traits::{
    CancelToken, Clock, Detector, DetectorStatus, HwResult, MonotonicClock, TemperatureReading,
    TemperatureStatus, Timings, WaitOutcome,
};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const READOUT_SECS: f64 = 0.002;
/// Synthetic photon rate: counts accumulated at the spectral peak per second
/// of exposure. 0.01 s of exposure yields a peak of ~10_000 counts.
const PEAK_COUNTS_PER_SEC: f64 = 1.0e6;
const FULL_WELL: f64 = 65_535.0;
/// Fraction of the remaining temperature delta closed per poll.
const COOLING_RATE: f64 = 0.2;
const STABILIZED_BAND_C: f64 = 1.0;

#[derive(Debug)]
struct SimState {
    initialized: bool,
    exposure_secs: f64,
    cycle_secs: f64,
    mode: u32,
    read_mode: u32,
    shutter: (u32, u32),
    accumulation_count: u32,
    series_length: u32,
    cooler_on: bool,
    target_c: f64,
    current_c: f64,
    acquiring: bool,
    exposure_started: Option<Instant>,
    /// Frames left in the current run; `None` runs until aborted.
    frames_left: Option<u32>,
    last_frame: Option<Vec<i32>>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            initialized: false,
            exposure_secs: 0.01,
            cycle_secs: 1.0,
            mode: 1,
            read_mode: 0,
            shutter: (0, 0),
            accumulation_count: 1,
            series_length: 5,
            cooler_on: false,
            target_c: 20.0,
            current_c: 20.0,
            acquiring: false,
            exposure_started: None,
            frames_left: None,
            last_frame: None,
        }
    }
}

/// Software detector: produces a Gaussian spectrum whose peak scales with the
/// configured exposure, so the closed-loop exposure controller has something
/// real to converge against. Temperature ramps toward the target a fixed
/// fraction per poll, like a Peltier stage settling.
pub struct SimulatedDetector {
    state: Mutex<SimState>,
    clock: Arc<dyn Clock + Send + Sync>,
    width: u32,
    height: u32,
}

impl Default for SimulatedDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDetector {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Build with a caller-provided clock (deterministic in tests).
    pub fn with_clock(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            clock,
            width: 1024,
            height: 1,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A poisoned simulator is unrecoverable state-wise but the data is
        // plain-old values; continue with whatever was last written.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn synth_frame(&self, exposure_secs: f64) -> Vec<i32> {
        let peak = (exposure_secs * PEAK_COUNTS_PER_SEC).clamp(0.0, FULL_WELL);
        let center = f64::from(self.width) / 2.0;
        let sigma = f64::from(self.width) / 16.0;
        (0..self.width)
            .map(|i| {
                let d = f64::from(i) - center;
                let v = peak * (-d * d / (2.0 * sigma * sigma)).exp();
                v.round() as i32
            })
            .collect()
    }

    fn check_initialized(state: &SimState) -> Result<(), HwError> {
        if state.initialized {
            Ok(())
        } else {
            Err(HwError::NotInitialized)
        }
    }
}

impl Detector for SimulatedDetector {
    fn initialize(&self, driver_path: &Path) -> HwResult<()> {
        let mut s = self.lock();
        tracing::info!(path = %driver_path.display(), "initializing simulated detector");
        s.initialized = true;
        s.acquiring = false;
        s.exposure_started = None;
        Ok(())
    }

    fn shutdown(&self) -> HwResult<()> {
        let mut s = self.lock();
        Self::check_initialized(&s)?;
        s.initialized = false;
        s.acquiring = false;
        s.cooler_on = false;
        tracing::info!("simulated detector shut down");
        Ok(())
    }

    fn detector_size(&self) -> HwResult<(u32, u32)> {
        Self::check_initialized(&self.lock())?;
        Ok((self.width, self.height))
    }

    fn set_exposure_secs(&self, secs: f64) -> HwResult<()> {
        let mut s = self.lock();
        Self::check_initialized(&s)?;
        if !(secs > 0.0 && secs.is_finite()) {
            return Err(Box::new(HwError::InvalidParameter(format!(
                "exposure {secs}"
            ))));
        }
        s.exposure_secs = secs;
        Ok(())
    }

    fn set_acquisition_mode(&self, mode: u32) -> HwResult<()> {
        let mut s = self.lock();
        Self::check_initialized(&s)?;
        s.mode = mode;
        Ok(())
    }

    fn set_read_mode(&self, mode: u32) -> HwResult<()> {
        let mut s = self.lock();
        Self::check_initialized(&s)?;
        s.read_mode = mode;
        Ok(())
    }

    fn set_shutter(&self, shutter_type: u32, shutter_mode: u32) -> HwResult<()> {
        let mut s = self.lock();
        Self::check_initialized(&s)?;
        s.shutter = (shutter_type, shutter_mode);
        Ok(())
    }

    fn set_accumulation_count(&self, count: u32) -> HwResult<()> {
        let mut s = self.lock();
        Self::check_initialized(&s)?;
        s.accumulation_count = count;
        Ok(())
    }

    fn set_series_length(&self, length: u32) -> HwResult<()> {
        let mut s = self.lock();
        Self::check_initialized(&s)?;
        s.series_length = length;
        Ok(())
    }

    fn set_kinetic_cycle_secs(&self, secs: f64) -> HwResult<()> {
        let mut s = self.lock();
        Self::check_initialized(&s)?;
        if secs < 0.0 || !secs.is_finite() {
            return Err(Box::new(HwError::InvalidParameter(format!("cycle {secs}"))));
        }
        s.cycle_secs = secs;
        Ok(())
    }

    fn set_target_temperature(&self, celsius: i32) -> HwResult<()> {
        let mut s = self.lock();
        Self::check_initialized(&s)?;
        s.target_c = f64::from(celsius);
        Ok(())
    }

    fn set_cooler(&self, on: bool) -> HwResult<()> {
        let mut s = self.lock();
        Self::check_initialized(&s)?;
        s.cooler_on = on;
        Ok(())
    }

    fn start_acquisition(&self) -> HwResult<()> {
        let mut s = self.lock();
        Self::check_initialized(&s)?;
        s.acquiring = true;
        s.exposure_started = Some(self.clock.now());
        // Kinetic modes run a whole series per start; run-till-abort is
        // unbounded; everything else is one stored frame.
        s.frames_left = match s.mode {
            3 | 4 => Some(s.series_length.max(1)),
            5 => None,
            _ => Some(1),
        };
        Ok(())
    }

    fn abort_acquisition(&self) -> HwResult<()> {
        let mut s = self.lock();
        Self::check_initialized(&s)?;
        // Aborting an idle device is a no-op by contract.
        s.acquiring = false;
        s.exposure_started = None;
        s.frames_left = None;
        Ok(())
    }

    fn wait_for_frame(&self, cancel: &CancelToken) -> HwResult<WaitOutcome> {
        const POLL: Duration = Duration::from_millis(2);
        loop {
            if cancel.is_cancelled() {
                return Ok(WaitOutcome::Cancelled);
            }
            {
                let mut s = self.lock();
                Self::check_initialized(&s)?;
                if let Some(started) = s.exposure_started
                    && s.acquiring
                {
                    let elapsed = self.clock.now().saturating_duration_since(started);
                    if elapsed >= Duration::from_secs_f64(s.exposure_secs) {
                        let frame = self.synth_frame(s.exposure_secs);
                        s.last_frame = Some(frame);
                        let more = match s.frames_left.as_mut() {
                            None => true,
                            Some(left) => {
                                *left = left.saturating_sub(1);
                                *left > 0
                            }
                        };
                        if more {
                            s.exposure_started = Some(self.clock.now());
                        } else {
                            s.acquiring = false;
                            s.exposure_started = None;
                        }
                        return Ok(WaitOutcome::FrameReady);
                    }
                }
            }
            if cancel.wait_timeout(POLL) {
                return Ok(WaitOutcome::Cancelled);
            }
        }
    }

    fn read_frame(&self) -> HwResult<Vec<i32>> {
        let s = self.lock();
        Self::check_initialized(&s)?;
        s.last_frame
            .clone()
            .ok_or_else(|| Box::new(HwError::NoNewData) as _)
    }

    fn acquisition_timings(&self) -> HwResult<Timings> {
        let s = self.lock();
        Self::check_initialized(&s)?;
        Ok(Timings {
            exposure_secs: s.exposure_secs,
            cycle_secs: s.cycle_secs,
            readout_secs: READOUT_SECS,
        })
    }

    fn status(&self) -> HwResult<DetectorStatus> {
        let s = self.lock();
        Self::check_initialized(&s)?;
        Ok(if s.acquiring {
            DetectorStatus::Acquiring
        } else {
            DetectorStatus::Idle
        })
    }

    fn temperatures(&self) -> HwResult<TemperatureReading> {
        let mut s = self.lock();
        Self::check_initialized(&s)?;
        if s.cooler_on {
            s.current_c += (s.target_c - s.current_c) * COOLING_RATE;
        }
        Ok(TemperatureReading {
            current_c: s.current_c,
            target_c: s.target_c,
        })
    }

    fn temperature_status(&self) -> HwResult<TemperatureStatus> {
        let s = self.lock();
        Self::check_initialized(&s)?;
        Ok(if !s.cooler_on {
            TemperatureStatus::Off
        } else if (s.current_c - s.target_c).abs() <= STABILIZED_BAND_C {
            TemperatureStatus::Stabilized
        } else {
            TemperatureStatus::NotReached
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectrod_traits::clock::TestClock;

    fn init(det: &SimulatedDetector) {
        det.initialize(Path::new("/opt/vendor/etc")).unwrap();
    }

    #[test]
    fn uninitialized_calls_fail_fast() {
        let det = SimulatedDetector::new();
        assert!(det.detector_size().is_err());
        assert!(det.start_acquisition().is_err());
        assert!(det.read_frame().is_err());
    }

    #[test]
    fn frame_ready_after_exposure_elapses() {
        let clock = Arc::new(TestClock::new());
        let det = SimulatedDetector::with_clock(clock.clone());
        init(&det);
        det.set_exposure_secs(0.5).unwrap();
        det.start_acquisition().unwrap();
        clock.advance(Duration::from_millis(600));
        let cancel = CancelToken::new();
        assert_eq!(det.wait_for_frame(&cancel).unwrap(), WaitOutcome::FrameReady);
        let frame = det.read_frame().unwrap();
        assert_eq!(frame.len(), 1024);
        assert!(frame.iter().copied().max().unwrap_or(0) > 0);
    }

    #[test]
    fn wait_returns_cancelled_without_a_frame() {
        let det = SimulatedDetector::new();
        init(&det);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(det.wait_for_frame(&cancel).unwrap(), WaitOutcome::Cancelled);
    }

    #[test]
    fn longer_exposure_raises_the_peak() {
        let clock = Arc::new(TestClock::new());
        let det = SimulatedDetector::with_clock(clock.clone());
        init(&det);
        let cancel = CancelToken::new();

        det.set_exposure_secs(0.001).unwrap();
        det.start_acquisition().unwrap();
        clock.advance(Duration::from_millis(5));
        det.wait_for_frame(&cancel).unwrap();
        let dim = det.read_frame().unwrap();

        det.set_exposure_secs(0.01).unwrap();
        det.start_acquisition().unwrap();
        clock.advance(Duration::from_millis(50));
        det.wait_for_frame(&cancel).unwrap();
        let bright = det.read_frame().unwrap();

        let peak = |f: &[i32]| f.iter().copied().max().unwrap_or(0);
        assert!(peak(&bright) > peak(&dim));
    }

    #[test]
    fn cooler_ramps_toward_target_and_stabilizes() {
        let det = SimulatedDetector::new();
        init(&det);
        det.set_target_temperature(-60).unwrap();
        det.set_cooler(true).unwrap();
        let mut last = det.temperatures().unwrap();
        for _ in 0..40 {
            last = det.temperatures().unwrap();
        }
        assert!((last.current_c - (-60.0)).abs() <= STABILIZED_BAND_C);
        assert_eq!(
            det.temperature_status().unwrap(),
            TemperatureStatus::Stabilized
        );
    }
}
