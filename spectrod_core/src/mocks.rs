//! Test and helper mocks for spectrod_core.

use spectrod_traits::{
    CancelToken, Detector, DetectorStatus, HwResult, TemperatureReading, TemperatureStatus,
    Timings, WaitOutcome,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

type FrameFn = Box<dyn Fn(f64) -> Vec<i32> + Send>;

#[derive(Default)]
struct MockState {
    initialized: bool,
    exposure_secs: f64,
    mode: u32,
    series_length: u32,
    accumulation_count: u32,
    interval_secs: f64,
    frames: VecDeque<Vec<i32>>,
    frame_fn: Option<FrameFn>,
    last_frame: Option<Vec<i32>>,
    acquiring: bool,
    /// Frames the current run still owes; `None` means unlimited.
    frames_left: Option<u32>,
    fail_starts: u32,
    fail_reads: u32,
    read_mode: u32,
    shutter: (u32, u32),
    start_calls: u32,
    abort_calls: u32,
    shutdown_calls: u32,
    cooler_on: bool,
    target_c: f64,
    current_c: f64,
    temperature_status: TemperatureStatus,
}

/// Scriptable detector: hands out queued frames, or frames computed from the
/// current exposure, but only while a started run still owes frames; outside
/// a run it blocks like idle hardware, until cancelled. Counters record every
/// lifecycle call so tests can assert ordering.
pub struct MockDetector {
    state: Mutex<MockState>,
}

impl Default for MockDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDetector {
    pub fn new() -> Self {
        let state = MockState {
            current_c: 20.0,
            temperature_status: TemperatureStatus::Stabilized,
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Queue a frame to be returned by the next wait/read pair.
    pub fn push_frame(&self, frame: Vec<i32>) {
        self.lock().frames.push_back(frame);
    }

    /// Compute frames from the exposure in effect at wait time. Takes
    /// precedence when the queue is empty.
    pub fn set_frame_fn(&self, f: impl Fn(f64) -> Vec<i32> + Send + 'static) {
        self.lock().frame_fn = Some(Box::new(f));
    }

    /// Make the next `n` `start_acquisition` calls fail.
    pub fn fail_next_starts(&self, n: u32) {
        self.lock().fail_starts = n;
    }

    /// Make the next `n` `read_frame` calls fail after a successful wait.
    pub fn fail_next_reads(&self, n: u32) {
        self.lock().fail_reads = n;
    }

    pub fn set_temperature_status(&self, status: TemperatureStatus) {
        self.lock().temperature_status = status;
    }

    pub fn set_current_temperature(&self, celsius: f64) {
        self.lock().current_c = celsius;
    }

    pub fn start_calls(&self) -> u32 {
        self.lock().start_calls
    }

    pub fn abort_calls(&self) -> u32 {
        self.lock().abort_calls
    }

    pub fn shutdown_calls(&self) -> u32 {
        self.lock().shutdown_calls
    }

    pub fn exposure_secs(&self) -> f64 {
        self.lock().exposure_secs
    }

    pub fn mode(&self) -> u32 {
        self.lock().mode
    }

    pub fn read_mode(&self) -> u32 {
        self.lock().read_mode
    }

    pub fn shutter(&self) -> (u32, u32) {
        self.lock().shutter
    }
}

impl Detector for MockDetector {
    fn initialize(&self, _driver_path: &Path) -> HwResult<()> {
        self.lock().initialized = true;
        Ok(())
    }

    fn shutdown(&self) -> HwResult<()> {
        let mut s = self.lock();
        s.initialized = false;
        s.shutdown_calls += 1;
        Ok(())
    }

    fn detector_size(&self) -> HwResult<(u32, u32)> {
        Ok((8, 1))
    }

    fn set_exposure_secs(&self, secs: f64) -> HwResult<()> {
        self.lock().exposure_secs = secs;
        Ok(())
    }

    fn set_acquisition_mode(&self, mode: u32) -> HwResult<()> {
        self.lock().mode = mode;
        Ok(())
    }

    fn set_read_mode(&self, mode: u32) -> HwResult<()> {
        self.lock().read_mode = mode;
        Ok(())
    }

    fn set_shutter(&self, shutter_type: u32, shutter_mode: u32) -> HwResult<()> {
        self.lock().shutter = (shutter_type, shutter_mode);
        Ok(())
    }

    fn set_accumulation_count(&self, count: u32) -> HwResult<()> {
        self.lock().accumulation_count = count;
        Ok(())
    }

    fn set_series_length(&self, length: u32) -> HwResult<()> {
        self.lock().series_length = length;
        Ok(())
    }

    fn set_kinetic_cycle_secs(&self, secs: f64) -> HwResult<()> {
        self.lock().interval_secs = secs;
        Ok(())
    }

    fn set_target_temperature(&self, celsius: i32) -> HwResult<()> {
        self.lock().target_c = f64::from(celsius);
        Ok(())
    }

    fn set_cooler(&self, on: bool) -> HwResult<()> {
        self.lock().cooler_on = on;
        Ok(())
    }

    fn start_acquisition(&self) -> HwResult<()> {
        let mut s = self.lock();
        s.start_calls += 1;
        if s.fail_starts > 0 {
            s.fail_starts -= 1;
            return Err(Box::new(std::io::Error::other("injected start failure")));
        }
        s.acquiring = true;
        s.frames_left = match s.mode {
            3 | 4 => Some(s.series_length.max(1)),
            5 => None,
            _ => Some(1),
        };
        Ok(())
    }

    fn abort_acquisition(&self) -> HwResult<()> {
        let mut s = self.lock();
        s.abort_calls += 1;
        s.acquiring = false;
        Ok(())
    }

    fn wait_for_frame(&self, cancel: &CancelToken) -> HwResult<WaitOutcome> {
        loop {
            if cancel.is_cancelled() {
                return Ok(WaitOutcome::Cancelled);
            }
            {
                let mut s = self.lock();
                if s.acquiring && s.frames_left != Some(0) {
                    let exposure = s.exposure_secs;
                    let frame = s
                        .frames
                        .pop_front()
                        .or_else(|| s.frame_fn.as_ref().map(|f| f(exposure)));
                    if let Some(frame) = frame {
                        s.last_frame = Some(frame);
                        if let Some(left) = s.frames_left.as_mut() {
                            *left -= 1;
                            if *left == 0 {
                                s.acquiring = false;
                            }
                        }
                        return Ok(WaitOutcome::FrameReady);
                    }
                }
            }
            // Idle device, or a script with no pending frame.
            if cancel.wait_timeout(Duration::from_millis(1)) {
                return Ok(WaitOutcome::Cancelled);
            }
        }
    }

    fn read_frame(&self) -> HwResult<Vec<i32>> {
        let mut s = self.lock();
        if s.fail_reads > 0 {
            s.fail_reads -= 1;
            return Err(Box::new(std::io::Error::other("injected readout failure")));
        }
        s.last_frame
            .clone()
            .ok_or_else(|| Box::new(std::io::Error::other("no frame")) as _)
    }

    fn acquisition_timings(&self) -> HwResult<Timings> {
        let s = self.lock();
        Ok(Timings {
            exposure_secs: s.exposure_secs,
            cycle_secs: s.interval_secs,
            readout_secs: 0.0,
        })
    }

    fn status(&self) -> HwResult<DetectorStatus> {
        Ok(DetectorStatus::Idle)
    }

    fn temperatures(&self) -> HwResult<TemperatureReading> {
        let s = self.lock();
        Ok(TemperatureReading {
            current_c: s.current_c,
            target_c: s.target_c,
        })
    }

    fn temperature_status(&self) -> HwResult<TemperatureStatus> {
        Ok(self.lock().temperature_status)
    }
}
