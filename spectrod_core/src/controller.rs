//! Acquisition lifecycle controller.
//!
//! Owns the detector, the shared session, the data sink, and the long-lived
//! capture thread. Command handlers run on the caller's thread and finish
//! within the config lock's bounded critical sections; everything that
//! blocks on the device happens in the capture thread, so a long exposure
//! never wedges the command surface.

use crate::error::{AcqError, Result};
use crate::hw_error::map_hw_error;
use crate::publish::StatusSnapshot;
use crate::session::{
    AcquisitionMode, ActivePhase, ControllerState, SessionConfig, SessionShared,
};
use crate::sink::{DataSink, Record};
use crate::task::{CaptureEvent, CaptureTask};
use crossbeam_channel as xch;
use eyre::WrapErr;
use spectrod_traits::{CancelToken, Detector, DetectorStatus, TemperatureStatus};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Optional overrides applied atomically as part of a start request. Absent
/// fields keep the current session configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StartOptions {
    pub exposure_secs: Option<f64>,
    pub interval_secs: Option<f64>,
    /// Raw acquisition mode code, 1..=5.
    pub mode: Option<u32>,
    pub series_length: Option<u32>,
}

impl StartOptions {
    /// Mode-only override; raw 0 keeps the current mode.
    pub fn with_mode(raw: u32) -> Self {
        Self {
            mode: (raw != 0).then_some(raw),
            ..Self::default()
        }
    }
}

pub struct AcquisitionController {
    detector: Arc<dyn Detector>,
    shared: Arc<Mutex<SessionShared>>,
    sink: Arc<DataSink>,
    /// Cancels the capture thread's blocking wait; only deactivation and
    /// shutdown raise it.
    cancel: CancelToken,
    capture: Option<CaptureTask>,
    events_tx: xch::Sender<CaptureEvent>,
    events_rx: xch::Receiver<CaptureEvent>,
    defaults: SessionConfig,
    driver_path: PathBuf,
    attempt_limit: u32,
}

impl AcquisitionController {
    pub fn new(detector: Arc<dyn Detector>, cfg: &spectrod_config::Config) -> Self {
        let defaults = SessionConfig::from_defaults(&cfg.defaults);
        let shared = Arc::new(Mutex::new(SessionShared {
            config: defaults,
            state: Default::default(),
        }));
        let (events_tx, events_rx) = xch::unbounded();
        Self {
            detector,
            shared,
            sink: Arc::new(DataSink::new(cfg.hardware.data_dir.clone())),
            cancel: CancelToken::new(),
            capture: None,
            events_tx,
            events_rx,
            defaults,
            driver_path: PathBuf::from(cfg.hardware.driver_path.clone()),
            attempt_limit: cfg.exposure_loop.attempt_limit,
        }
    }

    /// Capture progress notifications, for logging and tests.
    pub fn events(&self) -> xch::Receiver<CaptureEvent> {
        self.events_rx.clone()
    }

    pub fn shared(&self) -> Arc<Mutex<SessionShared>> {
        self.shared.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SessionShared> {
        self.shared.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Bring the device up, start the capture loop, and put the session into
    /// active-idle. Calling it on an already active session is a no-op.
    pub fn activate(&mut self) -> Result<()> {
        {
            let mut s = self.lock();
            match s.state.controller {
                ControllerState::Active(_) | ControllerState::Activating => return Ok(()),
                ControllerState::Deactivating | ControllerState::Resetting => {
                    return Err(AcqError::State("transition already in progress".into()).into());
                }
                ControllerState::Inactive | ControllerState::Error => {
                    s.state.controller = ControllerState::Activating;
                }
            }
        }
        match self.bring_up() {
            Ok(()) => {
                self.recover_captured_count();
                self.spawn_capture_loop();
                self.lock().state.controller = ControllerState::Active(ActivePhase::Idle);
                tracing::info!("session active");
                Ok(())
            }
            Err(e) => {
                self.lock().state.controller = ControllerState::Error;
                Err(e).wrap_err("activation failed")
            }
        }
    }

    /// Seed `captured_count` from today's data file, so a daemon restarted
    /// mid-day reports how much is already on disk.
    fn recover_captured_count(&self) {
        let stored = match self.sink.count_lines() {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "could not count today's spectra");
                return;
            }
        };
        let mut s = self.lock();
        if s.state.captured_count == 0 {
            s.state.captured_count = stored;
        }
    }

    /// One thread for the life of the session; starts merely arm the device.
    fn spawn_capture_loop(&mut self) {
        self.cancel.reset();
        self.capture = Some(CaptureTask::spawn(
            self.detector.clone(),
            self.shared.clone(),
            self.sink.clone(),
            self.cancel.clone(),
            self.events_tx.clone(),
            self.attempt_limit,
        ));
    }

    fn bring_up(&self) -> Result<()> {
        let d = self.detector.as_ref();
        d.initialize(&self.driver_path)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        let size = d.detector_size().map_err(|e| map_hw_error(e.as_ref()))?;
        let cfg = self.lock().config;
        d.set_read_mode(cfg.read_mode)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        d.set_shutter(cfg.shutter_type, cfg.shutter_mode)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        d.set_acquisition_mode(cfg.mode.as_raw())
            .map_err(|e| map_hw_error(e.as_ref()))?;
        d.set_exposure_secs(cfg.exposure_secs)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        d.set_series_length(cfg.series_length)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        d.set_accumulation_count(cfg.accumulation_count)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        d.set_kinetic_cycle_secs(cfg.interval_secs)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        d.set_target_temperature(cfg.target_temperature_c)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        d.set_cooler(true).map_err(|e| map_hw_error(e.as_ref()))?;
        {
            let mut s = self.lock();
            // Fixed for the lifetime of this initialization.
            s.state.detector_size = Some(size);
            s.state.acquisitions_since_init = 0;
        }
        // Seed the cached reading so a start issued right after activation
        // sees the real cooling state, not a stale one.
        self.refresh_temperature()?;
        Ok(())
    }

    /// Read the cooling loop and cache the result under the config lock.
    fn refresh_temperature(&self) -> Result<TemperatureStatus> {
        let reading = self
            .detector
            .temperatures()
            .map_err(|e| map_hw_error(e.as_ref()))?;
        let status = self
            .detector
            .temperature_status()
            .map_err(|e| map_hw_error(e.as_ref()))?;
        let mut s = self.lock();
        s.state.last_temperature = Some(reading);
        s.state.temperature_status = status;
        Ok(status)
    }

    /// Tear the session down: cancel any blocked wait, abort the device, join
    /// the capture thread, then power down. Idempotent.
    pub fn deactivate(&mut self) -> Result<()> {
        {
            let mut s = self.lock();
            match s.state.controller {
                ControllerState::Inactive | ControllerState::Deactivating => return Ok(()),
                _ => s.state.controller = ControllerState::Deactivating,
            }
            s.state.pending_start = false;
        }
        self.tear_down();
        self.lock().state.controller = ControllerState::Inactive;
        tracing::info!("session inactive");
        Ok(())
    }

    /// Cancel, abort, join, power down. Errors on the way down are logged,
    /// not propagated; teardown always completes.
    fn tear_down(&mut self) {
        self.cancel.cancel();
        if let Err(e) = self.detector.abort_acquisition() {
            tracing::warn!(error = %e, "abort during teardown failed");
        }
        if let Some(mut task) = self.capture.take() {
            task.stop();
        }
        self.cancel.reset();
        if let Err(e) = self.detector.set_cooler(false) {
            tracing::warn!(error = %e, "cooler off during teardown failed");
        }
        if let Err(e) = self.detector.shutdown() {
            tracing::warn!(error = %e, "device shutdown failed");
        }
    }

    /// Full re-initialization: tear down, restore configured defaults, clear
    /// the counters, bring the device back up with a fresh capture loop.
    pub fn reset(&mut self) -> Result<()> {
        self.lock().state.controller = ControllerState::Resetting;
        self.tear_down();
        {
            let mut s = self.lock();
            s.config = self.defaults;
            s.state = Default::default();
            s.state.controller = ControllerState::Resetting;
        }
        match self.bring_up() {
            Ok(()) => {
                self.spawn_capture_loop();
                self.lock().state.controller = ControllerState::Active(ActivePhase::Idle);
                tracing::info!("session reset");
                Ok(())
            }
            Err(e) => {
                self.lock().state.controller = ControllerState::Error;
                Err(e).wrap_err("reset failed")
            }
        }
    }

    fn require_active(s: &SessionShared) -> std::result::Result<(), AcqError> {
        if s.state.controller.is_active() {
            Ok(())
        } else {
            Err(AcqError::NotActive)
        }
    }

    pub fn set_temperature(&mut self, celsius: i32) -> Result<()> {
        if !(-120..=20).contains(&celsius) {
            return Err(
                AcqError::Validation(format!("temperature {celsius} outside [-120, 20]")).into(),
            );
        }
        let mut s = self.lock();
        Self::require_active(&s)?;
        self.detector
            .set_target_temperature(celsius)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        s.config.target_temperature_c = celsius;
        Ok(())
    }

    /// Change the exposure. A running series is aborted, retargeted, and
    /// restarted in place; the capture thread keeps waiting throughout.
    pub fn set_integration_time(&mut self, secs: f64) -> Result<()> {
        if !(secs > 0.0 && secs.is_finite()) {
            return Err(AcqError::Validation(format!("exposure {secs} must be > 0")).into());
        }
        let mut s = self.lock();
        Self::require_active(&s)?;
        let d = self.detector.as_ref();
        if s.state.controller.is_capturing() {
            d.abort_acquisition().map_err(|e| map_hw_error(e.as_ref()))?;
            d.set_exposure_secs(secs).map_err(|e| map_hw_error(e.as_ref()))?;
            d.start_acquisition().map_err(|e| map_hw_error(e.as_ref()))?;
        } else {
            d.set_exposure_secs(secs).map_err(|e| map_hw_error(e.as_ref()))?;
        }
        s.config.exposure_secs = secs;
        Ok(())
    }

    pub fn set_interval(&mut self, secs: f64) -> Result<()> {
        if secs < 0.0 || !secs.is_finite() {
            return Err(AcqError::Validation(format!("interval {secs} must be >= 0")).into());
        }
        let mut s = self.lock();
        Self::require_active(&s)?;
        self.detector
            .set_kinetic_cycle_secs(secs)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        s.config.interval_secs = secs;
        Ok(())
    }

    pub fn set_acquisition_mode(&mut self, raw: u32) -> Result<()> {
        let mode = AcquisitionMode::from_raw(raw)
            .ok_or_else(|| AcqError::Validation(format!("acquisition mode {raw}")))?;
        let mut s = self.lock();
        Self::require_active(&s)?;
        self.detector
            .set_acquisition_mode(mode.as_raw())
            .map_err(|e| map_hw_error(e.as_ref()))?;
        s.config.mode = mode;
        Ok(())
    }

    pub fn set_read_mode(&mut self, mode: u32) -> Result<()> {
        if mode > 4 {
            return Err(AcqError::Validation(format!("read mode {mode} outside 0..=4")).into());
        }
        let mut s = self.lock();
        Self::require_active(&s)?;
        self.detector
            .set_read_mode(mode)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        s.config.read_mode = mode;
        Ok(())
    }

    pub fn set_shutter(&mut self, shutter_type: u32, shutter_mode: u32) -> Result<()> {
        if shutter_type > 1 || shutter_mode > 2 {
            return Err(AcqError::Validation(format!(
                "shutter {shutter_type}/{shutter_mode} outside type 0..=1, mode 0..=2"
            ))
            .into());
        }
        let mut s = self.lock();
        Self::require_active(&s)?;
        self.detector
            .set_shutter(shutter_type, shutter_mode)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        s.config.shutter_type = shutter_type;
        s.config.shutter_mode = shutter_mode;
        Ok(())
    }

    pub fn set_accumulation_count(&mut self, count: u32) -> Result<()> {
        if count == 0 {
            return Err(AcqError::Validation("accumulation count must be >= 1".into()).into());
        }
        let mut s = self.lock();
        Self::require_active(&s)?;
        self.detector
            .set_accumulation_count(count)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        s.config.accumulation_count = count;
        Ok(())
    }

    pub fn set_series_length(&mut self, length: u32) -> Result<()> {
        if length == 0 {
            return Err(AcqError::Validation("series length must be >= 1".into()).into());
        }
        let mut s = self.lock();
        Self::require_active(&s)?;
        self.detector
            .set_series_length(length)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        s.config.series_length = length;
        Ok(())
    }

    /// Target for the closed-loop exposure adjustment. Config only; no device
    /// call, so it is accepted in any state. Zero disables the loop.
    pub fn set_target_intensity(&mut self, counts: u32) -> Result<()> {
        self.lock().config.target_intensity = counts;
        Ok(())
    }

    /// Start a capture run, applying any overrides first. Returns the
    /// sequence number of the request without waiting for a frame; the
    /// capture thread does the waiting.
    ///
    /// The trigger counter moves by one before the hardware is touched; a
    /// failed start deliberately leaves it ahead of the capture counter,
    /// which is how missed spectra become visible downstream.
    pub fn start_acquisition(&mut self, opts: StartOptions) -> Result<u64> {
        self.begin_run(opts, false)
    }

    /// Like `start_acquisition`, but hold the hardware start until the
    /// sensor reports a stabilized temperature. The sequence number is
    /// assigned now; the first temperature poll that sees `Stabilized` arms
    /// the device.
    pub fn start_when_stabilized(&mut self, opts: StartOptions) -> Result<u64> {
        self.begin_run(opts, true)
    }

    fn begin_run(&mut self, opts: StartOptions, wait_for_stabilized: bool) -> Result<u64> {
        if let Some(secs) = opts.exposure_secs
            && !(secs > 0.0 && secs.is_finite())
        {
            return Err(AcqError::Validation(format!("exposure {secs} must be > 0")).into());
        }
        if let Some(secs) = opts.interval_secs
            && (secs < 0.0 || !secs.is_finite())
        {
            return Err(AcqError::Validation(format!("interval {secs} must be >= 0")).into());
        }
        let mode = match opts.mode {
            Some(raw) => Some(
                AcquisitionMode::from_raw(raw)
                    .ok_or_else(|| AcqError::Validation(format!("acquisition mode {raw}")))?,
            ),
            None => None,
        };
        if let Some(n) = opts.series_length
            && n == 0
        {
            return Err(AcqError::Validation("series length must be >= 1".into()).into());
        }
        let mut s = self.lock();
        Self::require_active(&s)?;
        if s.state.controller.is_capturing() || s.state.pending_start {
            return Err(AcqError::Busy.into());
        }
        if let Some(secs) = opts.exposure_secs {
            s.config.exposure_secs = secs;
        }
        if let Some(secs) = opts.interval_secs {
            s.config.interval_secs = secs;
        }
        if let Some(m) = mode {
            s.config.mode = m;
        }
        if let Some(n) = opts.series_length {
            s.config.series_length = n;
        }
        let cfg = s.config;
        s.state.triggered_count += 1;
        s.state.acquisitions_since_init += 1;
        let seq = s.state.triggered_count;
        if wait_for_stabilized && s.state.temperature_status != TemperatureStatus::Stabilized {
            s.state.pending_start = true;
            tracing::info!(seq, "start queued until the sensor stabilizes");
            return Ok(seq);
        }
        self.arm(&mut s, &cfg).wrap_err("starting acquisition")?;
        Ok(seq)
    }

    /// Program the device for the configured run and start it. Runs with the
    /// config lock held; every call is a quick setter.
    fn arm(&self, s: &mut SessionShared, cfg: &SessionConfig) -> Result<()> {
        let d = self.detector.as_ref();
        d.set_acquisition_mode(cfg.mode.as_raw())
            .map_err(|e| map_hw_error(e.as_ref()))?;
        d.set_series_length(cfg.series_length)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        d.set_accumulation_count(cfg.accumulation_count)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        d.set_kinetic_cycle_secs(cfg.interval_secs)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        d.set_exposure_secs(cfg.exposure_secs)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        d.start_acquisition().map_err(|e| map_hw_error(e.as_ref()))?;
        s.state.run_expected = cfg.mode.expected_frames(cfg.series_length);
        s.state.run_stored = 0;
        s.state.controller = ControllerState::Active(ActivePhase::Capturing);
        tracing::info!(mode = cfg.mode.as_raw(), "acquisition started");
        Ok(())
    }

    /// Stop a running or queued capture. Safe to call when idle; fails only
    /// when the device rejects the abort.
    pub fn stop_acquisition(&mut self) -> Result<()> {
        let mut s = self.lock();
        Self::require_active(&s)?;
        let pending = std::mem::take(&mut s.state.pending_start);
        if !s.state.controller.is_capturing() {
            if pending {
                tracing::info!("queued start cancelled");
            }
            return Ok(());
        }
        self.detector
            .abort_acquisition()
            .map_err(|e| map_hw_error(e.as_ref()))?;
        s.state.run_expected = None;
        s.state.run_stored = 0;
        s.state.controller = ControllerState::Active(ActivePhase::Idle);
        tracing::info!("acquisition stopped");
        Ok(())
    }

    /// End a run-till-abort stream. Same teardown as `stop_acquisition`;
    /// kept as its own entry point to match the command surface.
    pub fn stop_live(&mut self) -> Result<()> {
        self.stop_acquisition()
    }

    /// Most recent record of today's data file, reconstructed from disk.
    pub fn last_spectrum(&self) -> Result<Record> {
        Ok(self.sink.read_last()?)
    }

    /// Sample the cooling loop and store the reading for status publishing.
    /// Arms a queued start once the sensor reports stabilized.
    pub fn poll_temperature(&mut self) -> Result<()> {
        if !self.lock().state.controller.is_active() {
            return Ok(());
        }
        let status = self.refresh_temperature()?;
        let mut s = self.lock();
        if s.state.pending_start
            && status == TemperatureStatus::Stabilized
            && !s.state.controller.is_capturing()
        {
            s.state.pending_start = false;
            let cfg = s.config;
            tracing::info!("sensor stabilized, starting queued acquisition");
            self.arm(&mut s, &cfg).wrap_err("queued start failed")?;
        }
        Ok(())
    }

    /// Snapshot for the status publisher. The file count is taken before the
    /// config lock; the two locks are never held together here.
    pub fn status_snapshot(&self) -> StatusSnapshot {
        let stored_today = self.sink.count_lines().unwrap_or(0);
        let log_path = self.sink.today_path().display().to_string();
        let s = self.lock();
        let device_status = if s.state.controller.is_active() {
            self.detector
                .status()
                .map(DetectorStatus::as_code)
                .unwrap_or(DetectorStatus::Fault.as_code())
        } else {
            DetectorStatus::Idle.as_code()
        };
        StatusSnapshot {
            state: s.state.controller.name(),
            active: s.state.controller.is_active(),
            device_status,
            mode: s.config.mode.as_raw(),
            exposure_secs: s.config.exposure_secs,
            interval_secs: s.config.interval_secs,
            series_length: s.config.series_length,
            triggered_count: s.state.triggered_count,
            captured_count: s.state.captured_count,
            stored_today,
            temperature_c: s.state.last_temperature.map(|t| t.current_c),
            target_temperature_c: s.config.target_temperature_c,
            temperature_status: s.state.temperature_status.to_string(),
            log_path,
        }
    }

    /// Shutdown path for process exit: identical ordering to `deactivate`,
    /// tolerated in any state.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.deactivate() {
            tracing::warn!(error = %e, "deactivate during shutdown failed");
        }
    }
}
