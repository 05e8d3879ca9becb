//! Background capture loop.
//!
//! One long-lived thread per active session, started on activation and
//! stopped on deactivation. It blocks in `wait_for_frame`, reads each
//! finished frame, runs the closed-loop exposure adjustment, and appends the
//! result to the data sink. Read-modify-append runs under the config lock;
//! the waits never hold it, so command handlers stay responsive during long
//! exposures. A failed wait, readout, or append is logged and skipped; only
//! cancellation ends the loop.
//!
//! Safety: each `CaptureTask` spawns exactly one thread that is shut down
//! when the task is dropped, preventing thread leaks.

use crate::exposure::ExposureTuner;
use crate::session::{ActivePhase, ControllerState, SessionShared};
use crate::sink::DataSink;
use crossbeam_channel as xch;
use spectrod_traits::{CancelToken, Detector, WaitOutcome};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Progress notifications for observers (logging, tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// One spectrum was appended to the data file.
    Stored { index: u32 },
    /// The current run stored everything it was asked for.
    Finished { stored: u32 },
    /// The loop exited while a run was still in flight.
    Cancelled { stored: u32 },
    /// One iteration failed; the loop carries on with the next frame.
    Failed(String),
}

pub struct CaptureTask {
    cancel: CancelToken,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl CaptureTask {
    /// Start the capture loop. It idles in the blocking wait until the
    /// controller arms the device, and runs until the token is cancelled.
    pub fn spawn(
        detector: Arc<dyn Detector>,
        shared: Arc<Mutex<SessionShared>>,
        sink: Arc<DataSink>,
        cancel: CancelToken,
        events: xch::Sender<CaptureEvent>,
        attempt_limit: u32,
    ) -> Self {
        let cancel_clone = cancel.clone();
        let join_handle = std::thread::spawn(move || {
            run_loop(
                detector.as_ref(),
                &shared,
                &sink,
                &cancel_clone,
                &events,
                attempt_limit,
            );
            tracing::debug!("capture thread exiting");
        });
        Self {
            cancel,
            join_handle: Some(join_handle),
        }
    }

    /// Signal the loop to stop and join it. Callers abort the device first so
    /// a blocked wait returns quickly.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("capture thread joined"),
                Err(e) => tracing::warn!(?e, "capture thread panicked during shutdown"),
            }
        }
    }
}

impl Drop for CaptureTask {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(shared: &Mutex<SessionShared>) -> MutexGuard<'_, SessionShared> {
    shared.lock().unwrap_or_else(|p| p.into_inner())
}

fn run_loop(
    detector: &dyn Detector,
    shared: &Mutex<SessionShared>,
    sink: &DataSink,
    cancel: &CancelToken,
    events: &xch::Sender<CaptureEvent>,
    attempt_limit: u32,
) {
    loop {
        match detector.wait_for_frame(cancel) {
            Ok(WaitOutcome::Cancelled) => {
                finish_cancelled(shared, events);
                return;
            }
            Ok(WaitOutcome::FrameReady) => {}
            Err(e) => {
                tracing::error!(error = %e, "wait for frame failed");
                let _ = events.send(CaptureEvent::Failed(e.to_string()));
                // Back off so a persistently failing wait cannot spin.
                if cancel.wait_timeout(Duration::from_millis(100)) {
                    finish_cancelled(shared, events);
                    return;
                }
                continue;
            }
        }
        let frame = match detector.read_frame() {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(error = %e, "frame readout failed");
                let _ = events.send(CaptureEvent::Failed(e.to_string()));
                continue;
            }
        };
        let (capturing, target, exposure) = {
            let s = lock(shared);
            (
                s.state.controller.is_capturing(),
                s.config.target_intensity,
                s.config.exposure_secs,
            )
        };
        if !capturing {
            // A stop raced the readout; the frame belongs to no run.
            tracing::debug!("dropping frame outside a run");
            continue;
        }
        let (samples, exposure) = if target != 0 {
            let tuner = ExposureTuner::new(detector, cancel, target, attempt_limit);
            let out = tuner.tune(frame, exposure);
            if out.cancelled {
                finish_cancelled(shared, events);
                return;
            }
            lock(shared).config.exposure_secs = out.exposure_secs;
            (out.samples, out.exposure_secs)
        } else {
            (frame, exposure)
        };
        // The device's own timings are authoritative for the record.
        let exposure = detector
            .acquisition_timings()
            .map_or(exposure, |t| t.exposure_secs);
        let index;
        let mut finished_stored = None;
        {
            let mut s = lock(shared);
            let temp_c = s.state.last_temperature.map_or(f64::NAN, |t| t.current_c);
            // Config lock first, file lock inside append; never the other
            // way around.
            if let Err(e) = sink.append(exposure, temp_c, &samples) {
                tracing::error!(error = %e, "failed to store spectrum");
                drop(s);
                let _ = events.send(CaptureEvent::Failed(e.to_string()));
                continue;
            }
            s.state.captured_count += 1;
            s.state.run_stored += 1;
            index = s.state.run_stored;
            if let Some(expected) = s.state.run_expected
                && s.state.run_stored >= expected
            {
                s.state.run_expected = None;
                s.state.controller = ControllerState::Active(ActivePhase::Idle);
                finished_stored = Some(s.state.run_stored);
            }
        }
        let _ = events.send(CaptureEvent::Stored { index });
        if let Some(stored) = finished_stored {
            tracing::info!(stored, "run complete");
            let _ = events.send(CaptureEvent::Finished { stored });
        }
    }
}

/// Exit bookkeeping: a run still in flight drops back to idle and reports
/// how far it got.
fn finish_cancelled(shared: &Mutex<SessionShared>, events: &xch::Sender<CaptureEvent>) {
    let mut s = lock(shared);
    if s.state.controller.is_capturing() {
        let stored = s.state.run_stored;
        s.state.run_expected = None;
        s.state.controller = ControllerState::Active(ActivePhase::Idle);
        drop(s);
        let _ = events.send(CaptureEvent::Cancelled { stored });
    }
}
