//! Closed-loop exposure tuning.
//!
//! The capture loop hands each freshly read frame to the tuner, which nudges
//! the exposure until the brightest pixel lands near the target intensity.
//! Saturated frames halve the exposure; everything else scales linearly by
//! target over observed peak. A peak within five percent of the target ends
//! the loop with the exposure unchanged.

use crate::error::Result;
use crate::hw_error::map_hw_error;
use spectrod_traits::{CancelToken, Detector, WaitOutcome};

/// First ADC code treated as saturated. One below full scale, since some
/// detectors clip a count early.
pub const SATURATION: i32 = 65_534;
/// Convergence band for peak/target, inclusive on both ends.
pub const BAND_LO: f64 = 0.95;
pub const BAND_HI: f64 = 1.05;
/// Exposures are never scaled below this floor.
const MIN_EXPOSURE_SECS: f64 = 1.0e-6;

/// What one frame tells us to do next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    /// Peak is within the band; keep the current exposure.
    Converged,
    /// Peak is at or above the saturation code; halve.
    Saturated { next_secs: f64 },
    /// Scale linearly toward the target.
    Scale { next_secs: f64 },
    /// Frame carried no signal at all; expose longer.
    NoSignal { next_secs: f64 },
}

/// Pure decision step of the search. `exposure_secs` must be positive; the
/// returned exposure always is.
pub fn decide(peak: i32, target: u32, exposure_secs: f64) -> Adjustment {
    if peak >= SATURATION {
        return Adjustment::Saturated {
            next_secs: (exposure_secs / 2.0).max(MIN_EXPOSURE_SECS),
        };
    }
    if peak <= 0 {
        return Adjustment::NoSignal {
            next_secs: exposure_secs * 2.0,
        };
    }
    let ratio = f64::from(peak) / f64::from(target);
    if (BAND_LO..=BAND_HI).contains(&ratio) {
        return Adjustment::Converged;
    }
    Adjustment::Scale {
        next_secs: (exposure_secs * f64::from(target) / f64::from(peak))
            .max(MIN_EXPOSURE_SECS),
    }
}

/// Result of tuning against the frames of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TuneOutcome {
    pub exposure_secs: f64,
    /// The last frame read; the one the caller should store.
    pub samples: Vec<i32>,
    pub converged: bool,
    pub attempts: u32,
    pub cancelled: bool,
}

pub struct ExposureTuner<'a> {
    detector: &'a dyn Detector,
    cancel: &'a CancelToken,
    target: u32,
    attempt_limit: u32,
}

impl<'a> ExposureTuner<'a> {
    pub fn new(
        detector: &'a dyn Detector,
        cancel: &'a CancelToken,
        target: u32,
        attempt_limit: u32,
    ) -> Self {
        Self {
            detector,
            cancel,
            target,
            attempt_limit,
        }
    }

    /// Adjust starting from an already-read frame. Each retake aborts the
    /// run, retargets the exposure, restarts, and blocks for the next frame,
    /// so this must run on the capture thread without the config lock held.
    /// The last exposure stands when the attempt budget runs out, and a
    /// device error during a retake logs and ends the loop early instead of
    /// propagating.
    pub fn tune(&self, samples: Vec<i32>, exposure_secs: f64) -> TuneOutcome {
        let mut samples = samples;
        let mut exposure = exposure_secs;
        let mut attempts = 0;
        loop {
            if self.cancel.is_cancelled() {
                return TuneOutcome {
                    exposure_secs: exposure,
                    samples,
                    converged: false,
                    attempts,
                    cancelled: true,
                };
            }
            let peak = samples.iter().copied().max().unwrap_or(0);
            let next = match decide(peak, self.target, exposure) {
                Adjustment::Converged => {
                    tracing::debug!(attempts, exposure, peak, "peak within band");
                    return TuneOutcome {
                        exposure_secs: exposure,
                        samples,
                        converged: true,
                        attempts,
                        cancelled: false,
                    };
                }
                Adjustment::Saturated { next_secs } => {
                    tracing::debug!(attempts, exposure, peak, next_secs, "frame saturated");
                    next_secs
                }
                Adjustment::Scale { next_secs } | Adjustment::NoSignal { next_secs } => {
                    tracing::debug!(attempts, exposure, peak, next_secs, "scaling exposure");
                    next_secs
                }
            };
            if attempts >= self.attempt_limit {
                tracing::warn!(
                    exposure,
                    limit = self.attempt_limit,
                    "exposure adjustment exhausted attempts"
                );
                return TuneOutcome {
                    exposure_secs: exposure,
                    samples,
                    converged: false,
                    attempts,
                    cancelled: false,
                };
            }
            attempts += 1;
            match self.retake(next) {
                Ok(Some(frame)) => {
                    exposure = next;
                    samples = frame;
                }
                Ok(None) => {
                    return TuneOutcome {
                        exposure_secs: next,
                        samples,
                        converged: false,
                        attempts,
                        cancelled: true,
                    };
                }
                Err(e) => {
                    tracing::warn!(error = %e, "exposure adjustment ended by a device error");
                    return TuneOutcome {
                        exposure_secs: exposure,
                        samples,
                        converged: false,
                        attempts,
                        cancelled: false,
                    };
                }
            }
        }
    }

    /// Abort, retarget, restart, block for the next frame. `None` when the
    /// wait was cancelled.
    fn retake(&self, exposure_secs: f64) -> Result<Option<Vec<i32>>> {
        let d = self.detector;
        d.abort_acquisition().map_err(|e| map_hw_error(e.as_ref()))?;
        d.set_exposure_secs(exposure_secs)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        d.start_acquisition().map_err(|e| map_hw_error(e.as_ref()))?;
        match d
            .wait_for_frame(self.cancel)
            .map_err(|e| map_hw_error(e.as_ref()))?
        {
            WaitOutcome::Cancelled => Ok(None),
            WaitOutcome::FrameReady => Ok(Some(
                d.read_frame().map_err(|e| map_hw_error(e.as_ref()))?,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_edges_converge_inclusively() {
        // target 10_000: ratio 0.95 and 1.05 exactly
        assert_eq!(decide(9_500, 10_000, 0.01), Adjustment::Converged);
        assert_eq!(decide(10_500, 10_000, 0.01), Adjustment::Converged);
    }

    #[test]
    fn just_outside_the_band_scales() {
        match decide(9_400, 10_000, 0.01) {
            Adjustment::Scale { next_secs } => assert!(next_secs > 0.01),
            other => panic!("expected scale up, got {other:?}"),
        }
        match decide(10_600, 10_000, 0.01) {
            Adjustment::Scale { next_secs } => assert!(next_secs < 0.01),
            other => panic!("expected scale down, got {other:?}"),
        }
    }

    #[test]
    fn saturation_halves_even_when_ratio_looks_converged() {
        match decide(SATURATION, 64_000, 0.02) {
            Adjustment::Saturated { next_secs } => {
                assert!((next_secs - 0.01).abs() < 1e-12);
            }
            other => panic!("expected saturated, got {other:?}"),
        }
    }

    #[test]
    fn dark_frame_doubles_the_exposure() {
        match decide(0, 10_000, 0.01) {
            Adjustment::NoSignal { next_secs } => assert!((next_secs - 0.02).abs() < 1e-12),
            other => panic!("expected no-signal, got {other:?}"),
        }
    }

    #[test]
    fn converged_frame_keeps_the_exposure_and_skips_the_device() {
        let mock = crate::mocks::MockDetector::new();
        let cancel = CancelToken::new();
        let tuner = ExposureTuner::new(&mock, &cancel, 30_000, 5);
        let out = tuner.tune(vec![100, 30_000, 100], 0.01);
        assert!(out.converged);
        assert_eq!(out.attempts, 0);
        assert!((out.exposure_secs - 0.01).abs() < 1e-12);
        assert_eq!(out.samples, vec![100, 30_000, 100]);
        assert_eq!(mock.start_calls(), 0, "no retake for an in-band frame");
    }

    #[test]
    fn bright_frame_is_retaken_at_a_scaled_exposure() {
        let mock = crate::mocks::MockDetector::new();
        // Peak tracks the programmed exposure linearly, like a real sensor
        // below saturation.
        mock.set_frame_fn(|exposure| vec![(exposure * 1.0e6).round() as i32]);
        let cancel = CancelToken::new();
        let tuner = ExposureTuner::new(&mock, &cancel, 30_000, 5);
        let out = tuner.tune(vec![60_000], 0.06);
        assert!(out.converged);
        assert_eq!(out.attempts, 1);
        assert!((out.exposure_secs - 0.03).abs() < 1e-9);
        assert_eq!(out.samples, vec![30_000]);
        assert!(mock.abort_calls() >= 1);
    }

    #[test]
    fn device_error_ends_the_adjustment_without_propagating() {
        let mock = crate::mocks::MockDetector::new();
        mock.set_frame_fn(|exposure| vec![(exposure * 1.0e6).round() as i32]);
        mock.fail_next_starts(1);
        let cancel = CancelToken::new();
        let tuner = ExposureTuner::new(&mock, &cancel, 30_000, 5);
        let out = tuner.tune(vec![60_000], 0.06);
        assert!(!out.converged);
        assert!(!out.cancelled);
        assert_eq!(out.attempts, 1);
        // The pre-failure exposure and frame stand.
        assert!((out.exposure_secs - 0.06).abs() < 1e-12);
        assert_eq!(out.samples, vec![60_000]);
    }

    #[test]
    fn scaling_never_reaches_zero() {
        let mut exposure = 1.0e-6;
        for _ in 0..100 {
            exposure = match decide(SATURATION, 30_000, exposure) {
                Adjustment::Saturated { next_secs } => next_secs,
                other => panic!("expected saturated, got {other:?}"),
            };
            assert!(exposure > 0.0);
        }
    }
}
