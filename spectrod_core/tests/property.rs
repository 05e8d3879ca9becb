use proptest::prelude::*;
use spectrod_core::exposure::{Adjustment, BAND_HI, BAND_LO, SATURATION, decide};

proptest! {
    // The next exposure is positive and finite for any peak the detector can
    // produce and any positive starting exposure.
    #[test]
    fn next_exposure_stays_positive(
        peak in -1000i32..=70_000,
        target in 1u32..=65_000,
        exposure in 1.0e-6f64..10.0,
    ) {
        match decide(peak, target, exposure) {
            Adjustment::Converged => {}
            Adjustment::Saturated { next_secs }
            | Adjustment::Scale { next_secs }
            | Adjustment::NoSignal { next_secs } => {
                prop_assert!(next_secs > 0.0);
                prop_assert!(next_secs.is_finite());
            }
        }
    }

    // Below saturation, convergence is exactly the inclusive ratio band.
    #[test]
    fn convergence_matches_the_band(
        peak in 1i32..SATURATION,
        target in 1u32..=65_000,
    ) {
        let ratio = f64::from(peak) / f64::from(target);
        let converged = matches!(decide(peak, target, 0.01), Adjustment::Converged);
        prop_assert_eq!(converged, (BAND_LO..=BAND_HI).contains(&ratio));
    }

    // A saturated peak always halves, regardless of target.
    #[test]
    fn saturation_always_halves(
        peak in SATURATION..=70_000,
        target in 1u32..=65_000,
        exposure in 1.0e-3f64..10.0,
    ) {
        match decide(peak, target, exposure) {
            Adjustment::Saturated { next_secs } => {
                prop_assert!((next_secs - exposure / 2.0).abs() < 1e-12);
            }
            other => prop_assert!(false, "expected saturated, got {:?}", other),
        }
    }

    // Scaling moves the peak toward the target: too dim scales up, too
    // bright scales down.
    #[test]
    fn scaling_moves_toward_the_target(
        peak in 1i32..SATURATION,
        target in 1u32..=65_000,
        exposure in 1.0e-3f64..10.0,
    ) {
        if let Adjustment::Scale { next_secs } = decide(peak, target, exposure) {
            if f64::from(peak) < f64::from(target) {
                prop_assert!(next_secs > exposure);
            } else {
                prop_assert!(next_secs < exposure);
            }
        }
    }
}

#[test]
fn record_lines_parse_for_any_sample_vector() {
    // Deterministic spot check against the sink format used by the capture
    // loop; the full parser fuzzing lives in the fuzz targets.
    for samples in [vec![0], vec![i32::MIN, i32::MAX], vec![1; 2048]] {
        let mut line = String::from("2026-08-26T12:00:00,0.010000000,-60.00");
        for s in &samples {
            line.push(',');
            line.push_str(&s.to_string());
        }
        let rec = spectrod_core::sink::parse_record_line(&line).unwrap();
        assert_eq!(rec.samples, samples);
    }
}
