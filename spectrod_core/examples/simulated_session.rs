//! Quick start: a full simulated acquisition session.
//!
//! Activates the simulated detector, starts a short kinetic series, waits for
//! it to finish, and summarizes the last stored spectrum. Run with
//! `cargo run --example simulated_session`.

use spectrod_core::task::CaptureEvent;
use spectrod_core::{AcquisitionController, Command, StartOptions, dispatch};
use spectrod_hardware::SimulatedDetector;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), eyre::Report> {
    let dir = std::env::temp_dir().join("spectrod-example");
    std::fs::create_dir_all(&dir)?;

    let mut cfg = spectrod_config::Config::default();
    cfg.hardware.data_dir = dir.to_string_lossy().into_owned();
    cfg.defaults.exposure_secs = 0.005;
    cfg.defaults.series_length = 3;
    cfg.validate()?;

    let detector: Arc<dyn spectrod_traits::Detector> = Arc::new(SimulatedDetector::new());
    let mut controller = AcquisitionController::new(detector, &cfg);
    let events = controller.events();

    println!("activate: {:?}", dispatch(&mut controller, Command::Activate));
    println!(
        "start:    {:?}",
        dispatch(&mut controller, Command::StartAcquisition(StartOptions::with_mode(3)))
    );

    // Wait for the series to finish, echoing progress.
    loop {
        match events.recv_timeout(Duration::from_secs(30))? {
            CaptureEvent::Stored { index } => println!("stored spectrum #{index}"),
            CaptureEvent::Finished { stored } => {
                println!("series finished with {stored} spectra");
                break;
            }
            CaptureEvent::Cancelled { stored } => {
                println!("series cancelled after {stored} spectra");
                break;
            }
            CaptureEvent::Failed(e) => {
                eyre::bail!("capture failed: {e}");
            }
        }
    }

    let last = controller.last_spectrum()?;
    println!(
        "last spectrum: {} samples at {:.3}s exposure, {:.1} C",
        last.samples.len(),
        last.exposure_secs,
        last.temperature_c
    );

    println!(
        "deactivate: {:?}",
        dispatch(&mut controller, Command::Deactivate)
    );
    Ok(())
}
