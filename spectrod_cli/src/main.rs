//! spectrod: spectrum acquisition daemon.
//!
//! Reads commands line by line on stdin, replies on stdout, publishes a
//! status frame once per period, and shuts the detector down cleanly on
//! Ctrl-C or `exit`.

mod cli;
mod logging;
mod publisher;

use clap::Parser;
use cli::{Cli, JSON_MODE};
use eyre::{Result, WrapErr};
use publisher::JsonPublisher;
use spectrod_core::{
    AcquisitionController, Command, LogPublisher, PeriodicTask, Reply, StatusPublisher, dispatch,
};
use spectrod_hardware::SimulatedDetector;
use spectrod_traits::Detector;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();
    let _ = JSON_MODE.set(args.json);

    let cfg = spectrod_config::load(&args.config)?;
    cfg.validate()
        .wrap_err_with(|| format!("invalid config {}", args.config.display()))?;
    if args.check {
        println!("config ok");
        return Ok(());
    }

    // A broken log setup is fatal; a daemon nobody can observe is worse than
    // one that refuses to start.
    logging::init(&args.log_level, args.json, &cfg.logging)?;
    tracing::info!(config = %args.config.display(), "spectrod starting");

    let detector: Arc<dyn Detector> = Arc::new(SimulatedDetector::new());
    let controller = Arc::new(Mutex::new(AcquisitionController::new(detector, &cfg)));

    if args.activate {
        lock(&controller).activate()?;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })
        .wrap_err("installing signal handler")?;
    }

    // Temperature poll and status publish, each on its own period.
    let poll_task = {
        let controller = controller.clone();
        PeriodicTask::spawn("temperature-poll", Duration::from_secs(1), move || {
            if let Err(e) = lock(&controller).poll_temperature() {
                tracing::warn!(error = %e, "temperature poll failed");
            }
            true
        })
    };
    let publish_task = {
        let controller = controller.clone();
        let json = args.json;
        PeriodicTask::spawn(
            "status-publish",
            Duration::from_millis(cfg.publish.period_ms),
            move || {
                let snapshot = lock(&controller).status_snapshot();
                if json {
                    JsonPublisher.publish(&snapshot);
                } else {
                    LogPublisher.publish(&snapshot);
                }
                true
            },
        )
    };

    run_command_loop(&controller, &shutdown, args.json);

    // Teardown order: signal shutdown, stop the timers, then deactivate the
    // session (which cancels any blocked wait, aborts, joins, deinits).
    shutdown.store(true, Ordering::SeqCst);
    drop(poll_task);
    drop(publish_task);
    lock(&controller).shutdown();
    tracing::info!("spectrod stopped");
    Ok(())
}

fn lock(
    controller: &Arc<Mutex<AcquisitionController>>,
) -> std::sync::MutexGuard<'_, AcquisitionController> {
    controller.lock().unwrap_or_else(|p| p.into_inner())
}

/// Read stdin line by line on a helper thread; dispatch on this one so the
/// shutdown flag is checked even while stdin is quiet.
fn run_command_loop(
    controller: &Arc<Mutex<AcquisitionController>>,
    shutdown: &AtomicBool,
    json: bool,
) {
    let (tx, rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin().lock();
        let mut line = String::new();
        loop {
            line.clear();
            match std::io::BufRead::read_line(&mut stdin, &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(line.trim().to_string()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let line = match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => line,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };
        if line.is_empty() {
            continue;
        }
        let reply = match Command::parse(&line) {
            Ok(cmd) => dispatch(&mut *lock(controller), cmd),
            Err(e) => Reply::Error(e),
        };
        let done = matches!(reply, Reply::Exit);
        print_reply(&reply, json);
        if done {
            break;
        }
    }
}

fn print_reply(reply: &Reply, json: bool) {
    if json {
        let obj = match reply {
            Reply::Ack => serde_json::json!({ "type": "reply", "status": "ok" }),
            Reply::Seq(seq) => serde_json::json!({ "type": "reply", "status": "ok", "seq": seq }),
            Reply::Spectrum(rec) => serde_json::json!({
                "type": "reply",
                "status": "ok",
                "spectrum": {
                    "timestamp": &rec.timestamp,
                    "exposure_secs": rec.exposure_secs,
                    "temperature_c": rec.temperature_c,
                    "samples": &rec.samples,
                },
            }),
            Reply::Error(msg) => serde_json::json!({ "type": "reply", "status": "error", "message": msg }),
            Reply::Exit => serde_json::json!({ "type": "reply", "status": "exiting" }),
        };
        println!("{obj}");
    } else {
        match reply {
            Reply::Ack => println!("ok"),
            Reply::Seq(seq) => println!("ok seq={seq}"),
            Reply::Spectrum(rec) => println!("{rec}"),
            Reply::Error(msg) => println!("error: {msg}"),
            Reply::Exit => println!("exiting"),
        }
    }
}
