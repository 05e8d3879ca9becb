#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core acquisition logic (hardware-agnostic).
//!
//! This crate provides the hardware-independent acquisition engine. All
//! device interactions go through the `spectrod_traits::Detector` capability.
//!
//! ## Architecture
//!
//! - **Controller**: session lifecycle and command handling (`controller`)
//! - **Capture**: supervised background frame loop (`task`)
//! - **Exposure**: closed-loop tuning toward a target peak (`exposure`)
//! - **Sink**: append-only daily spectrum files (`sink`)
//! - **Dispatch**: wire commands and replies (`dispatch`)
//! - **Publish**: periodic status snapshots (`publish`)
//!
//! ## Locking
//!
//! Two locks exist: the config lock over [`session::SessionShared`] and the
//! data-file lock inside [`sink::DataSink`]. When both are needed they are
//! taken config first, file second, everywhere. Blocking device waits never
//! hold either.

pub mod controller;
pub mod dispatch;
pub mod error;
pub mod exposure;
pub mod hw_error;
pub mod mocks;
pub mod publish;
pub mod schedule;
pub mod session;
pub mod sink;
pub mod task;

pub use controller::{AcquisitionController, StartOptions};
pub use dispatch::{Command, Reply, dispatch};
pub use error::{AcqError, Result};
pub use publish::{LogPublisher, StatusPublisher, StatusSnapshot};
pub use schedule::PeriodicTask;
pub use session::{AcquisitionMode, ControllerState, SessionConfig};
pub use sink::{DataSink, Record};
