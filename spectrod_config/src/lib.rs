#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the spectrod daemon.
//!
//! `Config` and sub-structs are deserialized from TOML and validated before
//! the daemon touches hardware. Every section has usable defaults so an empty
//! file is a valid (simulated-friendly) configuration.
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HardwareCfg {
    /// Directory handed to the driver at initialization (vendor config files).
    pub driver_path: String,
    /// Directory where daily spectrum files are written.
    pub data_dir: String,
}

impl Default for HardwareCfg {
    fn default() -> Self {
        Self {
            driver_path: "/usr/local/etc/andor".into(),
            data_dir: ".".into(),
        }
    }
}

/// Session parameters applied on activation and restored by a reset.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct DefaultsCfg {
    pub exposure_secs: f64,
    /// Pause between captures; 0 means back-to-back.
    pub interval_secs: f64,
    /// Raw device acquisition mode, 1..=5.
    pub acquisition_mode: u32,
    pub series_length: u32,
    pub accumulation_count: u32,
    pub target_temperature_c: i32,
    /// Peak counts the closed-loop exposure search aims for.
    pub target_intensity: u32,
}

impl Default for DefaultsCfg {
    fn default() -> Self {
        Self {
            exposure_secs: 0.01,
            interval_secs: 1.0,
            acquisition_mode: 1,
            series_length: 5,
            accumulation_count: 1,
            target_temperature_c: -60,
            target_intensity: 30_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct PublishCfg {
    /// Status publish period in milliseconds.
    pub period_ms: u64,
}

impl Default for PublishCfg {
    fn default() -> Self {
        Self { period_ms: 1000 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ExposureLoopCfg {
    /// Maximum adjustment attempts before the search gives up.
    pub attempt_limit: u32,
}

impl Default for ExposureLoopCfg {
    fn default() -> Self {
        Self { attempt_limit: 5 }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub hardware: HardwareCfg,
    pub defaults: DefaultsCfg,
    pub publish: PublishCfg,
    pub exposure_loop: ExposureLoopCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read and parse a config file. Validation is a separate step so callers can
/// report parse and semantic errors distinctly.
pub fn load(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("reading config {}: {e}", path.display()))?;
    load_toml(&text).map_err(|e| eyre::eyre!("parsing config {}: {e}", path.display()))
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Defaults
        if !(self.defaults.exposure_secs > 0.0 && self.defaults.exposure_secs.is_finite()) {
            eyre::bail!("defaults.exposure_secs must be > 0");
        }
        if self.defaults.interval_secs < 0.0 || !self.defaults.interval_secs.is_finite() {
            eyre::bail!("defaults.interval_secs must be >= 0");
        }
        if !(1..=5).contains(&self.defaults.acquisition_mode) {
            eyre::bail!("defaults.acquisition_mode must be in 1..=5");
        }
        if self.defaults.series_length == 0 {
            eyre::bail!("defaults.series_length must be >= 1");
        }
        if self.defaults.accumulation_count == 0 {
            eyre::bail!("defaults.accumulation_count must be >= 1");
        }
        if !(-120..=20).contains(&self.defaults.target_temperature_c) {
            eyre::bail!("defaults.target_temperature_c must be in [-120, 20]");
        }
        if self.defaults.target_intensity == 0 {
            eyre::bail!("defaults.target_intensity must be > 0");
        }

        // Publish
        if self.publish.period_ms == 0 {
            eyre::bail!("publish.period_ms must be >= 1");
        }
        if self.publish.period_ms > 60 * 60 * 1000 {
            eyre::bail!("publish.period_ms is unreasonably large (>1h)");
        }

        // Exposure loop
        if self.exposure_loop.attempt_limit == 0 {
            eyre::bail!("exposure_loop.attempt_limit must be >= 1");
        }

        // Hardware
        if self.hardware.data_dir.is_empty() {
            eyre::bail!("hardware.data_dir must not be empty");
        }
        if self.hardware.driver_path.is_empty() {
            eyre::bail!("hardware.driver_path must not be empty");
        }

        Ok(())
    }
}
