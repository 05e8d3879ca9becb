//! Command surface: parse a command line, run it against the controller,
//! produce a reply.
//!
//! Command names keep the wire spelling clients already use; matching is
//! case-insensitive.

use crate::controller::{AcquisitionController, StartOptions};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Activate,
    Deactivate,
    Reset,
    SetTemperature(i32),
    SetIntegrationTime(f64),
    SetInterval(f64),
    SetAcquisitionMode(u32),
    SetTargetIntensity(u32),
    StartAcquisition(StartOptions),
    /// Start once the cooling loop reports stabilized.
    StartWhenStabilized(StartOptions),
    StopAcquisition,
    GetLastSpectrum,
    StopLive,
    Exit,
}

impl Command {
    /// Parse one command line: a name, then positional arguments.
    ///
    /// `startAcquisition` and `startAcquisitionOnceTemperatureStabilized`
    /// take up to four: exposure seconds, interval seconds, mode, series
    /// length. A zero in any position keeps the current value, so
    /// `startAcquisition 0 0 3 10` switches only mode and series length.
    /// Every other command takes at most one argument.
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let name = parts.next().ok_or_else(|| "empty command".to_string())?;
        let args: Vec<&str> = parts.collect();
        if name.eq_ignore_ascii_case("startacquisition")
            || name.eq_ignore_ascii_case("startacquisitiononcetemperaturestabilized")
        {
            if args.len() > 4 {
                return Err(format!("too many arguments for {name}"));
            }
            let opts = parse_start_args(name, &args)?;
            return Ok(if name.len() == "startacquisition".len() {
                Self::StartAcquisition(opts)
            } else {
                Self::StartWhenStabilized(opts)
            });
        }
        if args.len() > 1 {
            return Err(format!("too many arguments for {name}"));
        }
        let arg = args.first().copied();
        let cmd = match name.to_ascii_lowercase().as_str() {
            "activate" => Self::Activate,
            "deactivate" => Self::Deactivate,
            "reset" => Self::Reset,
            "settemperature" => Self::SetTemperature(parse_arg(name, arg)?),
            "setintegrationtime" => Self::SetIntegrationTime(parse_arg(name, arg)?),
            "setinterval" => Self::SetInterval(parse_arg(name, arg)?),
            "setacquisitionmode" => Self::SetAcquisitionMode(parse_arg(name, arg)?),
            "settargetintensity" => Self::SetTargetIntensity(parse_arg(name, arg)?),
            "stopacquisition" => Self::StopAcquisition,
            "getlastspectrum" => Self::GetLastSpectrum,
            "stoplive" => Self::StopLive,
            "exit" => Self::Exit,
            other => return Err(format!("unknown command {other:?}")),
        };
        if requires_no_arg(cmd) && arg.is_some() {
            return Err(format!("{name} takes no argument"));
        }
        Ok(cmd)
    }
}

fn parse_start_args(name: &str, args: &[&str]) -> Result<StartOptions, String> {
    let mut opts = StartOptions::default();
    if let Some(a) = args.first() {
        let secs: f64 = parse_arg(name, Some(a))?;
        opts.exposure_secs = (secs != 0.0).then_some(secs);
    }
    if let Some(a) = args.get(1) {
        let secs: f64 = parse_arg(name, Some(a))?;
        opts.interval_secs = (secs != 0.0).then_some(secs);
    }
    if let Some(a) = args.get(2) {
        let raw: u32 = parse_arg(name, Some(a))?;
        opts.mode = (raw != 0).then_some(raw);
    }
    if let Some(a) = args.get(3) {
        let n: u32 = parse_arg(name, Some(a))?;
        opts.series_length = (n != 0).then_some(n);
    }
    Ok(opts)
}

fn requires_no_arg(cmd: Command) -> bool {
    matches!(
        cmd,
        Command::Activate
            | Command::Deactivate
            | Command::Reset
            | Command::StopAcquisition
            | Command::GetLastSpectrum
            | Command::StopLive
            | Command::Exit
    )
}

fn parse_arg<T: std::str::FromStr>(name: &str, arg: Option<&str>) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    let raw = arg.ok_or_else(|| format!("{name} requires an argument"))?;
    raw.parse()
        .map_err(|e| format!("bad argument for {name}: {e}"))
}

/// Reply to one dispatched command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ack,
    /// Sequence number assigned to a start request.
    Seq(u64),
    /// Reconstructed record for getLastSpectrum.
    Spectrum(crate::sink::Record),
    Error(String),
    /// The daemon should exit its command loop.
    Exit,
}

/// Run one command against the controller. Errors come back as replies, not
/// as `Err`; the command loop stays alive regardless of what a client sends.
pub fn dispatch(controller: &mut AcquisitionController, cmd: Command) -> Reply {
    let result = match cmd {
        Command::Activate => controller.activate().map(|()| Reply::Ack),
        Command::Deactivate => controller.deactivate().map(|()| Reply::Ack),
        Command::Reset => controller.reset().map(|()| Reply::Ack),
        Command::SetTemperature(c) => controller.set_temperature(c).map(|()| Reply::Ack),
        Command::SetIntegrationTime(secs) => {
            controller.set_integration_time(secs).map(|()| Reply::Ack)
        }
        Command::SetInterval(secs) => controller.set_interval(secs).map(|()| Reply::Ack),
        Command::SetAcquisitionMode(raw) => {
            controller.set_acquisition_mode(raw).map(|()| Reply::Ack)
        }
        Command::SetTargetIntensity(counts) => {
            controller.set_target_intensity(counts).map(|()| Reply::Ack)
        }
        Command::StartAcquisition(opts) => controller.start_acquisition(opts).map(Reply::Seq),
        Command::StartWhenStabilized(opts) => {
            controller.start_when_stabilized(opts).map(Reply::Seq)
        }
        Command::StopAcquisition => controller.stop_acquisition().map(|()| Reply::Ack),
        Command::GetLastSpectrum => controller.last_spectrum().map(Reply::Spectrum),
        Command::StopLive => controller.stop_live().map(|()| Reply::Ack),
        Command::Exit => {
            controller.shutdown();
            return Reply::Exit;
        }
    };
    match result {
        Ok(reply) => reply,
        Err(e) => Reply::Error(format!("{e:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_command_name() {
        assert_eq!(Command::parse("activate").unwrap(), Command::Activate);
        assert_eq!(Command::parse("deactivate").unwrap(), Command::Deactivate);
        assert_eq!(Command::parse("reset").unwrap(), Command::Reset);
        assert_eq!(
            Command::parse("setTemperature -60").unwrap(),
            Command::SetTemperature(-60)
        );
        assert_eq!(
            Command::parse("setIntegrationTime 0.05").unwrap(),
            Command::SetIntegrationTime(0.05)
        );
        assert_eq!(
            Command::parse("setInterval 2.5").unwrap(),
            Command::SetInterval(2.5)
        );
        assert_eq!(
            Command::parse("setAcquisitionMode 3").unwrap(),
            Command::SetAcquisitionMode(3)
        );
        assert_eq!(
            Command::parse("setTargetIntensity 30000").unwrap(),
            Command::SetTargetIntensity(30_000)
        );
        assert_eq!(
            Command::parse("startAcquisition").unwrap(),
            Command::StartAcquisition(StartOptions::default())
        );
        assert_eq!(
            Command::parse("startAcquisition 0.25").unwrap(),
            Command::StartAcquisition(StartOptions {
                exposure_secs: Some(0.25),
                ..StartOptions::default()
            })
        );
        assert_eq!(
            Command::parse("startAcquisition 0 0 3 10").unwrap(),
            Command::StartAcquisition(StartOptions {
                exposure_secs: None,
                interval_secs: None,
                mode: Some(3),
                series_length: Some(10),
            })
        );
        assert_eq!(
            Command::parse("startAcquisitionOnceTemperatureStabilized 0 0 4").unwrap(),
            Command::StartWhenStabilized(StartOptions::with_mode(4))
        );
        assert_eq!(
            Command::parse("stopAcquisition").unwrap(),
            Command::StopAcquisition
        );
        assert_eq!(
            Command::parse("getLastSpectrum").unwrap(),
            Command::GetLastSpectrum
        );
        assert_eq!(Command::parse("stopLive").unwrap(), Command::StopLive);
        assert_eq!(Command::parse("exit").unwrap(), Command::Exit);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Command::parse("").is_err());
        assert!(Command::parse("fire").is_err());
        assert!(Command::parse("setTemperature").is_err());
        assert!(Command::parse("setTemperature cold").is_err());
        assert!(Command::parse("activate now").is_err());
        assert!(Command::parse("setInterval 1 2").is_err());
        assert!(Command::parse("startAcquisition 1 2 3 4 5").is_err());
        assert!(Command::parse("startAcquisition fast").is_err());
    }
}
