//! Tracing setup: console layer plus an optional JSON-lines file.
//!
//! The non-blocking file writer needs its guard kept alive for the life of
//! the process; it lives in `cli::FILE_GUARD`.

use crate::cli::FILE_GUARD;
use eyre::WrapErr;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub fn init(level: &str, json_console: bool, logging: &spectrod_config::Logging) -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let console = if json_console {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    let file = match &logging.file {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file {} has no file name", path.display()))?;
            let appender = match logging.rotation.as_deref() {
                None | Some("never") => {
                    tracing_appender::rolling::never(dir.unwrap_or(std::path::Path::new(".")), name)
                }
                Some("daily") => {
                    tracing_appender::rolling::daily(dir.unwrap_or(std::path::Path::new(".")), name)
                }
                Some("hourly") => tracing_appender::rolling::hourly(
                    dir.unwrap_or(std::path::Path::new(".")),
                    name,
                ),
                Some(other) => eyre::bail!("unknown logging.rotation {other:?}"),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            FILE_GUARD
                .set(guard)
                .map_err(|_| eyre::eyre!("logging initialized twice"))?;
            Some(fmt::layer().json().with_writer(writer).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("installing tracing subscriber")?;
    Ok(())
}
