use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum AcqError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("invalid parameter: {0}")]
    Validation(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("controller is not active")]
    NotActive,
    #[error("acquisition already running")]
    Busy,
    #[error("no spectra recorded today")]
    EmptyLog,
    #[error("malformed record: {0}")]
    Parse(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for AcqError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
