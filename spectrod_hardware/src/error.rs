use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("detector not initialized")]
    NotInitialized,
    #[error("device communication failed: {0}")]
    Comm(String),
    #[error("acquisition already in progress")]
    Acquiring,
    #[error("no new frame available")]
    NoNewData,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
