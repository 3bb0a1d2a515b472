// Error type shared by the motor library and the runtime

use crate::parameters::Port;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Port {0} is not a motor port")]
    InvalidPort(Port),

    #[error("Port {0} is already in use")]
    PortInUse(Port),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Error::InvalidArgument(reason.into())
    }
}
