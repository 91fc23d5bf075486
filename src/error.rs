use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Io error {0}")]
    Io(#[from] io::Error),

    #[error("malformed blacklist file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed config file: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Caller supplied bad input, as opposed to a storage failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::InvalidAddress(_) | Error::InvalidDuration(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_validation() {
        assert!(Error::InvalidAddress("x".to_string()).is_validation());
        assert!(Error::InvalidDuration("x".to_string()).is_validation());
        assert!(!Error::Io(io::Error::from(io::ErrorKind::NotFound)).is_validation());
    }

    #[test]
    fn test_display() {
        let e = Error::InvalidAddress("not-an-ip".to_string());
        assert_eq!(e.to_string(), "invalid IP address: not-an-ip");
    }
}
