use thiserror::Error;

use crate::app::BuildError;
use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum CourierError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    /// The send collaborator failed in a way that is not a retryable outcome.
    #[error("send failed unexpectedly: {0}")]
    Send(String),

    #[error("task join failed: {0}")]
    Join(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_pass_their_message_through() {
        let err: CourierError = ConfigError::ZeroCapacity.into();
        assert_eq!(err.to_string(), ConfigError::ZeroCapacity.to_string());
        assert!(matches!(err, CourierError::Config(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn send_errors_are_labelled() {
        let err = CourierError::Send("connection reset".into());
        assert_eq!(err.to_string(), "send failed unexpectedly: connection reset");
    }
}
