use custody_types::AuthorityError;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors reported by an [`crate::EffectActuator`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActuatorError {
    #[error("effect rejected by target: {0}")]
    Rejected(String),

    #[error("target unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported action: {0}")]
    Unsupported(String),
}

impl From<ActuatorError> for AuthorityError {
    fn from(err: ActuatorError) -> Self {
        AuthorityError::Io(err.to_string())
    }
}
