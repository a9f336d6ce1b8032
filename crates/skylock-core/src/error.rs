use thiserror::Error;

#[derive(Debug, Error)]
pub enum SkylockError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid lock configuration for '{name}': {reason}")]
    InvalidLock { name: String, reason: String },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),
}

impl SkylockError {
    /// Short machine-readable code, used in CLI JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            SkylockError::Config(_) => "CONFIG_ERROR",
            SkylockError::InvalidLock { .. } => "INVALID_LOCK",
            SkylockError::InvalidSchedule(_) => "INVALID_SCHEDULE",
        }
    }
}

pub type Result<T> = std::result::Result<T, SkylockError>;
