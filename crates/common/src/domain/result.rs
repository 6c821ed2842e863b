use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to stop receiver {receiver}: {reason}")]
    ReceiverStop { receiver: String, reason: String },

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Invalid start time: {0}")]
    InvalidStartTime(String),

    #[error("Unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl DomainError {
    /// Errors caused by the caller's input rather than the bus or the process.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            DomainError::InvalidConnectionString(_) | DomainError::InvalidStartTime(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_classification() {
        assert!(DomainError::InvalidStartTime("yesterday".to_string()).is_invalid_input());
        assert!(DomainError::InvalidConnectionString("x".to_string()).is_invalid_input());
        assert!(!DomainError::Transport("refused".to_string()).is_invalid_input());
        assert!(!DomainError::ReceiverStop {
            receiver: "telemetry_0".to_string(),
            reason: "timeout".to_string(),
        }
        .is_invalid_input());
    }

    #[test]
    fn test_receiver_stop_message_names_receiver() {
        let err = DomainError::ReceiverStop {
            receiver: "telemetry_0".to_string(),
            reason: "already closed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to stop receiver telemetry_0: already closed"
        );
    }
}
