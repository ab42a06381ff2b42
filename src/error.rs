use thiserror::Error;

/// Errors raised by the coaching core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoachError {
    #[error("external call failed: {0}")]
    ExternalCall(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("could not parse response: {0}")]
    Parse(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("session registry unavailable: {0}")]
    Registry(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CoachError {
    /// Only external call failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoachError::ExternalCall(_))
    }
}

pub type CoachResult<T> = Result<T, CoachError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_external_calls_are_transient() {
        assert!(CoachError::ExternalCall("timeout".into()).is_transient());
        assert!(!CoachError::Parse("garbled".into()).is_transient());
        assert!(!CoachError::Registry("down".into()).is_transient());
    }
}
