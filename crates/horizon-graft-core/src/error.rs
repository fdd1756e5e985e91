//! Error types for Horizon Graft core systems.

/// Errors raised by the [`EventLoop`](crate::EventLoop) scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// The timer ID is invalid, has already fired, or was cleared.
    #[error("Invalid or expired timer ID")]
    InvalidTimerId,
    /// `run_until_idle` gave up because work kept scheduling more work.
    #[error("Event loop did not become idle within {limit} turns")]
    TurnLimitExceeded {
        /// The configured turn limit.
        limit: usize,
    },
}

/// A specialized Result type for core operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            SchedulerError::InvalidTimerId.to_string(),
            "Invalid or expired timer ID"
        );
        assert_eq!(
            SchedulerError::TurnLimitExceeded { limit: 3 }.to_string(),
            "Event loop did not become idle within 3 turns"
        );
    }
}
