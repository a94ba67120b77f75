use std::fmt;

/// Failure raised by a transaction listener
///
/// A failure returned from a "changing" callback cancels the relation change
/// before anything has been modified.
#[derive(Debug, Clone, PartialEq)]
pub enum EventError {
    Cancelled {
        reason: String,
    },
    Validation {
        message: String,
        hint: Option<String>,
    },
    Listener {
        message: String,
    },
}

impl EventError {
    pub fn cancelled(reason: &str) -> Self {
        Self::Cancelled {
            reason: reason.to_string(),
        }
    }

    pub fn validation(message: &str) -> Self {
        Self::Validation {
            message: message.to_string(),
            hint: None,
        }
    }

    pub fn validation_with_hint(message: &str, hint: &str) -> Self {
        Self::Validation {
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    pub fn listener(message: &str) -> Self {
        Self::Listener {
            message: message.to_string(),
        }
    }
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::Cancelled { reason } => write!(f, "Relation change cancelled: {}", reason),
            EventError::Validation { message, hint } => {
                write!(f, "Validation error: {}", message)?;
                if let Some(hint) = hint {
                    write!(f, " (hint: {})", hint)?;
                }
                Ok(())
            }
            EventError::Listener { message } => write!(f, "Listener error: {}", message),
        }
    }
}

impl std::error::Error for EventError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_error_cancelled() {
        let error = EventError::cancelled("Order is locked");

        match error {
            EventError::Cancelled { reason } => assert_eq!(reason, "Order is locked"),
            _ => panic!("Expected cancelled error"),
        }
    }

    #[test]
    fn test_event_error_validation_with_hint() {
        let error = EventError::validation_with_hint("Customer is inactive", "Reactivate first");

        match error {
            EventError::Validation { message, hint } => {
                assert_eq!(message, "Customer is inactive");
                assert_eq!(hint.unwrap(), "Reactivate first");
            }
            _ => panic!("Expected validation error"),
        }
    }

    #[test]
    fn test_event_error_display() {
        let error = EventError::validation_with_hint("bad", "fix it");
        assert_eq!(format!("{}", error), "Validation error: bad (hint: fix it)");

        let error = EventError::listener("boom");
        assert_eq!(error.to_string(), "Listener error: boom");
    }
}
