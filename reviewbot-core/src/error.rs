//! Errors reported by the build service.
//!
//! "Not found" is not an error here: lookups return `Ok(None)` for packages,
//! links and histories that do not exist.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The service could not be reached or failed to answer.
    Transport {
        operation: &'static str,
        message: String,
    },
    /// The service refused a mutation, e.g. the review is no longer in the
    /// state the change assumed.
    Rejected {
        operation: &'static str,
        status: u16,
        message: String,
    },
    /// A response document could not be decoded.
    Malformed {
        operation: &'static str,
        message: String,
    },
}

impl ServiceError {
    pub fn transport(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            operation,
            message: message.into(),
        }
    }

    pub fn rejected(operation: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation,
            status,
            message: message.into(),
        }
    }

    pub fn malformed(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Malformed {
            operation,
            message: message.into(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { operation, message } => {
                write!(f, "{} failed: {}", operation, message)
            }
            Self::Rejected {
                operation,
                status,
                message,
            } => write!(f, "{} rejected ({}): {}", operation, status, message),
            Self::Malformed { operation, message } => {
                write!(f, "{} returned a malformed document: {}", operation, message)
            }
        }
    }
}

impl std::error::Error for ServiceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_operation() {
        let err = ServiceError::transport("fetch request", "connection reset");
        assert_eq!(err.to_string(), "fetch request failed: connection reset");

        let err = ServiceError::rejected("change review state", 400, "review not new");
        assert_eq!(
            err.to_string(),
            "change review state rejected (400): review not new"
        );
        assert!(err.is_rejected());
    }
}
