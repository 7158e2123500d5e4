use std::fmt;

/// Stable wire codes consumed by callers; messages are informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    InvalidOperation,
    NotImplemented,
    Unexpected,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::InvalidOperation => "INVALID_OPERATION",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::Unexpected => "UNEXPECTED",
        };
        f.write_str(s)
    }
}

pub type BudgetResult<T> = Result<T, BudgetError>;

#[derive(Debug, thiserror::Error)]
pub enum BudgetError {
    #[error("validation error: {message}")]
    Validation {
        message: String,
        target: Option<String>,
    },
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
    #[error("not implemented: {message}")]
    NotImplemented { message: String },
    #[error("unexpected error: {message}")]
    Unexpected { message: String },
}

impl BudgetError {
    pub fn validation(message: impl Into<String>) -> Self {
        BudgetError::Validation {
            message: message.into(),
            target: None,
        }
    }

    pub fn validation_field(message: impl Into<String>, target: impl Into<String>) -> Self {
        BudgetError::Validation {
            message: message.into(),
            target: Some(target.into()),
        }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        BudgetError::InvalidOperation {
            message: message.into(),
        }
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        BudgetError::NotImplemented {
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        BudgetError::Unexpected {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            BudgetError::Validation { .. } => ErrorCode::Validation,
            BudgetError::InvalidOperation { .. } => ErrorCode::InvalidOperation,
            BudgetError::NotImplemented { .. } => ErrorCode::NotImplemented,
            BudgetError::Unexpected { .. } => ErrorCode::Unexpected,
        }
    }

    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            BudgetError::Validation { target, .. } => target.as_deref(),
            _ => None,
        }
    }
}
