//! Query planning error types
//!
//! Error codes:
//! - DOCMODEL_QUERY_INVALID_CONDITION (malformed condition set: duplicate
//!   key-condition attributes, or a comparator that can never drive a key)
//! - DOCMODEL_QUERY_NO_ACCESS_PATH (no table key or index satisfies the
//!   key conditions; there is no scan fallback)

use std::fmt;

/// Planner error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorCode {
    /// The condition set itself is malformed
    InvalidCondition,
    /// No access path satisfies the key conditions
    NoAccessPath,
}

impl PlannerErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            PlannerErrorCode::InvalidCondition => "DOCMODEL_QUERY_INVALID_CONDITION",
            PlannerErrorCode::NoAccessPath => "DOCMODEL_QUERY_NO_ACCESS_PATH",
        }
    }
}

impl fmt::Display for PlannerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Planner error with a diagnostic message
#[derive(Debug, Clone)]
pub struct PlannerError {
    code: PlannerErrorCode,
    message: String,
}

impl PlannerError {
    /// Malformed condition set
    pub fn invalid_condition(reason: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::InvalidCondition,
            message: reason.into(),
        }
    }

    /// No table key or index satisfies the key conditions
    pub fn no_access_path(reason: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::NoAccessPath,
            message: reason.into(),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> PlannerErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for PlannerError {}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;
