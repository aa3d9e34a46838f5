//! Schema and conformance error types
//!
//! Error codes:
//! - DOCMODEL_SCHEMA_INVALID (malformed schema definition)
//! - DOCMODEL_VALIDATION_FAILED (required attribute missing, or a
//!   validator rejected a value)
//! - DOCMODEL_TYPE_MISMATCH (value matched zero declared type alternatives)
//! - DOCMODEL_UNKNOWN_ATTRIBUTE (path neither declared nor admitted by the
//!   save-unknown policy)
//!
//! Type resolution and wildcard matching never produce these for "no
//! match" - that is a normal boolean result. Only the conformance layer
//! escalates a failed match into an error, carrying the offending path.

use std::fmt;

/// Schema error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    /// Malformed schema definition
    SchemaInvalid,
    /// Required attribute missing with no default, or validator rejected
    ValidationFailed,
    /// Value matched no declared type alternative
    TypeMismatch,
    /// Path not declared and not admitted by the save-unknown policy
    UnknownAttribute,
}

impl SchemaErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::SchemaInvalid => "DOCMODEL_SCHEMA_INVALID",
            SchemaErrorCode::ValidationFailed => "DOCMODEL_VALIDATION_FAILED",
            SchemaErrorCode::TypeMismatch => "DOCMODEL_TYPE_MISMATCH",
            SchemaErrorCode::UnknownAttribute => "DOCMODEL_UNKNOWN_ATTRIBUTE",
        }
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Schema error with the offending path for diagnostics
#[derive(Debug, Clone)]
pub struct SchemaError {
    code: SchemaErrorCode,
    message: String,
    path: Option<String>,
}

impl SchemaError {
    /// Malformed schema definition
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            code: SchemaErrorCode::SchemaInvalid,
            message: reason.into(),
            path: None,
        }
    }

    /// Required attribute absent with no default
    pub fn missing_required(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            code: SchemaErrorCode::ValidationFailed,
            message: format!("required attribute '{}' is missing and has no default", path),
            path: Some(path),
        }
    }

    /// Validator rejected a value
    pub fn validator_rejected(path: impl Into<String>, reason: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            code: SchemaErrorCode::ValidationFailed,
            message: format!("validator rejected '{}': {}", path, reason.into()),
            path: Some(path),
        }
    }

    /// Value matched no declared type alternative
    pub fn type_mismatch(
        path: impl Into<String>,
        actual: impl Into<String>,
        declared: impl Into<String>,
    ) -> Self {
        let path = path.into();
        Self {
            code: SchemaErrorCode::TypeMismatch,
            message: format!(
                "value at '{}' is {} which matches none of the declared types [{}]",
                path,
                actual.into(),
                declared.into()
            ),
            path: Some(path),
        }
    }

    /// Undeclared path not admitted by the save-unknown policy
    pub fn unknown_attribute(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            code: SchemaErrorCode::UnknownAttribute,
            message: format!(
                "attribute '{}' is not declared and not admitted by the save-unknown policy",
                path
            ),
            path: Some(path),
        }
    }

    /// A custom transform failed
    pub fn transform_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            code: SchemaErrorCode::ValidationFailed,
            message: format!("transform failed at '{}': {}", path, reason.into()),
            path: Some(path),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> SchemaErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the offending attribute path, if any
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for SchemaError {}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(SchemaErrorCode::SchemaInvalid.code(), "DOCMODEL_SCHEMA_INVALID");
        assert_eq!(
            SchemaErrorCode::ValidationFailed.code(),
            "DOCMODEL_VALIDATION_FAILED"
        );
        assert_eq!(SchemaErrorCode::TypeMismatch.code(), "DOCMODEL_TYPE_MISMATCH");
        assert_eq!(
            SchemaErrorCode::UnknownAttribute.code(),
            "DOCMODEL_UNKNOWN_ATTRIBUTE"
        );
    }

    #[test]
    fn test_errors_carry_path() {
        let err = SchemaError::missing_required("address.city");
        assert_eq!(err.code(), SchemaErrorCode::ValidationFailed);
        assert_eq!(err.path(), Some("address.city"));
        assert!(err.message().contains("address.city"));
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = SchemaError::type_mismatch("age", "string", "N");
        let display = format!("{}", err);
        assert!(display.contains("DOCMODEL_TYPE_MISMATCH"));
        assert!(display.contains("age"));
    }
}
