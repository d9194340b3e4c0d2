#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed for '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Unknown {domain} value '{value}'")]
    UnknownEnumValue { domain: &'static str, value: String },
}

impl CoreError {
    /// Shorthand for a field-level validation failure.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
