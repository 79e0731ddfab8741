use thiserror::Error;

/// Errors raised while validating module names, manifests, and block names.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input that fails structural validation: a malformed name, a manifest
    /// missing required fields, a bad block pattern.
    #[error("validation failed: {message}")]
    Validation { message: String },
    /// A declaration that parses but can never be satisfied, such as a module
    /// depending on itself.
    #[error("invariant violated: {message}")]
    Invariant { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}
