//! Error types for domain input validation.

/// Errors raised when boundary input cannot form a domain value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// A sensor id was empty or whitespace.
    #[error("sensor id must not be blank")]
    BlankSensorId,
}
