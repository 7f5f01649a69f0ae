use thiserror::Error;

/// Error taxonomy shared across the workspace.
///
/// Variants map onto the error kinds named in the specification's error
/// handling design: configuration errors and infeasible mandatory layouts
/// are fatal and bubble to the driver; everything else is recovered locally
/// by the engine and never surfaces as a `DomainError`.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Infeasible mandatory layout: {0}")]
    InfeasibleMandatoryLayout(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
