use thiserror::Error;

/// Error types for the multifit-rs library.
#[derive(Error, Debug)]
pub enum MultifitError {
    /// A workspace could not be created for the requested sizes or strategies.
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// Error during residual or Jacobian evaluation.
    #[error("Function evaluation error: {0}")]
    FunctionEvaluation(String),

    /// No acceptable step was found within the retry budget of one iteration.
    #[error("No progress: {attempts} consecutive step attempts were rejected")]
    NoProgress {
        /// Number of step attempts made before giving up
        attempts: usize,
    },

    /// A trust region subproblem strategy could not produce a step.
    #[error("Step computation failed: {0}")]
    StepFailure(String),

    /// Error indicating a mismatch in vector or matrix dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Error indicating a singular matrix was encountered.
    #[error("Singular matrix encountered")]
    SingularMatrix,

    /// Linear algebra error.
    #[error("Linear algebra error: {0}")]
    LinearAlgebraError(String),

    /// Invalid input data or configuration.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Argument outside the domain of a special function.
    #[error("Domain error: {0}")]
    Domain(String),

    /// Result of a special function does not fit in an f64.
    #[error("Overflow: {0}")]
    Overflow(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl MultifitError {
    /// Returns true if this error reports a stalled iteration rather than a hard failure.
    pub fn is_no_progress(&self) -> bool {
        matches!(self, MultifitError::NoProgress { .. })
    }
}

/// Result type alias for multifit-rs operations.
pub type Result<T> = std::result::Result<T, MultifitError>;
