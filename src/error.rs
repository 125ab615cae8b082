use thiserror::Error;

/// Error types for the nstate-rs library.
///
/// Configuration and data errors abort the current call without partial
/// results. Numerical failures abort the optimisation in which they occur.
/// Recoverable conditions are never raised as errors, they are reported
/// through [`crate::warnings::Warnings`].
#[derive(Error, Debug)]
pub enum NStateError {
    /// The N-state model has not been selected.
    #[error("The N-state model has not been set up")]
    NoModel,

    /// A user setup mistake, such as a missing reference domain or temperature.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No usable base data could be found.
    #[error("No data: {0}")]
    NoData(String),

    /// A required per-spin attribute has not been declared.
    #[error("Missing attribute: {0}")]
    MissingAttribute(String),

    /// Inconsistent experimental data, such as ragged bond vector arrays.
    #[error("Data error: {0}")]
    Data(String),

    /// The optimised value is infinite.
    #[error("The {0} value is infinite")]
    InfiniteValue(String),

    /// The optimised value is NaN.
    #[error("The {0} value is NaN")]
    NotANumber(String),

    /// Error indicating a mismatch in vector or matrix dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Error indicating the algorithm failed to converge.
    #[error("Algorithm failed to converge: {0}")]
    ConvergenceFailure(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for cases that don't fit the other categories.
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for nstate-rs operations.
pub type Result<T> = std::result::Result<T, NStateError>;

impl From<String> for NStateError {
    fn from(s: String) -> Self {
        NStateError::Other(s)
    }
}

impl From<&str> for NStateError {
    fn from(s: &str) -> Self {
        NStateError::Other(s.to_string())
    }
}

impl NStateError {
    /// True for numerical failures of a single optimisation (infinite or NaN chi-squared).
    pub fn is_numerical(&self) -> bool {
        matches!(self, NStateError::InfiniteValue(_) | NStateError::NotANumber(_))
    }
}
