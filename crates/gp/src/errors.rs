use thiserror::Error;

/// A result type for general linear model fitting
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when fitting a [`GeneralLinearModelAlgorithm`](crate::GeneralLinearModelAlgorithm)
#[derive(Error, Debug)]
pub enum GpError {
    /// When the likelihood computation fails for a structural reason
    #[error("LikelihoodComputation computation error: {0}")]
    LikelihoodComputationError(String),
    /// When the whitened design matrix is singular (e.g. redundant basis functions)
    #[error("Singular design matrix: {0}")]
    SingularDesignError(String),
    /// When the hyperparameters optimizer returns no candidate at all
    #[error("Optimization error: {0}")]
    OptimizationError(String),
    /// When options are combined in a way which is not supported
    #[error("Unsupported feature: {0}")]
    UnsupportedFeatureError(String),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When error due to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
}
