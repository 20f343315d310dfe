use thiserror::Error;

/// A result type for weighted experiments
pub type Result<T> = std::result::Result<T, DoeError>;

/// An error when generating the nodes and weights of an experiment
#[derive(Error, Debug)]
pub enum DoeError {
    /// When the eigen decomposition of a quadrature rule fails
    #[error("Quadrature rule error: {0}")]
    QuadratureError(#[from] linfa_linalg::LinalgError),
}
