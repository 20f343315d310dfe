use thiserror::Error;

/// A result type for Karhunen-Loeve decompositions
pub type Result<T> = std::result::Result<T, KlError>;

/// An error when computing a Karhunen-Loeve decomposition
#[derive(Error, Debug)]
pub enum KlError {
    /// When no quadrature node lies within the domain
    #[error("Empty discretization: no quadrature node within the domain")]
    EmptyDiscretization,
    /// When error due to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
    /// When the covariance model or the basis fail
    #[error(transparent)]
    GpError(#[from] uqbox_gp::GpError),
    /// When the experiment fails to generate its nodes
    #[error(transparent)]
    DoeError(#[from] uqbox_doe::DoeError),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
}
