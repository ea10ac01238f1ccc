//! Error definitions for the fusion network
use ndarray::ShapeError;
use thiserror::Error;
pub type Result<T> = std::result::Result<T, FusionError>;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("invalid fusion schema: {0}")]
    InvalidSchema(String),
    #[error("invalid ndarray shape {0}")]
    NdShape(#[from] ShapeError),
    #[error("tensor operation failed: {0}")]
    Candle(#[from] candle_core::Error),
    #[error(transparent)]
    TabfuseError(#[from] tabfuse::error::Error),
}
