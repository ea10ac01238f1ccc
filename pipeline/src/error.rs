//! Error definitions of the pipeline driver
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error(transparent)]
    Tabfuse(#[from] tabfuse::error::Error),
    #[error(transparent)]
    Preprocessing(#[from] tabfuse_preprocessing::PreprocessingError),
    #[error(transparent)]
    Trees(#[from] tabfuse_trees::TreesError),
    #[error(transparent)]
    Fusion(#[from] tabfuse_fusion::FusionError),
}
