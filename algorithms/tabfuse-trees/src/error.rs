//! Error definitions for the tree crates
use thiserror::Error;
pub type Result<T> = std::result::Result<T, TreesError>;

#[derive(Error, Debug)]
pub enum TreesError {
    #[error("cannot read hyperparameter table: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid hyperparameter table: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no hyperparameters for feature {0} and no default entry")]
    MissingFeature(String),
    #[error(transparent)]
    TabfuseError(#[from] tabfuse::error::Error),
}
