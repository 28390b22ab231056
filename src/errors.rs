use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    Parse(String),
    #[error("listing #{position} from source `{source_tag}` has no URL")]
    MissingUrl { source_tag: String, position: usize },
    #[error("batch {} failed: {source}", .path.display())]
    Batch {
        path: PathBuf,
        #[source]
        source: Box<AppError>,
    },
}

impl AppError {
    pub fn in_batch(path: impl Into<PathBuf>, cause: AppError) -> Self {
        AppError::Batch {
            path: path.into(),
            source: Box::new(cause),
        }
    }
}
