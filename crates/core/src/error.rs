use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Identification failed: {0}")]
    Identification(String),

    #[error("Cannot read image dimensions of {path}: {reason}")]
    ImageIdentification { path: PathBuf, reason: String },

    #[error("File collection failed: {0}")]
    FileCollection(String),

    #[error("Cannot parse {path}: {reason}")]
    FileParse { path: PathBuf, reason: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CoreError::Validation(errors.to_string())
    }
}
