use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot find field: {0}")]
    FieldNotFound(String),

    #[error("Cannot encode value: {0}")]
    Encode(#[from] serde_yaml::Error),
}
