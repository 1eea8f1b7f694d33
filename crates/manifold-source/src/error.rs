use manifold_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Path is not recognized as a valid source: {}", .0.display())]
    NotRecognized(PathBuf),

    #[error("Failed to load chart {}: {message}", path.display())]
    Chart { path: PathBuf, message: String },

    #[error("Failed to render template {name}: {message}")]
    Template { name: String, message: String },

    #[error("Kustomize build failed for {}: {message}", path.display())]
    Kustomize { path: PathBuf, message: String },

    #[error("Unsupported feature: {0}")]
    Unsupported(String),
}

impl SourceError {
    pub(crate) fn chart(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Chart {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn kustomize(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Kustomize {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
