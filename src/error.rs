use std::path::PathBuf;
use thiserror::Error;

/// The main error type for yoloprep operations.
#[derive(Debug, Error)]
pub enum YoloprepError {
    #[error("IO error at {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Dataset root not found: {path}")]
    DatasetRootNotFound { path: PathBuf },

    #[error("Missing manifest {path}")]
    ManifestNotFound { path: PathBuf },

    #[error("Failed to parse manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to write manifest {path}: {source}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid manifest {path}: {message}")]
    ManifestInvalid { path: PathBuf, message: String },

    #[error("These class names are not in the manifest names: {missing:?}\nFound names: {known:?}")]
    UnknownClassNames {
        missing: Vec<String>,
        known: Vec<String>,
    },

    #[error("Did not find {split}/images in the dataset at {root}")]
    MissingSplit { root: PathBuf, split: String },

    #[error("Invalid class mapping: {message}")]
    InvalidMapping { message: String },

    #[error("Invalid arguments: {message}")]
    InvalidArguments { message: String },

    #[error("Failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to serialize report as JSON: {source}")]
    ReportJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("{failed} of {total} pair(s) failed to process")]
    PairFailures { failed: usize, total: usize },

    #[error("Failed to launch '{program}': {source}")]
    TrainerLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{step}' exited with {status}")]
    TrainerFailed { step: String, status: String },
}

impl YoloprepError {
    /// Wrap an I/O error with the path it happened at.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoAt {
            path: path.into(),
            source,
        }
    }
}
