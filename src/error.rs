use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("dataset partition `{0}` does not exist")]
    MissingPartition(PathBuf),

    #[error("dataset partition `{0}` contains no images")]
    EmptyPartition(PathBuf),

    #[error("class `{class}` found in `{partition}` is not part of the training label set")]
    UnknownClass { partition: PathBuf, class: String },

    #[error("failed to decode image `{path}`: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("checkpoint `{path}`: {message}")]
    Checkpoint { path: PathBuf, message: String },

    #[error("tensor data conversion failed: {0}")]
    TensorData(String),

    #[error("label {label} is out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },

    #[error("failed to render `{path}`: {message}")]
    Render { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
