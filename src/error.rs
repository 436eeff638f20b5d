use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read pose manifest {path}")]
    ManifestIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse pose manifest {path}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode pose image {path}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("default pose '{0}' is not listed in the manifest")]
    UnknownDefault(String),
    #[error("duplicate pose id '{0}' in manifest")]
    DuplicateId(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ExportError {
    #[error("export aborted after {frames} frames")]
    Aborted { frames: u64 },
    #[error("export failed after {frames} frames: {message}")]
    Failed { message: String, frames: u64 },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
